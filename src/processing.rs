use image::imageops::{resize, FilterType};
use imageproc::filter::gaussian_blur_f32;
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};

use crate::error::Result;
use crate::pixel_buffer::PixelBuffer;

/// Basic image operations used by SIFT.
/// For testing or benchmarking, it's useful to swap in other blur and interpolation
/// procedures and compare results and performance.
pub trait Processing {
    fn gaussian_blur(img: &PixelBuffer, sigma: f32) -> Result<PixelBuffer>;
    fn resize_linear(img: &PixelBuffer, width: usize, height: usize) -> Result<PixelBuffer>;
    fn resize_nearest(img: &PixelBuffer, width: usize, height: usize) -> Result<PixelBuffer>;
}

/// Separable blur and origin aligned resizing, parallelized over image rows and columns.
///
/// Resizing samples the source at `dst * src_size / dst_size`, so pixel `i` of an image
/// upsampled by two sits exactly at input coordinate `i / 2`.
pub struct NativeProcessing;

impl Processing for NativeProcessing {
    fn gaussian_blur(img: &PixelBuffer, sigma: f32) -> Result<PixelBuffer> {
        if sigma <= 0.0 {
            return Ok(img.clone());
        }
        let kernel = gaussian_kernel(sigma);
        let mut out = Array3::zeros(img.as_array().dim());
        for c in 0..img.channels() {
            let cols_done = convolve_lanes(img.channel(c), Axis(0), &kernel);
            let rows_done = convolve_lanes(cols_done.view(), Axis(1), &kernel);
            out.index_axis_mut(Axis(2), c).assign(&rows_done);
        }
        PixelBuffer::from_array3(out)
    }

    fn resize_linear(img: &PixelBuffer, width: usize, height: usize) -> Result<PixelBuffer> {
        let mut out = PixelBuffer::zeros(height, width, img.channels())?.into_array();
        let sx = img.width() as f32 / width as f32;
        let sy = img.height() as f32 / height as f32;
        Zip::indexed(&mut out).par_for_each(|(y, x, c), v| {
            let src_x = x as f32 * sx;
            let src_y = y as f32 * sy;
            let x0 = src_x.floor();
            let y0 = src_y.floor();
            let fx = src_x - x0;
            let fy = src_y - y0;
            let (x0, y0) = (x0 as i32, y0 as i32);
            let top = img.get(x0, y0, c) * (1. - fx) + img.get(x0 + 1, y0, c) * fx;
            let bottom = img.get(x0, y0 + 1, c) * (1. - fx) + img.get(x0 + 1, y0 + 1, c) * fx;
            *v = top * (1. - fy) + bottom * fy;
        });
        PixelBuffer::from_array3(out)
    }

    fn resize_nearest(img: &PixelBuffer, width: usize, height: usize) -> Result<PixelBuffer> {
        let mut out = PixelBuffer::zeros(height, width, img.channels())?.into_array();
        let sx = img.width() as f32 / width as f32;
        let sy = img.height() as f32 / height as f32;
        Zip::indexed(&mut out).par_for_each(|(y, x, c), v| {
            let src_x = (x as f32 * sx).floor() as i32;
            let src_y = (y as f32 * sy).floor() as i32;
            *v = img.get(src_x, src_y, c);
        });
        PixelBuffer::from_array3(out)
    }
}

/// Normalized Gaussian kernel of odd length `ceil(6 sigma)` (plus one if that is even).
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let mut size = (6. * sigma).ceil() as usize;
    if size % 2 == 0 {
        size += 1;
    }
    let center = (size / 2) as f32;
    let denom = 2. * sigma * sigma;
    let mut kernel: Vec<f32> = (0..size)
        .map(|k| {
            let d = k as f32 - center;
            (-d * d / denom).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|w| *w /= sum);
    kernel
}

/// Convolves every lane along `axis` with `kernel`, replicating border values.
/// Each lane is an independent task.
fn convolve_lanes(src: ArrayView2<f32>, axis: Axis, kernel: &[f32]) -> Array2<f32> {
    let mut dst = Array2::zeros(src.dim());
    let half = (kernel.len() / 2) as i32;
    Zip::from(dst.lanes_mut(axis))
        .and(src.lanes(axis))
        .par_for_each(|mut dst_lane, src_lane| {
            let n = src_lane.len() as i32;
            for (i, out) in dst_lane.iter_mut().enumerate() {
                *out = kernel
                    .iter()
                    .enumerate()
                    .map(|(k, w)| {
                        let j = (i as i32 + k as i32 - half).clamp(0, n - 1);
                        w * src_lane[j as usize]
                    })
                    .sum();
            }
        });
    dst
}

/// Uses `imageproc` implementations of gaussian blur and resizing.
/// Only the first channel of the input is processed.
pub struct ImageprocProcessing;

impl Processing for ImageprocProcessing {
    fn gaussian_blur(img: &PixelBuffer, sigma: f32) -> Result<PixelBuffer> {
        if sigma <= 0.0 {
            return Ok(img.clone());
        }
        PixelBuffer::from_luma_f32(&gaussian_blur_f32(&img.to_luma_f32(), sigma))
    }

    fn resize_linear(img: &PixelBuffer, width: usize, height: usize) -> Result<PixelBuffer> {
        PixelBuffer::from_luma_f32(&resize(
            &img.to_luma_f32(),
            width as u32,
            height as u32,
            FilterType::Triangle,
        ))
    }

    fn resize_nearest(img: &PixelBuffer, width: usize, height: usize) -> Result<PixelBuffer> {
        PixelBuffer::from_luma_f32(&resize(
            &img.to_luma_f32(),
            width as u32,
            height as u32,
            FilterType::Nearest,
        ))
    }
}
