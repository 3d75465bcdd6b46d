use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use ndarray::{Array2, Array3, ArrayView2, Axis, Zip};
use nshare::{AsNdarray2, AsNdarray3};

use crate::error::{Result, SiftError};

pub type LumaFImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Row-major float image of shape `[rows, cols, channels]`.
///
/// Reads through [`PixelBuffer::get`] clamp coordinates to the nearest edge pixel, which is
/// the border policy every stage of the pipeline relies on.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    data: Array3<f32>,
}

impl PixelBuffer {
    pub fn zeros(rows: usize, cols: usize, channels: usize) -> Result<Self> {
        Self::from_array3(Array3::zeros((rows, cols, channels)))
    }

    pub fn from_array3(data: Array3<f32>) -> Result<Self> {
        let (rows, cols, channels) = data.dim();
        if rows == 0 || cols == 0 || channels == 0 {
            return Err(SiftError::EmptyImage {
                rows,
                cols,
                channels,
            });
        }
        // Reading neighbours by flat index assumes standard layout.
        let data = if data.is_standard_layout() {
            data
        } else {
            data.as_standard_layout().into_owned()
        };
        Ok(Self { data })
    }

    pub fn from_array2(data: Array2<f32>) -> Result<Self> {
        Self::from_array3(data.insert_axis(Axis(2)))
    }

    /// Single channel buffer holding the raw 8 bit values, i.e. in [0; 255].
    pub fn from_gray_image(img: &GrayImage) -> Result<Self> {
        Self::from_array2(img.as_ndarray2().mapv(f32::from))
    }

    /// Three channel buffer holding the raw 8 bit values, i.e. in [0; 255].
    pub fn from_rgb_image(img: &RgbImage) -> Result<Self> {
        // nshare lays images out as [channels, rows, cols]
        Self::from_array3(img.as_ndarray3().permuted_axes([1, 2, 0]).mapv(f32::from))
    }

    pub fn from_luma_f32(img: &LumaFImage) -> Result<Self> {
        Self::from_array2(img.as_ndarray2().to_owned())
    }

    /// Copy of channel 0 as an `image` buffer.
    pub fn to_luma_f32(&self) -> LumaFImage {
        LumaFImage::from_fn(self.cols() as u32, self.rows() as u32, |x, y| {
            Luma([self.data[(y as usize, x as usize, 0)]])
        })
    }

    pub fn rows(&self) -> usize {
        self.data.shape()[0]
    }

    pub fn cols(&self) -> usize {
        self.data.shape()[1]
    }

    pub fn channels(&self) -> usize {
        self.data.shape()[2]
    }

    pub fn width(&self) -> usize {
        self.cols()
    }

    pub fn height(&self) -> usize {
        self.rows()
    }

    /// Pixel at column `x`, row `y`, with coordinates clamped into the image.
    #[inline]
    pub fn get(&self, x: i32, y: i32, channel: usize) -> f32 {
        let x = x.clamp(0, self.cols() as i32 - 1) as usize;
        let y = y.clamp(0, self.rows() as i32 - 1) as usize;
        self.data[(y, x, channel)]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, channel: usize, value: f32) {
        self.data[(y, x, channel)] = value;
    }

    pub fn channel(&self, channel: usize) -> ArrayView2<f32> {
        self.data.index_axis(Axis(2), channel)
    }

    pub fn as_array(&self) -> &Array3<f32> {
        &self.data
    }

    pub fn into_array(self) -> Array3<f32> {
        self.data
    }

    pub fn as_slice(&self) -> &[f32] {
        self.data
            .as_slice()
            .expect("constructors enforce standard layout")
    }

    /// Luma conversion with Rec. 601 weights. Single channel buffers are returned as is.
    pub fn to_grayscale(&self) -> Result<Self> {
        match self.channels() {
            1 => Ok(self.clone()),
            3 => {
                let mut gray = Array2::zeros((self.rows(), self.cols()));
                Zip::from(&mut gray)
                    .and(self.data.lanes(Axis(2)))
                    .par_for_each(|g, px| *g = 0.299 * px[0] + 0.587 * px[1] + 0.114 * px[2]);
                Self::from_array2(gray)
            }
            n => Err(SiftError::UnsupportedChannels(n)),
        }
    }

    /// Pointwise `self * factor`, used to bring [0; 255] input into [0; 1].
    pub fn scaled(&self, factor: f32) -> Self {
        let mut data = self.data.clone();
        data.par_mapv_inplace(|v| v * factor);
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn clamped_reads() {
        let buf = PixelBuffer::from_array2(array![[1., 2., 3.], [4., 5., 6.]]).unwrap();
        assert_eq!(buf.rows(), 2);
        assert_eq!(buf.cols(), 3);
        assert_eq!(buf.get(1, 1, 0), 5.);
        assert_eq!(buf.get(-3, -1, 0), 1.);
        assert_eq!(buf.get(10, 0, 0), 3.);
        assert_eq!(buf.get(1, 7, 0), 5.);
        assert_eq!(buf.get(-1, 5, 0), 4.);
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(
            PixelBuffer::zeros(0, 4, 1),
            Err(SiftError::EmptyImage { rows: 0, .. })
        ));
        assert!(PixelBuffer::from_gray_image(&GrayImage::new(0, 0)).is_err());
    }

    #[test]
    fn grayscale_weights() {
        let mut rgb = RgbImage::new(2, 1);
        rgb.put_pixel(0, 0, image::Rgb([255, 0, 0]));
        rgb.put_pixel(1, 0, image::Rgb([10, 20, 30]));
        let gray = PixelBuffer::from_rgb_image(&rgb)
            .unwrap()
            .to_grayscale()
            .unwrap();
        assert_eq!(gray.channels(), 1);
        assert!((gray.get(0, 0, 0) - 0.299 * 255.).abs() < 1e-4);
        assert!((gray.get(1, 0, 0) - (2.99 + 11.74 + 3.42)).abs() < 1e-4);
    }

    #[test]
    fn rgb_image_layout() {
        let img = RgbImage::from_fn(3, 2, |x, y| image::Rgb([x as u8, 10 * y as u8, 100]));
        let buf = PixelBuffer::from_rgb_image(&img).unwrap();
        assert_eq!((buf.width(), buf.height(), buf.channels()), (3, 2, 3));
        assert_eq!(buf.get(2, 1, 0), 2.);
        assert_eq!(buf.get(2, 1, 1), 10.);
        assert_eq!(buf.get(0, 0, 2), 100.);
        assert_eq!(buf.as_slice()[..6], [0., 0., 100., 1., 0., 100.]);
    }

    #[test]
    fn unsupported_channels() {
        let buf = PixelBuffer::zeros(2, 2, 2).unwrap();
        assert!(matches!(
            buf.to_grayscale(),
            Err(SiftError::UnsupportedChannels(2))
        ));
    }

    #[test]
    fn gray_image_layout() {
        let img = GrayImage::from_fn(3, 2, |x, y| Luma([(10 * y + x) as u8]));
        let buf = PixelBuffer::from_gray_image(&img).unwrap();
        assert_eq!((buf.width(), buf.height()), (3, 2));
        assert_eq!(buf.get(2, 1, 0), 12.);
        let luma = buf.to_luma_f32();
        assert_eq!(luma.get_pixel(2, 1)[0], 12.);
        assert_eq!(PixelBuffer::from_luma_f32(&luma).unwrap(), buf);
    }
}
