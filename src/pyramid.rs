//! Gaussian, Difference of Gaussians and gradient scale spaces.
//! See Section 2 and 3.1 in [4].

use log::{debug, trace};
use ndarray::{Axis, Zip};
use rayon::prelude::*;

use crate::error::{Result, SiftError};
use crate::params::SiftParams;
use crate::pixel_buffer::PixelBuffer;
use crate::processing::Processing;

/// Distance between samples of the seed image, in input pixels. δ_min in [4].
pub const MIN_PIX_DIST: f32 = 0.5;

/// Blur the upsampled input is assumed to already carry, in seed image pixels.
const SEED_INPUT_SIGMA: f32 = 1.0;

/// Images indexed by octave and scale. Every octave holds the same number of images, and the
/// images of octave `o + 1` have half the resolution of those of octave `o`.
#[derive(Debug, Clone)]
pub struct Pyramid<I> {
    octaves: Vec<Vec<I>>,
}

/// Gaussian or DoG scale space.
pub type ImagePyramid = Pyramid<PixelBuffer>;

/// Gradients of every image of a Gaussian scale space.
pub type GradientPyramid = Pyramid<GradientImage>;

impl<I> Pyramid<I> {
    pub(crate) fn from_octaves(octaves: Vec<Vec<I>>) -> Self {
        debug_assert!(octaves.windows(2).all(|w| w[0].len() == w[1].len()));
        Self { octaves }
    }

    pub fn num_octaves(&self) -> usize {
        self.octaves.len()
    }

    pub fn imgs_per_octave(&self) -> usize {
        self.octaves.first().map_or(0, Vec::len)
    }

    pub fn octave(&self, octave: usize) -> &[I] {
        &self.octaves[octave]
    }

    pub fn get(&self, octave: usize, scale: usize) -> &I {
        &self.octaves[octave][scale]
    }

    pub fn octaves(&self) -> impl Iterator<Item = &[I]> {
        self.octaves.iter().map(Vec::as_slice)
    }
}

/// Two channel image holding the x and y central differences of a Gaussian image.
/// The outermost row and column on each side are zero.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientImage(PixelBuffer);

impl GradientImage {
    #[inline]
    pub fn gx(&self, x: i32, y: i32) -> f32 {
        self.0.get(x, y, 0)
    }

    #[inline]
    pub fn gy(&self, x: i32, y: i32) -> f32 {
        self.0.get(x, y, 1)
    }

    pub fn width(&self) -> usize {
        self.0.width()
    }

    pub fn height(&self) -> usize {
        self.0.height()
    }

    pub fn as_pixel_buffer(&self) -> &PixelBuffer {
        &self.0
    }
}

/// Blur applied to image `s - 1` of an octave to obtain image `s`, for `s >= 1`.
/// Element 0 is the absolute blur of the first image, in seed image pixels.
/// Follows Eq. (7) in [4] with the blur expressed relative to the octave's sampling distance.
pub fn blur_increments(params: &SiftParams) -> Vec<f32> {
    let base_sigma = params.sigma_min / MIN_PIX_DIST;
    let k = 2_f32.powf(1.0 / params.scales_per_octave as f32);
    let mut sigmas = Vec::with_capacity(params.imgs_per_octave());
    sigmas.push(base_sigma);
    for idx in 1..params.imgs_per_octave() {
        let sigma_prev = base_sigma * k.powi(idx as i32 - 1);
        let sigma_total = k * sigma_prev;
        sigmas.push((sigma_total * sigma_total - sigma_prev * sigma_prev).sqrt());
    }
    sigmas
}

/// Builds the Gaussian scale space of a single channel image with values in [0; 1].
///
/// # Errors
///
/// [`SiftError::InputTooSmall`] if the deepest octave would have less than one pixel on a side.
pub fn build_gaussian_pyramid<P: Processing>(
    img: &PixelBuffer,
    params: &SiftParams,
) -> Result<ImagePyramid> {
    if img.channels() != 1 {
        return Err(SiftError::UnsupportedChannels(img.channels()));
    }
    let min_size = params.min_input_size();
    if img.width() < min_size || img.height() < min_size {
        return Err(SiftError::InputTooSmall {
            width: img.width(),
            height: img.height(),
            num_octaves: params.num_octaves,
            min_size,
        });
    }

    let sigmas = blur_increments(params);
    let base_sigma = sigmas[0];
    // Seed image, Eq. (6) in [4]
    let seed = P::resize_linear(img, img.width() * 2, img.height() * 2)?;
    let sigma_diff = (base_sigma * base_sigma - SEED_INPUT_SIGMA).max(0.0).sqrt();

    let imgs_per_octave = params.imgs_per_octave();
    let create_octave = |initial: PixelBuffer| -> Result<Vec<PixelBuffer>> {
        let mut imgs = Vec::with_capacity(imgs_per_octave);
        imgs.push(initial);
        // Each image blurs its predecessor, so the per step kernel stays small.
        for sigma in sigmas.iter().skip(1) {
            let next = P::gaussian_blur(&imgs[imgs.len() - 1], *sigma)?;
            imgs.push(next);
        }
        Ok(imgs)
    };
    let mut octaves: Vec<Vec<PixelBuffer>> = Vec::with_capacity(params.num_octaves);
    let mut base = P::gaussian_blur(&seed, sigma_diff)?;
    for octave in 0..params.num_octaves {
        trace!("octave {octave}: {}x{} pixels", base.width(), base.height());
        let imgs = create_octave(base)?;
        if octave + 1 == params.num_octaves {
            octaves.push(imgs);
            break;
        }
        // The first image of each octave is the image with twice the base blur of the
        // previous octave, subsampled by a factor of 2. See Eq. (8) in [4].
        let src = &imgs[imgs_per_octave - 3];
        let (width, height) = (src.width() / 2, src.height() / 2);
        if width == 0 || height == 0 {
            return Err(SiftError::InputTooSmall {
                width: img.width(),
                height: img.height(),
                num_octaves: params.num_octaves,
                min_size,
            });
        }
        base = P::resize_nearest(src, width, height)?;
        octaves.push(imgs);
    }
    debug!(
        "built gaussian pyramid: {} octaves of {} images, seed {}x{}",
        octaves.len(),
        imgs_per_octave,
        img.width() * 2,
        img.height() * 2
    );
    Ok(Pyramid::from_octaves(octaves))
}

/// Difference of Gaussians, woof.
/// Image `s` of an octave is `gaussian[s + 1] - gaussian[s]`. See Section 3.1 in [4].
pub fn build_dog_pyramid(gaussian: &ImagePyramid) -> Result<ImagePyramid> {
    let octaves = gaussian
        .octaves
        .par_iter()
        .map(|octave| {
            octave
                .par_windows(2)
                .map(|pair| PixelBuffer::from_array3(pair[1].as_array() - pair[0].as_array()))
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Pyramid::from_octaves(octaves))
}

/// Central difference gradients of every Gaussian image, one parallel task per image.
pub fn build_gradient_pyramid(gaussian: &ImagePyramid) -> Result<GradientPyramid> {
    let octaves = gaussian
        .octaves
        .par_iter()
        .map(|octave| {
            octave
                .par_iter()
                .map(gradient_image)
                .collect::<Result<Vec<_>>>()
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Pyramid::from_octaves(octaves))
}

pub fn gradient_image(img: &PixelBuffer) -> Result<GradientImage> {
    let (height, width) = (img.height(), img.width());
    let mut grad = PixelBuffer::zeros(height, width, 2)?.into_array();
    let src = img.channel(0);
    Zip::indexed(grad.lanes_mut(Axis(2))).par_for_each(|(y, x), mut g| {
        if x == 0 || y == 0 || x + 1 >= width || y + 1 >= height {
            return;
        }
        g[0] = (src[(y, x + 1)] - src[(y, x - 1)]) * 0.5;
        g[1] = (src[(y + 1, x)] - src[(y - 1, x)]) * 0.5;
    });
    Ok(GradientImage(PixelBuffer::from_array3(grad)?))
}
