// This implementation of SIFT follows the Anatomy of the SIFT Method by Ives Rey-Otero and
// Mauricio Delbracio. It is made available under the terms of the MIT license included in the
// root of this repository.
//
// Copyright 2026 The sift-scale-space authors

//! This crate contains an implementation of the SIFT keypoint detector and descriptor.
//!
//! Useful resources:
//! - [1]: [Lowe 1999](https://www.cs.ubc.ca/~lowe/papers/iccv99.pdf)
//! - [2]: [Lowe 2004](https://www.cs.ubc.ca/~lowe/papers/ijcv04.pdf)
//! - [3]: [Mikolajczyk 2004](https://robots.ox.ac.uk/~vgg/research/affine/det_eval_files/mikolajczyk_ijcv2004.pdf)
//! - [4]: [Rey-Otero 2014](https://www.ipol.im/pub/art/2014/82/article.pdf)
//!
//! The code follows [4] (Anatomy of the SIFT Method) closely, including its parameter names
//! and default values. Every stage runs in parallel on a rayon pool, so the order of the
//! returned keypoints is not deterministic. The set of keypoints is.
//!
//! ```no_run
//! let img = image::open("image.png").unwrap().to_luma8();
//! let keypoints = sift_scale_space::sift(&img).unwrap();
//! let descriptors = sift_scale_space::descriptors_to_array(&keypoints);
//! assert_eq!(descriptors.shape(), [keypoints.len(), 128]);
//! ```

use image::GrayImage;
use log::debug;
use ndarray::Array2;

mod descriptor;
mod error;
mod local_extrema;
mod orientation;
mod parallel;
mod params;
mod pixel_buffer;
mod processing;
mod pyramid;
mod refinement;

pub use descriptor::{compute_keypoint_descriptor, hists_to_vec, DESCRIPTOR_SIZE, N_HIST, N_ORI};
pub use error::{Result, SiftError};
pub use local_extrema::{find_keypoints, point_is_local_extremum};
pub use orientation::{
    dominant_orientations, find_keypoint_orientations, orientation_histogram, smooth_histogram,
    N_BINS, SMOOTHING_PASSES,
};
pub use parallel::{parallel_for, Executor, ResultCollector};
pub use params::SiftParams;
pub use pixel_buffer::{LumaFImage, PixelBuffer};
pub use processing::{gaussian_kernel, ImageprocProcessing, NativeProcessing, Processing};
pub use pyramid::{
    blur_increments, build_dog_pyramid, build_gaussian_pyramid, build_gradient_pyramid,
    GradientImage, GradientPyramid, ImagePyramid, Pyramid, MIN_PIX_DIST,
};
pub use refinement::{
    fit_quadratic, point_is_on_edge, refine_or_discard_keypoint, QuadraticFit, Refinement,
    MAX_REFINEMENT_ITERS,
};

/// A scale space extremum with its reference orientation and descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct SiftKeypoint {
    /// Column in the pixel grid of the keypoint's octave.
    pub i: i32,
    /// Row in the pixel grid of the keypoint's octave.
    pub j: i32,
    pub octave: usize,
    /// Index of the DoG image the extremum was found in, in `[1, scales_per_octave]`.
    pub scale: usize,
    /// Interpolated column in input image pixels.
    pub x: f32,
    /// Interpolated row in input image pixels.
    pub y: f32,
    /// Absolute blur level of the keypoint, in input image pixels.
    pub sigma: f32,
    /// Interpolated DoG response at the extremum.
    pub extremum_val: f32,
    /// Reference orientation in radians, in `[0; 2π)`.
    pub orientation: f32,
    pub descriptor: [u8; DESCRIPTOR_SIZE],
}

impl SiftKeypoint {
    /// Candidate at a discrete sample of the DoG. Continuous fields hold -1 until refinement.
    pub fn template(i: i32, j: i32, octave: usize, scale: usize) -> Self {
        Self {
            i,
            j,
            octave,
            scale,
            x: -1.,
            y: -1.,
            sigma: -1.,
            extremum_val: 0.,
            orientation: 0.,
            descriptor: [0; DESCRIPTOR_SIZE],
        }
    }
}

/// The three pyramids keypoints are detected and described on.
#[derive(Debug, Clone)]
pub struct ScaleSpace {
    pub gaussian: ImagePyramid,
    pub dog: ImagePyramid,
    pub gradient: GradientPyramid,
}

/// Extract SIFT features using default parameters and the default blur and resize
/// implementations.
pub fn sift(img: &GrayImage) -> Result<Vec<SiftKeypoint>> {
    sift_with_params(&PixelBuffer::from_gray_image(img)?, &SiftParams::default())
}

/// Extract SIFT features from a grayscale or RGB image with values in [0; 255].
pub fn sift_with_params(img: &PixelBuffer, params: &SiftParams) -> Result<Vec<SiftKeypoint>> {
    sift_with_processing::<NativeProcessing>(img, params)
}

/// Extract SIFT features using the given blur and resize implementations.
pub fn sift_with_processing<P: Processing>(
    img: &PixelBuffer,
    params: &SiftParams,
) -> Result<Vec<SiftKeypoint>> {
    params.validate()?;
    let executor = Executor::new(params.num_threads)?;
    debug!("running sift on {} threads", executor.num_threads());
    executor.install(|| {
        let scale_space = build_scale_space::<P>(img, params)?;
        detect_with_scale_space(&scale_space, params)
    })
}

/// Converts `img` to a single channel image with values in [0; 1].
fn prepare_input(img: &PixelBuffer) -> Result<PixelBuffer> {
    Ok(img.to_grayscale()?.scaled(1. / 255.))
}

/// Builds the Gaussian scale space of `img` and, from it, the DoG and gradient pyramids.
///
/// Runs on the current rayon pool. `img` holds values in [0; 255].
pub fn build_scale_space<P: Processing>(
    img: &PixelBuffer,
    params: &SiftParams,
) -> Result<ScaleSpace> {
    params.validate()?;
    let input = prepare_input(img)?;
    let gaussian = build_gaussian_pyramid::<P>(&input, params)?;
    let (dog, gradient) = rayon::join(
        || build_dog_pyramid(&gaussian),
        || build_gradient_pyramid(&gaussian),
    );
    Ok(ScaleSpace {
        gaussian,
        dog: dog?,
        gradient: gradient?,
    })
}

/// Detects keypoints on a prebuilt scale space and computes one descriptor per reference
/// orientation. Runs on the current rayon pool.
pub fn detect_with_scale_space(
    scale_space: &ScaleSpace,
    params: &SiftParams,
) -> Result<Vec<SiftKeypoint>> {
    params.validate()?;
    let mut keypoints = find_keypoints(&scale_space.dog, params);
    if let Some(limit) = params.max_keypoints {
        debug!("keeping at most {limit} of {} extrema", keypoints.len());
        retain_strongest(&mut keypoints, limit);
    }

    let collector = ResultCollector::new();
    parallel_for(keypoints.len(), |idx| {
        let template = &keypoints[idx];
        let oriented = find_keypoint_orientations(template, &scale_space.gradient, params)
            .into_iter()
            .map(|theta| {
                let mut kp = template.clone();
                kp.orientation = theta;
                kp.descriptor = compute_keypoint_descriptor(
                    &kp,
                    theta,
                    &scale_space.gradient,
                    params.lambda_desc,
                );
                kp
            });
        collector.extend(oriented);
    });
    let keypoints_with_desc = collector.into_inner();
    debug!(
        "{} oriented keypoints from {} extrema",
        keypoints_with_desc.len(),
        keypoints.len()
    );
    Ok(keypoints_with_desc)
}

/// Keeps the `limit` keypoints with the largest absolute DoG response.
/// Ties are broken by position in the scale space, so the selection does not depend on the
/// order the keypoints were detected in.
fn retain_strongest(keypoints: &mut Vec<SiftKeypoint>, limit: usize) {
    if limit >= keypoints.len() {
        return;
    }
    keypoints.sort_unstable_by(|kp1, kp2| {
        kp2.extremum_val
            .abs()
            .total_cmp(&kp1.extremum_val.abs())
            .then_with(|| {
                (kp1.octave, kp1.scale, kp1.j, kp1.i).cmp(&(kp2.octave, kp2.scale, kp2.j, kp2.i))
            })
    });
    keypoints.truncate(limit);
}

/// Stacks the descriptors of `keypoints` into an array of shape `(keypoints.len(), 128)`.
pub fn descriptors_to_array(keypoints: &[SiftKeypoint]) -> Array2<u8> {
    Array2::from_shape_fn((keypoints.len(), DESCRIPTOR_SIZE), |(row, col)| {
        keypoints[row].descriptor[col]
    })
}
