//! Reference orientations from a histogram of gradient directions. See Section 4.1 in [4].

use std::f32::consts::{PI, SQRT_2};

use itertools::iproduct;

use crate::params::SiftParams;
use crate::pyramid::{GradientImage, GradientPyramid, MIN_PIX_DIST};
use crate::SiftKeypoint;

pub const N_BINS: usize = 36;

/// In [4], the histogram is convolved 6 times with the kernel [1/3, 1/3, 1/3].
pub const SMOOTHING_PASSES: usize = 6;

/// Peaks at least this fraction of the global maximum yield a reference orientation.
const LOCALMAX_RATIO: f32 = 0.8;

/// Returns the reference orientations of `kp` in radians, each in [0; 2π).
///
/// Keypoints whose descriptor patch would not fit into the image get no orientation at all.
pub fn find_keypoint_orientations(
    kp: &SiftKeypoint,
    grad: &GradientPyramid,
    params: &SiftParams,
) -> Vec<f32> {
    let pix_dist = MIN_PIX_DIST * 2_f32.powi(kp.octave as i32);
    let img = grad.get(kp.octave, kp.scale);
    let min_dist_from_border = kp
        .x
        .min(kp.y)
        .min(pix_dist * img.width() as f32 - kp.x)
        .min(pix_dist * img.height() as f32 - kp.y);
    if min_dist_from_border <= SQRT_2 * params.lambda_desc * kp.sigma {
        return Vec::new();
    }
    let mut hist = orientation_histogram(kp, img, pix_dist, params.lambda_ori);
    smooth_histogram(&mut hist, SMOOTHING_PASSES);
    dominant_orientations(&hist)
}

/// Gradient magnitudes in a square patch of radius 3 λ_ori σ, weighted by a Gaussian of
/// std. dev. λ_ori σ and binned by direction. Eq. (19) to (21) in [4].
pub fn orientation_histogram(
    kp: &SiftKeypoint,
    img: &GradientImage,
    pix_dist: f32,
    lambda_ori: f32,
) -> [f32; N_BINS] {
    let patch_sigma = lambda_ori * kp.sigma;
    let patch_radius = 3. * patch_sigma;
    let weight_scale = -1. / (2. * patch_sigma * patch_sigma);
    let x_start = ((kp.x - patch_radius) / pix_dist).round() as i32;
    let x_end = ((kp.x + patch_radius) / pix_dist).round() as i32;
    let y_start = ((kp.y - patch_radius) / pix_dist).round() as i32;
    let y_end = ((kp.y + patch_radius) / pix_dist).round() as i32;

    let mut hist = [0.; N_BINS];
    for (y, x) in iproduct!(y_start..=y_end, x_start..=x_end) {
        let gx = img.gx(x, y);
        let gy = img.gy(x, y);
        let grad_norm = (gx * gx + gy * gy).sqrt();
        let dx = x as f32 * pix_dist - kp.x;
        let dy = y as f32 * pix_dist - kp.y;
        let weight = ((dx * dx + dy * dy) * weight_scale).exp();
        let theta = gy.atan2(gx).rem_euclid(2. * PI);
        let bin = (N_BINS as f32 / (2. * PI) * theta).round() as usize % N_BINS;
        hist[bin] += weight * grad_norm;
    }
    hist
}

/// Applies `passes` rounds of circular box filtering with the kernel [1/3, 1/3, 1/3].
pub fn smooth_histogram(hist: &mut [f32; N_BINS], passes: usize) {
    for _ in 0..passes {
        let prev_pass = *hist;
        for k in 0..N_BINS {
            let prev = prev_pass[(k + N_BINS - 1) % N_BINS];
            let next = prev_pass[(k + 1) % N_BINS];
            hist[k] = (prev + prev_pass[k] + next) / 3.;
        }
    }
}

/// Angles of strict local maxima of the histogram that are at least 0.8 times the global
/// maximum, refined by fitting a parabola through each peak and its neighbours. Eq. (23) in [4].
pub fn dominant_orientations(hist: &[f32; N_BINS]) -> Vec<f32> {
    let histogram_max = hist.iter().copied().fold(0., f32::max);
    let threshold = LOCALMAX_RATIO * histogram_max;
    (0..N_BINS)
        .filter_map(|k| {
            let h = hist[k];
            // Bins correspond to angles, so neighbours wrap around.
            let prev = hist[(k + N_BINS - 1) % N_BINS];
            let next = hist[(k + 1) % N_BINS];
            if h < threshold || h <= prev || h <= next {
                return None;
            }
            let interp = (prev - next) / (prev - 2. * h + next);
            let bin = k as f32 + 0.5 * interp;
            let theta = (2. * PI * bin / N_BINS as f32).rem_euclid(2. * PI);
            // rem_euclid rounds up to 2π for tiny negative angles
            Some(if theta < 2. * PI { theta } else { 0. })
        })
        .collect()
}
