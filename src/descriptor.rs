//! Normalized descriptor of the gradient orientation distribution around a keypoint.
//! See Section 4.2 in [4].

use std::f32::consts::{PI, SQRT_2};

use itertools::iproduct;
use ndarray::{Array3, ArrayViewMut3};

use crate::pyramid::{GradientPyramid, MIN_PIX_DIST};
use crate::SiftKeypoint;

/// Number of spatial histograms along each axis of the descriptor patch.
pub const N_HIST: usize = 4;
/// Number of orientation bins of each spatial histogram.
pub const N_ORI: usize = 8;
pub const DESCRIPTOR_SIZE: usize = N_HIST * N_HIST * N_ORI;

/// Components of the normalized vector are capped at this fraction of its L2 norm.
const DESCRIPTOR_MAGNITUDE_CAP: f32 = 0.2;
/// L2 norm of the vector before quantization to bytes.
const DESCRIPTOR_L2_NORM: f32 = 512.0;

/// Computes the descriptor of `kp` relative to the reference orientation `theta` (radians).
///
/// The patch is sampled on the gradient image `kp` was detected in. Samples whose normalized
/// coordinates fall outside the `N_HIST x N_HIST` grid of histograms plus half a cell on each
/// side do not contribute.
pub fn compute_keypoint_descriptor(
    kp: &SiftKeypoint,
    theta: f32,
    grad: &GradientPyramid,
    lambda_desc: f32,
) -> [u8; DESCRIPTOR_SIZE] {
    let pix_dist = MIN_PIX_DIST * 2_f32.powi(kp.octave as i32);
    let img = grad.get(kp.octave, kp.scale);
    let (sin_t, cos_t) = theta.sin_cos();
    let patch_sigma = lambda_desc * kp.sigma;
    let weight_scale = -1. / (2. * patch_sigma * patch_sigma);
    let patch_bound = lambda_desc * (N_HIST + 1) as f32 / N_HIST as f32;
    // Half side of the axis aligned square containing the rotated patch. Eq. (26) in [4]
    let half_size = SQRT_2 * patch_bound * kp.sigma;
    let x_start = ((kp.x - half_size) / pix_dist).round() as i32;
    let x_end = ((kp.x + half_size) / pix_dist).round() as i32;
    let y_start = ((kp.y - half_size) / pix_dist).round() as i32;
    let y_end = ((kp.y + half_size) / pix_dist).round() as i32;

    let mut hist = Array3::<f32>::zeros((N_HIST, N_HIST, N_ORI));
    for (n, m) in iproduct!(y_start..=y_end, x_start..=x_end) {
        let dx = m as f32 * pix_dist - kp.x;
        let dy = n as f32 * pix_dist - kp.y;
        // Coordinates in the keypoint's reference frame, in units of sigma
        let x = (dx * cos_t + dy * sin_t) / kp.sigma;
        let y = (-dx * sin_t + dy * cos_t) / kp.sigma;
        if x.abs().max(y.abs()) > patch_bound {
            continue;
        }
        let gx = img.gx(m, n);
        let gy = img.gy(m, n);
        let theta_mn = (gy.atan2(gx) - theta).rem_euclid(2. * PI);
        let grad_norm = (gx * gx + gy * gy).sqrt();
        let contrib = ((dx * dx + dy * dy) * weight_scale).exp() * grad_norm;
        update_histograms(hist.view_mut(), x, y, contrib, theta_mn, lambda_desc);
    }
    hists_to_vec(hist.as_slice().expect("freshly allocated arrays are contiguous"))
}

/// Distributes `contrib` over the (up to) 2x2x2 histogram bins closest to the sample by
/// trilinear interpolation. Eq. (28) in [4].
///
/// `hist` is indexed by (row, column, orientation), with rows along the keypoint frame's y axis.
fn update_histograms(
    mut hist: ArrayViewMut3<f32>,
    x: f32,
    y: f32,
    contrib: f32,
    theta_mn: f32,
    lambda_desc: f32,
) {
    let cell_width = 2. * lambda_desc / N_HIST as f32;
    let cell_center = |idx: usize| (idx as f32 + 1. - (1 + N_HIST) as f32 / 2.) * cell_width;
    let ori_width = 2. * PI / N_ORI as f32;

    for row in 0..N_HIST {
        let y_dist = (cell_center(row) - y).abs();
        if y_dist > cell_width {
            continue;
        }
        let y_weight = 1. - y_dist / cell_width;
        for col in 0..N_HIST {
            let x_dist = (cell_center(col) - x).abs();
            if x_dist > cell_width {
                continue;
            }
            let x_weight = 1. - x_dist / cell_width;
            for k in 0..N_ORI {
                let ori_dist = angle_diff(theta_mn, k as f32 * ori_width).abs();
                if ori_dist >= ori_width {
                    continue;
                }
                let ori_weight = 1. - ori_dist / ori_width;
                hist[(row, col, k)] += y_weight * x_weight * ori_weight * contrib;
            }
        }
    }
}

/// `a - b` wrapped into (-π; π].
fn angle_diff(a: f32, b: f32) -> f32 {
    let d = (a - b).rem_euclid(2. * PI);
    if d > PI {
        d - 2. * PI
    } else {
        d
    }
}

/// Caps the components of `hist` at 0.2 times its L2 norm and returns the norm of the capped
/// vector.
pub fn cap_histogram(hist: &mut [f32]) -> f32 {
    let l2_uncapped = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
    let component_cap = l2_uncapped * DESCRIPTOR_MAGNITUDE_CAP;
    hist.iter_mut().for_each(|v| *v = v.min(component_cap));
    hist.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Normalizes the concatenated histograms to an L2 norm of 512 after capping and quantizes
/// them to bytes. Eq. (29) in [4].
pub fn hists_to_vec(hist: &[f32]) -> [u8; DESCRIPTOR_SIZE] {
    assert_eq!(hist.len(), DESCRIPTOR_SIZE);
    let mut capped = hist.to_vec();
    let l2_capped = cap_histogram(&mut capped);
    let l2_normalizer = DESCRIPTOR_L2_NORM / l2_capped.max(f32::EPSILON);

    let mut out = [0; DESCRIPTOR_SIZE];
    out.iter_mut().zip(capped).for_each(|(o, v)| {
        // Saturating cast to u8
        *o = (v * l2_normalizer).floor().clamp(0., u8::MAX as f32) as u8;
    });
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pixel_buffer::PixelBuffer;
    use crate::pyramid::{gradient_image, Pyramid};
    use ndarray::Array2;

    fn gradients(size: usize, f: impl Fn(usize, usize) -> f32) -> GradientPyramid {
        let img = PixelBuffer::from_array2(Array2::from_shape_fn((size, size), |(y, x)| f(x, y)))
            .unwrap();
        let grad = gradient_image(&img).unwrap();
        Pyramid::from_octaves(vec![vec![grad; 4]])
    }

    fn keypoint(x: f32, y: f32, sigma: f32) -> SiftKeypoint {
        let mut kp = SiftKeypoint::template((2. * x) as i32, (2. * y) as i32, 0, 1);
        kp.x = x;
        kp.y = y;
        kp.sigma = sigma;
        kp
    }

    #[test]
    fn angle_difference_wraps() {
        assert!((angle_diff(0.1, 2. * PI - 0.1) - 0.2).abs() < 1e-5);
        assert!((angle_diff(2. * PI - 0.1, 0.1) + 0.2).abs() < 1e-5);
        assert!((angle_diff(1.0, 0.25) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn single_sample_goes_to_nearest_bins() {
        let mut hist = Array3::<f32>::zeros((N_HIST, N_HIST, N_ORI));
        // Exactly on the center of cell (1, 2) and on orientation bin 3
        let cell_width = 2. * 6. / N_HIST as f32;
        let x = 0.5 * cell_width;
        let y = -0.5 * cell_width;
        update_histograms(hist.view_mut(), x, y, 2.0, 3. * PI / 4., 6.);
        assert!((hist[(1, 2, 3)] - 2.0).abs() < 1e-5);
        assert!((hist.sum() - 2.0).abs() < 1e-5);

        // Halfway between orientation bins 7 and 0
        let mut hist = Array3::<f32>::zeros((N_HIST, N_HIST, N_ORI));
        update_histograms(hist.view_mut(), x, y, 1.0, 2. * PI - PI / 8., 6.);
        assert!((hist[(1, 2, 7)] - 0.5).abs() < 1e-5);
        assert!((hist[(1, 2, 0)] - 0.5).abs() < 1e-5);
    }

    #[test]
    fn sample_outside_grid_is_partially_counted() {
        let mut hist = Array3::<f32>::zeros((N_HIST, N_HIST, N_ORI));
        // Half a cell beyond the outermost cell center
        update_histograms(hist.view_mut(), 6.0, 0.0, 1.0, 0.0, 6.);
        assert!((hist.sum() - 0.5).abs() < 1e-5);
        assert!((hist[(1, 3, 0)] - 0.25).abs() < 1e-5);
        assert!((hist[(2, 3, 0)] - 0.25).abs() < 1e-5);
    }

    #[test]
    fn capping() {
        let mut hist = vec![0.; DESCRIPTOR_SIZE];
        hist[0] = 10.;
        hist[1] = 1.;
        hist[2] = 1.;
        let l2 = hist.iter().map(|v| v * v).sum::<f32>().sqrt();
        let capped_norm = cap_histogram(&mut hist);
        assert!(hist.iter().all(|v| *v <= 0.2 * l2 + 1e-6));
        assert!((hist[0] - 0.2 * l2).abs() < 1e-5);
        assert_eq!(hist[1], 1.);
        let expected = (hist[0] * hist[0] + 2.).sqrt();
        assert!((capped_norm - expected).abs() < 1e-5);
    }

    #[test]
    fn quantization_is_saturating() {
        // A single nonzero bin gets capped at 0.2 of itself and then rescaled to 512.
        let mut hist = vec![0.; DESCRIPTOR_SIZE];
        hist[5] = 3.;
        let desc = hists_to_vec(&hist);
        assert_eq!(desc[5], 255);
        assert_eq!(desc.iter().filter(|v| **v != 0).count(), 1);

        // Uniform vector: 512 / sqrt(128) = 45.25
        let desc = hists_to_vec(&[1.; DESCRIPTOR_SIZE]);
        assert!(desc.iter().all(|v| *v == 45));

        assert_eq!(hists_to_vec(&[0.; DESCRIPTOR_SIZE]), [0; DESCRIPTOR_SIZE]);
    }

    #[test]
    fn flat_image_has_zero_descriptor() {
        let grad = gradients(96, |_, _| 0.4);
        let desc = compute_keypoint_descriptor(&keypoint(24., 24., 1.5), 0.3, &grad, 6.);
        assert_eq!(desc, [0; DESCRIPTOR_SIZE]);
    }

    #[test]
    fn uniform_gradient_uses_one_orientation_bin() {
        // Gradient along +x everywhere
        let grad = gradients(96, |x, _| 0.01 * x as f32);
        let kp = keypoint(24., 24., 1.5);
        let desc = compute_keypoint_descriptor(&kp, 0., &grad, 6.);
        for (idx, v) in desc.iter().enumerate() {
            if idx % N_ORI != 0 {
                assert_eq!(*v, 0, "bin {idx}");
            }
        }
        assert!(desc.iter().step_by(N_ORI).all(|v| *v > 0));

        // Relative to a reference orientation of 90 degrees the gradient points to -90 degrees.
        let desc = compute_keypoint_descriptor(&kp, PI / 2., &grad, 6.);
        let dominant = (0..N_ORI)
            .max_by_key(|k| desc.iter().skip(*k).step_by(N_ORI).map(|v| *v as u32).sum::<u32>())
            .unwrap();
        assert_eq!(dominant, 6);
    }
}
