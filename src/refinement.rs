//! Sub-pixel and sub-scale localization of scale space extrema. See Section 3.2 to 3.4 in [4].

use crate::params::SiftParams;
use crate::pixel_buffer::PixelBuffer;
use crate::pyramid::MIN_PIX_DIST;
use crate::SiftKeypoint;

pub const MAX_REFINEMENT_ITERS: usize = 5;

/// Offsets of the fitted quadratic's extremum are accepted below this bound. Values slightly
/// above 0.5 keep points whose extremum sits right between two samples from bouncing back and
/// forth between them.
const MAX_OFFSET: f32 = 0.6;

/// Terminal state of [`refine_or_discard_keypoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refinement {
    /// The keypoint's continuous coordinates and `extremum_val` are set.
    Accepted,
    /// The extremum moved out of the octave's inner scales or out of the image.
    DiscardedBoundary,
    /// Low contrast, lying on an edge, or a singular Hessian.
    DiscardedQuality,
    DiscardedMaxIterations,
}

/// Second order Taylor expansion of the DoG around a sample point.
/// Offsets are in (scale, column, row) order and in units of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadraticFit {
    pub offset_s: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    /// DoG value at the extremum of the quadratic.
    pub value: f32,
}

impl QuadraticFit {
    fn is_finite(&self) -> bool {
        self.offset_s.is_finite() && self.offset_x.is_finite() && self.offset_y.is_finite()
    }

    fn max_offset(&self) -> f32 {
        self.offset_s
            .abs()
            .max(self.offset_x.abs())
            .max(self.offset_y.abs())
    }
}

/// Fits a quadratic to the 3x3x3 neighbourhood of `octave[scale]` at (x, y) using finite
/// differences, Eq. (14) in [4]. Reads are clamped at the image border.
///
/// A singular Hessian produces non-finite offsets.
pub fn fit_quadratic(octave: &[PixelBuffer], scale: usize, x: i32, y: i32) -> QuadraticFit {
    let prev = &octave[scale - 1];
    let curr = &octave[scale];
    let next = &octave[scale + 1];
    let val = curr.get(x, y, 0);

    // 3D gradient
    let g1 = (next.get(x, y, 0) - prev.get(x, y, 0)) * 0.5;
    let g2 = (curr.get(x + 1, y, 0) - curr.get(x - 1, y, 0)) * 0.5;
    let g3 = (curr.get(x, y + 1, 0) - curr.get(x, y - 1, 0)) * 0.5;

    // Hessian
    let h11 = next.get(x, y, 0) + prev.get(x, y, 0) - 2. * val;
    let h22 = curr.get(x + 1, y, 0) + curr.get(x - 1, y, 0) - 2. * val;
    let h33 = curr.get(x, y + 1, 0) + curr.get(x, y - 1, 0) - 2. * val;
    let h12 = (next.get(x + 1, y, 0) - next.get(x - 1, y, 0) - prev.get(x + 1, y, 0)
        + prev.get(x - 1, y, 0))
        * 0.25;
    let h13 = (next.get(x, y + 1, 0) - next.get(x, y - 1, 0) - prev.get(x, y + 1, 0)
        + prev.get(x, y - 1, 0))
        * 0.25;
    let h23 = (curr.get(x + 1, y + 1, 0) - curr.get(x + 1, y - 1, 0) - curr.get(x - 1, y + 1, 0)
        + curr.get(x - 1, y - 1, 0))
        * 0.25;

    // Symmetric inverse through cofactors
    let det = h11 * h22 * h33 - h11 * h23 * h23 - h12 * h12 * h33 + 2. * h12 * h13 * h23
        - h13 * h13 * h22;
    let hinv11 = (h22 * h33 - h23 * h23) / det;
    let hinv12 = (h13 * h23 - h12 * h33) / det;
    let hinv13 = (h12 * h23 - h13 * h22) / det;
    let hinv22 = (h11 * h33 - h13 * h13) / det;
    let hinv23 = (h12 * h13 - h11 * h23) / det;
    let hinv33 = (h11 * h22 - h12 * h12) / det;

    // α* = -H⁻¹ g
    let offset_s = -(hinv11 * g1 + hinv12 * g2 + hinv13 * g3);
    let offset_x = -(hinv12 * g1 + hinv22 * g2 + hinv23 * g3);
    let offset_y = -(hinv13 * g1 + hinv23 * g2 + hinv33 * g3);

    let value = val + 0.5 * (g1 * offset_s + g2 * offset_x + g3 * offset_y);
    QuadraticFit {
        offset_s,
        offset_x,
        offset_y,
        value,
    }
}

/// Measures "edgeness" of a point by the ratio between the eigenvalues of the 2D Hessian.
/// Eq. (17) and (18) in [4]. Saddle points (non-positive determinant) count as edges.
pub fn point_is_on_edge(img: &PixelBuffer, x: i32, y: i32, edge_thresh: f32) -> bool {
    let val2x = img.get(x, y, 0) * 2.;
    let h11 = img.get(x + 1, y, 0) + img.get(x - 1, y, 0) - val2x;
    let h22 = img.get(x, y + 1, 0) + img.get(x, y - 1, 0) - val2x;
    let h12 = (img.get(x + 1, y + 1, 0) - img.get(x + 1, y - 1, 0) - img.get(x - 1, y + 1, 0)
        + img.get(x - 1, y - 1, 0))
        * 0.25;

    let tr = h11 + h22;
    let det = h11 * h22 - h12 * h12;
    if det <= 0. {
        return true;
    }
    // tr^2 / det > (C_edge + 1)^2 / C_edge
    tr * tr * edge_thresh > (edge_thresh + 1.).powi(2) * det
}

/// Iteratively moves `kp` to the extremum of the quadratic fitted around it.
///
/// On [`Refinement::Accepted`], `x`, `y`, `sigma` and `extremum_val` of `kp` are set from the
/// final fit. Otherwise `kp` holds whatever state the last iteration left and should be dropped.
pub fn refine_or_discard_keypoint(
    kp: &mut SiftKeypoint,
    octave: &[PixelBuffer],
    params: &SiftParams,
) -> Refinement {
    let last_scale = octave.len() as i64 - 2;
    for _ in 0..MAX_REFINEMENT_ITERS {
        let fit = fit_quadratic(octave, kp.scale, kp.i, kp.j);
        if !fit.is_finite() {
            return Refinement::DiscardedQuality;
        }
        kp.extremum_val = fit.value;

        let max_offset = fit.max_offset();
        if max_offset < MAX_OFFSET {
            if fit.value.abs() > params.contrast_thresh
                && !point_is_on_edge(&octave[kp.scale], kp.i, kp.j, params.edge_thresh)
            {
                set_continuous_coords(kp, &fit, params);
                return Refinement::Accepted;
            }
            // Snapping would not move the point, so the next fit would be identical.
            if max_offset < 0.5 {
                return Refinement::DiscardedQuality;
            }
        }

        let scale = kp.scale as i64 + fit.offset_s.round() as i64;
        let i = i64::from(kp.i) + fit.offset_x.round() as i64;
        let j = i64::from(kp.j) + fit.offset_y.round() as i64;
        let img = &octave[0];
        if scale < 1
            || scale > last_scale
            || i < 0
            || j < 0
            || i >= img.width() as i64
            || j >= img.height() as i64
        {
            return Refinement::DiscardedBoundary;
        }
        kp.scale = scale as usize;
        kp.i = i as i32;
        kp.j = j as i32;
    }
    Refinement::DiscardedMaxIterations
}

/// Eq. (16) in [4]: coordinates in input image pixels and absolute blur level.
fn set_continuous_coords(kp: &mut SiftKeypoint, fit: &QuadraticFit, params: &SiftParams) {
    let octave_scale = 2_f32.powi(kp.octave as i32);
    let pix_dist = MIN_PIX_DIST * octave_scale;
    kp.sigma = octave_scale
        * params.sigma_min
        * 2_f32.powf((fit.offset_s + kp.scale as f32) / params.scales_per_octave as f32);
    kp.x = pix_dist * (fit.offset_x + kp.i as f32);
    kp.y = pix_dist * (fit.offset_y + kp.j as f32);
}
