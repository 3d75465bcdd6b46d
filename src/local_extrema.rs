use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use rayon::prelude::*;

use crate::parallel::{parallel_for, ResultCollector};
use crate::params::SiftParams;
use crate::pixel_buffer::PixelBuffer;
use crate::pyramid::ImagePyramid;
use crate::refinement::{refine_or_discard_keypoint, Refinement};
use crate::SiftKeypoint;

/// Candidates with an absolute DoG value below this fraction of the contrast threshold are
/// skipped before the neighbourhood scan. See Section 3.3 in [4].
const PRE_CONTRAST_RATIO: f32 = 0.8;

/// Returns true if `octave[scale]` at (x, y) is greater or equal (or less or equal) than all
/// 26 neighbours in the 3D DoG. Reads outside the image are clamped.
pub fn point_is_local_extremum(octave: &[PixelBuffer], scale: usize, x: i32, y: i32) -> bool {
    let prev = &octave[scale - 1];
    let curr = &octave[scale];
    let next = &octave[scale + 1];
    let val = curr.get(x, y, 0);

    let mut is_min = true;
    let mut is_max = true;
    for dx in -1..=1 {
        for dy in -1..=1 {
            for img in [prev, curr, next] {
                let neighbor = img.get(x + dx, y + dy, 0);
                is_max &= neighbor <= val;
                is_min &= neighbor >= val;
            }
            if !is_min && !is_max {
                return false;
            }
        }
    }
    true
}

/// Scans every interior DoG image for scale space extrema and refines them.
///
/// Images are processed in parallel, and so are the pixels within each image. Refined keypoints
/// are appended to a shared collection, so the returned order is arbitrary.
pub fn find_keypoints(dog: &ImagePyramid, params: &SiftParams) -> Vec<SiftKeypoint> {
    let (keypoints, num_candidates) = scan_and_refine(dog, params);
    debug!(
        "{num_candidates} scale space extrema, {} kept after refinement",
        keypoints.len()
    );
    keypoints
}

/// Refined keypoints and the number of extrema they were refined from.
fn scan_and_refine(dog: &ImagePyramid, params: &SiftParams) -> (Vec<SiftKeypoint>, usize) {
    let imgs_per_octave = dog.imgs_per_octave();
    let pre_threshold = PRE_CONTRAST_RATIO * params.contrast_thresh;
    let images: Vec<(usize, usize)> = (0..dog.num_octaves())
        .flat_map(|octave| (1..imgs_per_octave.saturating_sub(1)).map(move |s| (octave, s)))
        .collect();

    let num_candidates = AtomicUsize::new(0);
    let collector = ResultCollector::new();
    images.par_iter().for_each(|&(octave, scale)| {
        let imgs = dog.octave(octave);
        let img = &imgs[scale];
        let (width, height) = (img.width(), img.height());
        if width < 3 || height < 3 {
            return;
        }
        let inner_width = width - 2;
        parallel_for(inner_width * (height - 2), |idx| {
            let x = (1 + idx % inner_width) as i32;
            let y = (1 + idx / inner_width) as i32;
            if img.get(x, y, 0).abs() < pre_threshold {
                return;
            }
            if !point_is_local_extremum(imgs, scale, x, y) {
                return;
            }
            num_candidates.fetch_add(1, Ordering::Relaxed);
            let mut kp = SiftKeypoint::template(x, y, octave, scale);
            if refine_or_discard_keypoint(&mut kp, imgs, params) == Refinement::Accepted {
                collector.push(kp);
            }
        });
    });
    (collector.into_inner(), num_candidates.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::Pyramid;
    use ndarray::Array2;

    fn octave_from_fn(
        n: usize,
        size: usize,
        f: impl Fn(usize, usize, usize) -> f32,
    ) -> Vec<PixelBuffer> {
        (0..n)
            .map(|s| {
                PixelBuffer::from_array2(Array2::from_shape_fn((size, size), |(y, x)| f(s, x, y)))
                    .unwrap()
            })
            .collect()
    }

    #[test]
    fn detects_maximum_and_minimum() {
        let octave = octave_from_fn(3, 5, |s, x, y| {
            if (s, x, y) == (1, 2, 2) {
                1.0
            } else {
                0.01 * x as f32
            }
        });
        assert!(point_is_local_extremum(&octave, 1, 2, 2));
        assert!(!point_is_local_extremum(&octave, 1, 1, 2));

        let octave = octave_from_fn(3, 5, |s, x, y| match (s, x, y) {
            (1, 3, 1) => -1.0,
            _ => 0.0,
        });
        assert!(point_is_local_extremum(&octave, 1, 3, 1));
    }

    #[test]
    fn larger_neighbour_in_adjacent_scale() {
        let octave = octave_from_fn(3, 5, |s, x, y| match (s, x, y) {
            (1, 2, 2) => 1.0,
            (2, 3, 3) => 1.5,
            _ => 0.0,
        });
        assert!(!point_is_local_extremum(&octave, 1, 2, 2));
        let octave = octave_from_fn(3, 5, |s, x, y| match (s, x, y) {
            (1, 2, 2) => 1.0,
            (0, 1, 2) => 1.1,
            _ => 0.0,
        });
        assert!(!point_is_local_extremum(&octave, 1, 2, 2));
    }

    #[test]
    fn ties_count_as_extremum() {
        let octave = octave_from_fn(3, 4, |_, _, _| 0.3);
        assert!(point_is_local_extremum(&octave, 1, 1, 1));
        // reads across the border are clamped
        assert!(point_is_local_extremum(&octave, 1, 0, 3));
    }

    #[test]
    fn isolated_peak_is_refined() {
        // Separable quadratic bump peaking between samples, well above the contrast threshold.
        let octave = octave_from_fn(5, 16, |s, x, y| {
            let ds = s as f32 - 2.1;
            let dx = x as f32 - 7.3;
            let dy = y as f32 - 8.2;
            0.2 - 0.01 * (ds * ds + dx * dx + dy * dy)
        });
        let dog = Pyramid::from_octaves(vec![octave]);
        let (keypoints, num_candidates) = scan_and_refine(&dog, &SiftParams::default());
        assert_eq!(num_candidates, 1);
        assert_eq!(keypoints.len(), 1, "{keypoints:?}");
        let kp = &keypoints[0];
        assert_eq!((kp.i, kp.j, kp.octave, kp.scale), (7, 8, 0, 2));
        assert!((kp.x - 0.5 * 7.3).abs() < 1e-3);
        assert!((kp.y - 0.5 * 8.2).abs() < 1e-3);
        assert!((kp.extremum_val - 0.2).abs() < 1e-4);
    }

    #[test]
    fn extrema_are_counted_before_refinement() {
        let bump = |s: usize, x: usize, y: usize| {
            let ds = s as f32 - 2.1;
            let dx = x as f32 - 7.3;
            let dy = y as f32 - 8.2;
            0.2 - 0.01 * (ds * ds + dy * dy) - 0.0001 * dx * dx
        };
        // A ridge along x: one extremum, discarded by the edge test.
        let dog = Pyramid::from_octaves(vec![octave_from_fn(5, 16, bump)]);
        let (keypoints, num_candidates) = scan_and_refine(&dog, &SiftParams::default());
        assert_eq!(num_candidates, 1);
        assert!(keypoints.is_empty(), "{keypoints:?}");

        let (keypoints, num_candidates) = scan_and_refine(
            &Pyramid::from_octaves(vec![octave_from_fn(5, 16, |_, _, _| 0.)]),
            &SiftParams::default(),
        );
        assert_eq!((keypoints.len(), num_candidates), (0, 0));
    }

    #[test]
    fn flat_dog_has_no_keypoints() {
        let octave = octave_from_fn(5, 12, |_, _, _| 0.0);
        let dog = Pyramid::from_octaves(vec![octave.clone(), octave]);
        assert!(find_keypoints(&dog, &SiftParams::default()).is_empty());
    }
}
