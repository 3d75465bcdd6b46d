use crate::error::{Result, SiftError};

/// Algorithm parameters. Defaults follow Table 4 of [4].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(
    any(test, feature = "serde"),
    derive(serde::Serialize, serde::Deserialize)
)]
pub struct SiftParams {
    /// Blur level of the seed image, in input pixel units. σ_min in [4].
    pub sigma_min: f32,
    pub num_octaves: usize,
    /// n_spo in [4]. Each octave holds `scales_per_octave + 3` Gaussian images.
    pub scales_per_octave: usize,
    /// C_DoG in [4], for images normalized to [0; 1].
    pub contrast_thresh: f32,
    /// C_edge in [4], upper bound on the ratio of principal curvatures.
    pub edge_thresh: f32,
    pub lambda_ori: f32,
    pub lambda_desc: f32,
    /// Keep only the strongest extrema (by absolute DoG response) before orientations
    /// and descriptors are computed.
    pub max_keypoints: Option<usize>,
    /// Run on a dedicated pool with this many workers instead of the global rayon pool.
    pub num_threads: Option<usize>,
}

impl Default for SiftParams {
    fn default() -> Self {
        Self {
            sigma_min: 0.8,
            num_octaves: 8,
            scales_per_octave: 3,
            contrast_thresh: 0.015,
            edge_thresh: 10.0,
            lambda_ori: 1.5,
            lambda_desc: 6.0,
            max_keypoints: None,
            num_threads: None,
        }
    }
}

impl SiftParams {
    pub fn with_sigma_min(mut self, sigma_min: f32) -> Self {
        self.sigma_min = sigma_min;
        self
    }

    pub fn with_num_octaves(mut self, num_octaves: usize) -> Self {
        self.num_octaves = num_octaves;
        self
    }

    pub fn with_scales_per_octave(mut self, scales_per_octave: usize) -> Self {
        self.scales_per_octave = scales_per_octave;
        self
    }

    pub fn with_contrast_thresh(mut self, contrast_thresh: f32) -> Self {
        self.contrast_thresh = contrast_thresh;
        self
    }

    pub fn with_edge_thresh(mut self, edge_thresh: f32) -> Self {
        self.edge_thresh = edge_thresh;
        self
    }

    pub fn with_lambda_ori(mut self, lambda_ori: f32) -> Self {
        self.lambda_ori = lambda_ori;
        self
    }

    pub fn with_lambda_desc(mut self, lambda_desc: f32) -> Self {
        self.lambda_desc = lambda_desc;
        self
    }

    pub fn with_max_keypoints(mut self, max_keypoints: Option<usize>) -> Self {
        self.max_keypoints = max_keypoints;
        self
    }

    pub fn with_num_threads(mut self, num_threads: Option<usize>) -> Self {
        self.num_threads = num_threads;
        self
    }

    /// Number of images per octave in the Gaussian and gradient pyramids.
    pub fn imgs_per_octave(&self) -> usize {
        self.scales_per_octave + 3
    }

    /// Number of images per octave in the DoG pyramid.
    pub fn dog_imgs_per_octave(&self) -> usize {
        self.scales_per_octave + 2
    }

    /// Smallest input side length for which every requested octave is at least one pixel wide.
    pub fn min_input_size(&self) -> usize {
        u32::try_from(self.num_octaves.saturating_sub(1))
            .ok()
            .and_then(|shift| 1_usize.checked_shl(shift))
            .unwrap_or(usize::MAX)
    }

    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, v: f32) -> Result<()> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                Err(SiftError::InvalidParameter(format!(
                    "{name} must be finite and positive, got {v}"
                )))
            }
        }
        positive("sigma_min", self.sigma_min)?;
        positive("edge_thresh", self.edge_thresh)?;
        positive("lambda_ori", self.lambda_ori)?;
        positive("lambda_desc", self.lambda_desc)?;
        if !self.contrast_thresh.is_finite() || self.contrast_thresh < 0.0 {
            return Err(SiftError::InvalidParameter(format!(
                "contrast_thresh must be finite and non-negative, got {}",
                self.contrast_thresh
            )));
        }
        if self.num_octaves == 0 {
            return Err(SiftError::InvalidParameter(
                "num_octaves must be at least 1".into(),
            ));
        }
        if self.scales_per_octave == 0 {
            return Err(SiftError::InvalidParameter(
                "scales_per_octave must be at least 1".into(),
            ));
        }
        if self.num_threads == Some(0) {
            return Err(SiftError::InvalidParameter(
                "num_threads must be at least 1".into(),
            ));
        }
        if self.max_keypoints == Some(0) {
            return Err(SiftError::InvalidParameter(
                "max_keypoints must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
