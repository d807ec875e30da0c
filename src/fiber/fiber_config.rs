use serde::{Deserialize, Serialize};

use super::morphology::MAX_KERNEL;
use super::FiberError;

/// Tunables for every stage of the pipeline. Components read their own
/// parameters from this one immutable value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FiberConfig {
    /// Mean of the Otsu mask at or above which the raster is treated as bright
    /// background and inverted.
    pub brightness_threshold: u8,
    /// Connected components (8-connectivity) with fewer pixels are dropped.
    pub small_object_size: usize,
    /// Side of the square dilation kernel.
    pub dilation_kernel: usize,
    /// Adaptive threshold window (odd).
    pub adaptive_block_size: usize,
    /// Constant subtracted from the local mean; negative raises the threshold.
    pub adaptive_offset: i32,
    /// Binary dilations applied to the mask after thresholding.
    pub mask_dilate_iterations: usize,
    /// 3x3 closings applied to the skeleton. Re-thickens lines, so off by default.
    pub closing_passes: usize,
    /// Skeleton spurs of at most this many pixels are pruned. 0 disables pruning.
    pub spur_length: usize,
    /// Paths not longer than this are junction artifacts; also the connectivity cost ceiling.
    pub max_junction: f64,
    /// Largest accepted direction deviation at a junction, in degrees.
    pub max_angle: f64,
    /// Steps between an endpoint and the inner point used for its direction.
    pub delta: usize,
    /// Merged paths not longer than this are discarded.
    pub min_path_length: f64,
    /// Upper bound on least-cost route searches per image.
    pub max_connectivity_searches: usize,
    pub cluster: ClusterConfig,
    pub branch: BranchConfig,
}

impl Default for FiberConfig {
    fn default() -> Self {
        Self {
            brightness_threshold: 128,
            small_object_size: 200,
            dilation_kernel: 2,
            adaptive_block_size: 11,
            adaptive_offset: -2,
            mask_dilate_iterations: 3,
            closing_passes: 0,
            spur_length: 3,
            max_junction: 10.0,
            max_angle: 80.0,
            delta: 5,
            min_path_length: 30.0,
            max_connectivity_searches: 50_000,
            cluster: ClusterConfig::default(),
            branch: BranchConfig::default(),
        }
    }
}

/// Aggregate (endpoint clustering) mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub adaptive_block_size: usize,
    pub mask_dilate_iterations: usize,
    pub normalize_polarity: bool,
    pub max_junction: f64,
    pub min_path_length: f64,
    /// Share of each cluster's farthest endpoints used for the extremal distance.
    pub top_fraction: f64,
    /// IFL = MSFL + offset. Empirical; pending domain review.
    pub ifl_offset: f64,
    pub max_iterations: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            adaptive_block_size: 29,
            mask_dilate_iterations: 0,
            normalize_polarity: true,
            max_junction: 12.0,
            min_path_length: 12.0,
            top_fraction: 0.025,
            ifl_offset: 2.0,
            max_iterations: 300,
        }
    }
}

/// Branch summary mode: fixed global threshold, every skeleton branch reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchConfig {
    pub binary_threshold: u8,
    pub small_object_size: usize,
    pub min_length: f64,
}

impl Default for BranchConfig {
    fn default() -> Self {
        Self {
            binary_threshold: 25,
            small_object_size: 10,
            min_length: 10.0,
        }
    }
}

fn check(condition: bool, reason: &str) -> Result<(), FiberError> {
    if condition {
        Ok(())
    } else {
        Err(FiberError::InvalidConfig(reason.to_string()))
    }
}

fn valid_block_size(block_size: usize) -> bool {
    block_size >= 3 && block_size % 2 == 1
}

impl FiberConfig {
    pub fn validate(&self) -> Result<(), FiberError> {
        check((1..=MAX_KERNEL).contains(&self.dilation_kernel), "dilation_kernel must lie in [1, 511]")?;
        check(valid_block_size(self.adaptive_block_size), "adaptive_block_size must be odd and at least 3")?;
        check(valid_block_size(self.cluster.adaptive_block_size), "cluster.adaptive_block_size must be odd and at least 3")?;
        check(self.delta >= 1, "delta must be at least 1")?;
        check(self.max_junction.is_finite() && self.max_junction >= 0.0, "max_junction must be a finite non-negative number")?;
        check((0.0..=180.0).contains(&self.max_angle), "max_angle must lie in [0, 180]")?;
        check(self.min_path_length.is_finite() && self.min_path_length >= 0.0, "min_path_length must be a finite non-negative number")?;
        check(self.cluster.max_junction.is_finite() && self.cluster.max_junction >= 0.0, "cluster.max_junction must be a finite non-negative number")?;
        check(self.cluster.min_path_length.is_finite() && self.cluster.min_path_length >= 0.0, "cluster.min_path_length must be a finite non-negative number")?;
        check(self.cluster.top_fraction > 0.0 && self.cluster.top_fraction <= 1.0, "cluster.top_fraction must lie in (0, 1]")?;
        check(self.cluster.ifl_offset.is_finite(), "cluster.ifl_offset must be finite")?;
        check(self.cluster.max_iterations >= 1, "cluster.max_iterations must be at least 1")?;
        check(self.branch.min_length.is_finite() && self.branch.min_length >= 0.0, "branch.min_length must be a finite non-negative number")?;

        Ok(())
    }
}

pub fn validate_calibration(calibration_factor: f64) -> Result<(), FiberError> {
    check(
        calibration_factor.is_finite() && calibration_factor > 0.0,
        "calibration factor must be a positive finite number",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = FiberConfig::default();

        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.max_junction, 10.0);
        assert_eq!(config.cluster.max_junction, 12.0);
        assert_eq!(config.cluster.adaptive_block_size, 29);
    }

    #[test]
    fn even_block_size_is_rejected() {
        let config = FiberConfig {
            adaptive_block_size: 12,
            ..FiberConfig::default()
        };

        assert!(matches!(config.validate(), Err(FiberError::InvalidConfig(_))));
    }

    #[test]
    fn oversized_dilation_kernel_is_rejected() {
        let config = FiberConfig {
            dilation_kernel: 512,
            ..FiberConfig::default()
        };

        assert!(matches!(config.validate(), Err(FiberError::InvalidConfig(_))));
    }

    #[test]
    fn angle_out_of_range_is_rejected() {
        let config = FiberConfig {
            max_angle: 200.0,
            ..FiberConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn calibration_must_be_positive() {
        assert!(validate_calibration(1.0).is_ok());
        assert!(validate_calibration(0.0).is_err());
        assert!(validate_calibration(-2.5).is_err());
        assert!(validate_calibration(f64::NAN).is_err());
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: FiberConfig = serde_json::from_str(r#"{"max_angle": 45.0, "cluster": {"ifl_offset": 1.5}}"#).unwrap();

        assert_eq!(config.max_angle, 45.0);
        assert_eq!(config.cluster.ifl_offset, 1.5);
        assert_eq!(config.cluster.top_fraction, 0.025);
        assert_eq!(config.min_path_length, 30.0);
    }
}
