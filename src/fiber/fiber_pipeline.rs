use std::fmt::Display;

use image::DynamicImage;
use log::debug;
use serde::{Deserialize, Serialize};

use super::fiber_binarizer::FiberBinarizer;
use super::fiber_branches::{BranchMeasurer, BranchSummary};
use super::fiber_cluster::{ClusterEstimate, ClusterLengthEstimator};
use super::fiber_config::validate_calibration;
use super::fiber_length_calculator::{FiberLength, FiberLengthCalculator};
use super::fiber_skeleton::{FiberSkeletonizer, Skeleton};
use super::junction_merger::JunctionMerger;
use super::skeleton_graph::SkeletonGraphExtractor;
use super::{FiberConfig, FiberError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FiberMode {
    PerFiber,
    Aggregate,
    Branches,
}

impl Display for FiberMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FiberMode::PerFiber => write!(f, "per-fiber"),
            FiberMode::Aggregate => write!(f, "aggregate"),
            FiberMode::Branches => write!(f, "branches"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum FiberReport {
    PerFiber { fibers: Vec<FiberLength> },
    Aggregate(ClusterEstimate),
    Branches(BranchSummary),
}

/// Image to fiber length measurements. Holds only the validated
/// configuration, so one pipeline can serve any number of images.
pub struct FiberPipeline {
    config: FiberConfig,
}

impl FiberPipeline {
    pub fn new(config: FiberConfig) -> Result<FiberPipeline, FiberError> {
        config.validate()?;

        Ok(FiberPipeline { config })
    }

    pub fn config(&self) -> &FiberConfig {
        &self.config
    }

    fn skeleton(&self, binarizer: &FiberBinarizer, raster: &DynamicImage) -> Result<Skeleton, FiberError> {
        let mask = binarizer.binarize(raster)?;
        let skeleton = FiberSkeletonizer::new(&self.config).skeletonize(&mask);

        if skeleton.is_empty() {
            return Err(FiberError::EmptySkeleton);
        }

        Ok(skeleton)
    }

    /// Per-fiber lengths in pixels, in survivor id order.
    pub fn measure_fibers(&self, raster: &DynamicImage) -> Result<Vec<FiberLength>, FiberError> {
        let skeleton = self.skeleton(&FiberBinarizer::for_segmentation(&self.config), raster)?;

        self.measure_skeleton(&skeleton)
    }

    pub fn measure_skeleton(&self, skeleton: &Skeleton) -> Result<Vec<FiberLength>, FiberError> {
        let paths = SkeletonGraphExtractor::new(self.config.max_junction).extract(skeleton);
        let merged = JunctionMerger::new(&self.config).merge(paths, skeleton);
        let fibers = FiberLengthCalculator {
            min_path_length: self.config.min_path_length,
        }
        .calculate_fiber_lengths(&merged);

        debug!("per-fiber: {} merged paths, {} fibers", merged.len(), fibers.len());

        if fibers.is_empty() {
            return Err(FiberError::NoQualifyingPaths);
        }

        Ok(fibers)
    }

    /// Aggregate MSFL / IFL / mean length, scaled by `calibration_factor`.
    pub fn estimate_aggregate(&self, raster: &DynamicImage, calibration_factor: f64) -> Result<ClusterEstimate, FiberError> {
        validate_calibration(calibration_factor)?;
        let skeleton = self.skeleton(&FiberBinarizer::for_clustering(&self.config), raster)?;

        ClusterLengthEstimator::new(&self.config).estimate(&skeleton, calibration_factor)
    }

    pub fn summarize_branches(&self, raster: &DynamicImage) -> Result<BranchSummary, FiberError> {
        let measurer = BranchMeasurer::new(&self.config);
        let skeleton = measurer.skeletonize(raster)?;

        if skeleton.is_empty() {
            return Err(FiberError::EmptySkeleton);
        }

        measurer.measure(&skeleton)
    }

    pub fn run(&self, raster: &DynamicImage, calibration_factor: f64, mode: FiberMode) -> Result<FiberReport, FiberError> {
        debug!("running {} mode on a {}x{} raster", mode, raster.width(), raster.height());

        match mode {
            FiberMode::PerFiber => Ok(FiberReport::PerFiber {
                fibers: self.measure_fibers(raster)?,
            }),
            FiberMode::Aggregate => Ok(FiberReport::Aggregate(
                self.estimate_aggregate(raster, calibration_factor)?,
            )),
            FiberMode::Branches => Ok(FiberReport::Branches(self.summarize_branches(raster)?)),
        }
    }
}
