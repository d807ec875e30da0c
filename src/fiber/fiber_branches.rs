use image::DynamicImage;
use log::debug;
use ndarray::Array1;
use serde::Serialize;

use super::fiber_binarizer::{to_gray, BinaryMask};
use super::fiber_skeleton::{FiberSkeletonizer, Skeleton};
use super::morphology::dilate;
use super::skeleton_graph::{trace_paths, NodeKind, Path};
use super::{FiberConfig, FiberError};
use crate::linalg::Pixel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BranchType {
    EndpointToEndpoint,
    JunctionToEndpoint,
    JunctionToJunction,
    Loop,
}

impl BranchType {
    fn of(path: &Path) -> BranchType {
        let junctions = [path.start_kind, path.end_kind]
            .iter()
            .filter(|&&kind| kind == NodeKind::Junction)
            .count();

        match (path.start_kind, junctions) {
            (NodeKind::Loop, _) => BranchType::Loop,
            (_, 0) => BranchType::EndpointToEndpoint,
            (_, 1) => BranchType::JunctionToEndpoint,
            _ => BranchType::JunctionToJunction,
        }
    }

    /// Numeric code: 0 endpoint-endpoint, 1 junction-endpoint, 2 junction-junction, 3 loop.
    pub fn code(&self) -> u8 {
        match self {
            BranchType::EndpointToEndpoint => 0,
            BranchType::JunctionToEndpoint => 1,
            BranchType::JunctionToJunction => 2,
            BranchType::Loop => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Branch {
    pub id: usize,
    pub length: f64,
    pub source: Pixel,
    pub destination: Pixel,
    pub branch_type: BranchType,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchSummary {
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation; 0 for fewer than two branches.
    pub std: f64,
    pub branches: Vec<Branch>,
}

pub struct BranchMeasurer {
    pub binary_threshold: u8,
    pub dilation_kernel: usize,
    pub min_length: f64,
    pub skeletonizer: FiberSkeletonizer,
}

impl BranchMeasurer {
    pub fn new(config: &FiberConfig) -> BranchMeasurer {
        BranchMeasurer {
            binary_threshold: config.branch.binary_threshold,
            dilation_kernel: config.dilation_kernel,
            min_length: config.branch.min_length,
            skeletonizer: FiberSkeletonizer {
                small_object_size: config.branch.small_object_size,
                spur_length: config.spur_length,
                closing_passes: 0,
            },
        }
    }

    /// Fixed global threshold on the dilated grayscale, without polarity
    /// normalization.
    pub fn binarize(&self, raster: &DynamicImage) -> Result<BinaryMask, FiberError> {
        let gray = dilate(&to_gray(raster)?, self.dilation_kernel);

        Ok(gray.mapv(|v| v > self.binary_threshold))
    }

    pub fn skeletonize(&self, raster: &DynamicImage) -> Result<Skeleton, FiberError> {
        Ok(self.skeletonizer.skeletonize(&self.binarize(raster)?))
    }

    pub fn measure(&self, skeleton: &Skeleton) -> Result<BranchSummary, FiberError> {
        let branches: Vec<Branch> = trace_paths(skeleton)
            .iter()
            .enumerate()
            .filter(|(_, path)| path.length > self.min_length)
            .map(|(id, path)| Branch {
                id,
                length: path.length,
                source: path.head(),
                destination: path.tail(),
                branch_type: BranchType::of(path),
            })
            .collect();

        if branches.is_empty() {
            return Err(FiberError::NoQualifyingPaths);
        }

        let lengths: Array1<f64> = branches.iter().map(|b| b.length).collect();
        let mean = lengths.mean().ok_or(FiberError::NoQualifyingPaths)?;
        let std = if lengths.len() < 2 { 0.0 } else { lengths.std(1.0) };

        debug!("branch summary: {} branches, mean {:.3}, std {:.3}", branches.len(), mean, std);

        Ok(BranchSummary {
            count: branches.len(),
            mean,
            std,
            branches,
        })
    }
}
