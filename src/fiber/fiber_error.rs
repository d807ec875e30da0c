use std::fmt::Display;

#[derive(Debug, Clone, PartialEq)]
pub enum FiberError {
    DegenerateCentroids,
    EmptySkeleton,
    InsufficientEndpoints(usize),
    InvalidConfig(String),
    InvalidImage,
    NoQualifyingPaths,
}

impl Display for FiberError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FiberError::DegenerateCentroids =>
                write!(f, "Endpoint centroids coincide, the bisector is undefined"),
            FiberError::EmptySkeleton =>
                write!(f, "No foreground survived thresholding and skeletonization"),
            FiberError::InsufficientEndpoints(found) =>
                write!(f, "At least 2 skeleton endpoints are required for clustering, found {}", found),
            FiberError::InvalidConfig(reason) =>
                write!(f, "Invalid configuration: {}", reason),
            FiberError::InvalidImage =>
                write!(f, "Raster is empty or could not be read as a 2D image"),
            FiberError::NoQualifyingPaths =>
                write!(f, "No skeleton path is longer than the minimum path length"),
        }
    }
}

impl std::error::Error for FiberError {}
