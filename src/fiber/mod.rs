mod fiber_annotate;
mod fiber_binarizer;
mod fiber_branches;
mod fiber_cluster;
mod fiber_config;
mod fiber_error;
mod fiber_length_calculator;
mod fiber_pipeline;
mod fiber_skeleton;
mod junction_merger;
mod morphology;
mod skeleton_graph;


pub use fiber_annotate::{annotate, annotate_with_text};
pub use fiber_binarizer::{adaptive_threshold, normalize_polarity, to_gray, BinaryMask, FiberBinarizer};
pub use fiber_branches::{Branch, BranchMeasurer, BranchSummary, BranchType};
pub use fiber_cluster::{ClusterEstimate, ClusterLengthEstimator};
pub use fiber_config::{validate_calibration, BranchConfig, ClusterConfig, FiberConfig};
pub use fiber_error::FiberError;
pub use fiber_length_calculator::{FiberLength, FiberLengthCalculator};
pub use fiber_pipeline::{FiberMode, FiberPipeline, FiberReport};
pub use fiber_skeleton::{prune_spurs, thin, FiberSkeletonizer, Skeleton};
pub use junction_merger::{least_cost_route, Endpoint, JunctionMerger, MergeCandidate, Side};
pub use morphology::remove_small_objects;
pub use skeleton_graph::{trace_paths, NodeKind, Path, SkeletonGraphExtractor};
