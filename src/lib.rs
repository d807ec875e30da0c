mod linalg;
pub mod fiber;

pub use linalg::Pixel;
pub use fiber::{
    annotate, annotate_with_text, ClusterEstimate, FiberConfig, FiberError, FiberLength, FiberMode, FiberPipeline,
    FiberReport,
};
