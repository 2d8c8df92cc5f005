pub mod models;
pub mod optimizer;
pub mod selection;

pub use models::{JobMetadata, OptimizationBundle, SourceMaterial};
pub use optimizer::{OptimizeError, Optimizer, OptimizerSettings};
