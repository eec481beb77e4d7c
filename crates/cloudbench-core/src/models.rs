//! Core domain models for CloudBench

pub mod dimension;
pub mod layer;
pub mod metadata;
pub mod points;
pub mod preset;
pub mod stage;

pub use dimension::{classification_label, Dimension};
pub use layer::{LayerContext, RenderStyle, SourceDescriptor};
pub use metadata::{FileMetadata, SummaryMetadata};
pub use points::{Bounds, PointBuffers};
pub use preset::{BatchPreset, ConnectionProfile, StageSpec};
pub use stage::{ParamValue, PipelineStage, StageConfig};
