//! CloudBench Engine - the native point-cloud processing backend
//!
//! Implements the execution ports declared in `cloudbench-core`: the stage
//! interpreter (`NativeBackend`) that runs filter chains over columnar
//! buffers with cooperative cancellation, the LAS/LAZ reader and writer,
//! the pipeline/metadata JSON writers, the elevation-grid writer, and
//! dataset statistics.

pub mod executor;
pub mod filters;
pub mod formats;
pub mod stats;

pub use executor::NativeBackend;
pub use formats::grid::{ElevationGridWriter, GridOutput};
pub use formats::las::{LasFileReader, LasFileWriter};
pub use formats::pipeline::{JsonMetadataWriter, JsonPipelineWriter};
pub use stats::{compute_statistics, DimensionStats, StatsReport};
