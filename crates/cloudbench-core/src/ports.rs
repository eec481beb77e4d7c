//! Collaborator ports consumed by the session controller.
//!
//! The processing backend and the file readers/writers are synchronous and
//! blocking; the session runs them on blocking worker threads. Database
//! and preset stores have their own async ports in the store crate.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Bounds, FileMetadata, PointBuffers, StageConfig, SummaryMetadata};

/// Cooperative cancellation flag shared between a dispatcher and its
/// worker. Workers check it at stage-group boundaries; a stage that is
/// already running is never killed mid-flight.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One ordered group of backend configs executed as a unit.
///
/// A tagged group reports its point-count transition, so a logical tool
/// that expanded to several backend stages still logs as a single step.
#[derive(Debug, Clone)]
pub struct StageGroup {
    pub configs: Vec<StageConfig>,
    pub tag: Option<String>,
}

impl StageGroup {
    pub fn untagged(configs: Vec<StageConfig>) -> Self {
        Self { configs, tag: None }
    }

    pub fn tagged(configs: Vec<StageConfig>, tag: impl Into<String>) -> Self {
        Self {
            configs,
            tag: Some(tag.into()),
        }
    }
}

/// Everything the backend needs for one execution run
#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    /// File to read when no seed is given; `None` for seeded runs
    pub source: Option<PathBuf>,
    /// Already-materialized buffers to continue from instead of reading
    pub seed: Option<Arc<PointBuffers>>,
    pub groups: Vec<StageGroup>,
    /// Point count before this run, for delta reporting
    pub baseline_count: u64,
    /// EPSG the source coordinates are in, when known
    pub source_epsg: Option<u32>,
}

impl ExecutionPlan {
    /// Plan that starts from in-memory buffers
    pub fn seeded(seed: Arc<PointBuffers>, groups: Vec<StageGroup>, source_epsg: Option<u32>) -> Self {
        let baseline_count = seed.len() as u64;
        Self {
            source: None,
            seed: Some(seed),
            groups,
            baseline_count,
            source_epsg,
        }
    }

    /// Plan that starts by reading a file
    pub fn from_file(source: PathBuf, groups: Vec<StageGroup>, source_epsg: Option<u32>) -> Self {
        Self {
            source: Some(source),
            seed: None,
            groups,
            baseline_count: 0,
            source_epsg,
        }
    }
}

/// Progress report delivered after each tagged group finishes
#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    /// Group index within the plan
    pub index: usize,
    pub tag: String,
    pub input_count: u64,
    pub output_count: u64,
}

/// Final result of a plan execution
#[derive(Debug)]
pub struct ExecutionOutput {
    pub points: PointBuffers,
    pub count: u64,
}

/// The native processing backend: runs stage groups over point buffers.
pub trait PipelineBackend: Send + Sync {
    /// Execute `plan` start to finish, invoking `on_stage` after every
    /// tagged group. Checks `cancel` between groups and returns
    /// [`Interrupted`](crate::CloudbenchError::Interrupted) once it
    /// observes it; an exhausted pipeline yields
    /// [`EmptyResult`](crate::CloudbenchError::EmptyResult).
    fn execute(
        &self,
        plan: &ExecutionPlan,
        cancel: &CancelFlag,
        on_stage: &mut dyn FnMut(StageReport),
    ) -> Result<ExecutionOutput>;
}

/// Reads point data and metadata from LAS/LAZ files
pub trait PointReader: Send + Sync {
    fn read_points(&self, path: &Path) -> Result<PointBuffers>;

    fn read_metadata(&self, path: &Path) -> Result<FileMetadata>;

    /// Condense reader metadata into what the metadata panel shows
    fn summarize(&self, metadata: &FileMetadata) -> SummaryMetadata;

    /// File bounds canonicalized to WGS84 when the CRS is known; raw
    /// coordinates (with `epsg: None`) when it is not
    fn read_bounds(&self, path: &Path) -> Result<Bounds>;
}

/// Writes point buffers to a file, reporting points written
pub trait PointWriter: Send + Sync {
    /// `crs_wkt` is embedded when the format can carry it
    fn write_points(&self, path: &Path, points: &PointBuffers, crs_wkt: Option<&str>)
        -> Result<u64>;
}

/// Serializes an executable pipeline definition to a structured text file
pub trait PipelineWriter: Send + Sync {
    /// Returns the path actually written; a `.json` suffix is appended
    /// when the given path lacks one
    fn write_pipeline(&self, path: &Path, pipeline: &[StageConfig]) -> Result<PathBuf>;
}

/// Serializes source metadata to a structured text file
pub trait MetadataWriter: Send + Sync {
    fn write_metadata(&self, path: &Path, metadata: &FileMetadata) -> Result<PathBuf>;

    /// Fallback for layers that never carried full reader metadata
    /// (database loads); writes the condensed summary instead
    fn write_summary(&self, path: &Path, summary: &SummaryMetadata) -> Result<PathBuf>;
}
