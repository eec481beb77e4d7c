use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cloudbench_core::error::Result;
use cloudbench_core::models::{BatchPreset, Bounds, ConnectionProfile, PointBuffers, SummaryMetadata};
use uuid::Uuid;

/// A patch table address within the connected database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
    pub column: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
            column: "patch".to_string(),
        }
    }

    /// `schema.table` as shown in logs and layer keys
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.schema, self.table)
    }
}

/// How much of a table to pull and which rows qualify
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Raw SQL predicate appended to the patch query; empty means all rows
    pub predicate: String,
    /// Ceiling on points returned; larger tables are strided down
    pub ceiling: usize,
}

/// What an import run actually committed
#[derive(Debug, Clone, PartialEq)]
pub struct ImportReport {
    pub written: u64,
    pub srid: u32,
    pub patch_count: u64,
}

/// A decimated table read plus everything needed to build a layer from it
#[derive(Debug)]
pub struct TableLoad {
    pub points: PointBuffers,
    /// Points in the table before striding
    pub total_in_table: u64,
    /// Server-side decimation step that was applied (1 = none)
    pub stride: u64,
    /// Bounds of the fetched points, WGS84 when the SRID allowed it
    pub bounds: Bounds,
    pub summary: SummaryMetadata,
    pub srid: u32,
}

/// A pointcloud-typed column discovered in the database
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchTableInfo {
    pub schema: String,
    pub table: String,
    pub column: String,
    pub srid: u32,
}

/// Port for point-cloud patch storage (pgpointcloud tables)
#[async_trait]
pub trait PatchStore: Send + Sync {
    /// Read a LAS/LAZ file and write its points to `target`. The SRID is
    /// detected from the file's CRS, falling back to the configured default.
    async fn import_file(
        &self,
        target: &TableRef,
        path: &Path,
        source_name: &str,
    ) -> Result<ImportReport>;

    /// Write already-materialized buffers to `target` under an explicit SRID
    async fn import_buffers(
        &self,
        target: &TableRef,
        points: &PointBuffers,
        srid: u32,
        source_name: &str,
    ) -> Result<ImportReport>;

    /// Fetch a decimated view of `target`, at most `options.ceiling` points
    async fn load_table(&self, target: &TableRef, options: &LoadOptions) -> Result<TableLoad>;

    /// Patch tables visible in the connected database
    async fn list_tables(&self) -> Result<Vec<PatchTableInfo>>;
}

/// Opens a [`PatchStore`] for a connection profile.
///
/// Database operations name their target connection per call, so the
/// session holds a provider rather than a single connected store; each
/// `open` verifies the connection before any work is dispatched.
#[async_trait]
pub trait PatchStoreProvider: Send + Sync {
    async fn open(&self, profile: &ConnectionProfile) -> Result<Arc<dyn PatchStore>>;
}

/// Port for persisted batch presets
#[async_trait]
pub trait PresetStore: Send + Sync {
    /// Store a preset; an existing preset with the same id is replaced
    async fn save_preset(&self, preset: &BatchPreset) -> Result<()>;

    /// Retrieve a preset by id
    async fn get_preset(&self, id: Uuid) -> Result<Option<BatchPreset>>;

    /// List all presets, newest first
    async fn list_presets(&self) -> Result<Vec<BatchPreset>>;

    /// Delete a preset
    async fn delete_preset(&self, id: Uuid) -> Result<()>;
}

/// Port for named connection profiles
#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Store a profile; an existing profile with the same name is replaced
    async fn save_profile(&self, profile: &ConnectionProfile) -> Result<()>;

    /// Retrieve a profile by name
    async fn get_profile(&self, name: &str) -> Result<Option<ConnectionProfile>>;

    /// List all profiles, sorted by name
    async fn list_profiles(&self) -> Result<Vec<ConnectionProfile>>;

    /// Delete a profile
    async fn delete_profile(&self, name: &str) -> Result<()>;
}
