//! Pipeline-definition and metadata JSON writers
//!
//! Both append a `.json` suffix when the chosen path lacks one and write
//! pretty-printed JSON, the shape external tooling consumes: the pipeline
//! file is a `{"pipeline": [...]}` document whose array holds the stage
//! configs, the metadata file mirrors the reader's full metadata record.

use std::fs;
use std::path::{Path, PathBuf};

use cloudbench_core::models::{FileMetadata, StageConfig, SummaryMetadata};
use cloudbench_core::ports::{MetadataWriter, PipelineWriter};
use cloudbench_core::{CloudbenchError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonPipelineWriter;

impl JsonPipelineWriter {
    pub fn new() -> Self {
        Self
    }
}

impl PipelineWriter for JsonPipelineWriter {
    fn write_pipeline(&self, path: &Path, pipeline: &[StageConfig]) -> Result<PathBuf> {
        let path = ensure_json_suffix(path);
        let document = serde_json::json!({ "pipeline": pipeline });
        let body = serde_json::to_string_pretty(&document)
            .map_err(|e| CloudbenchError::Serialization(format!("Failed to serialize pipeline: {}", e)))?;
        fs::write(&path, body).map_err(|e| write_failed(&path, &e.to_string()))?;
        Ok(path)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMetadataWriter;

impl JsonMetadataWriter {
    pub fn new() -> Self {
        Self
    }
}

impl MetadataWriter for JsonMetadataWriter {
    fn write_metadata(&self, path: &Path, metadata: &FileMetadata) -> Result<PathBuf> {
        write_json(path, metadata)
    }

    fn write_summary(&self, path: &Path, summary: &SummaryMetadata) -> Result<PathBuf> {
        write_json(path, summary)
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<PathBuf> {
    let path = ensure_json_suffix(path);
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| CloudbenchError::Serialization(format!("Failed to serialize metadata: {}", e)))?;
    fs::write(&path, body).map_err(|e| write_failed(&path, &e.to_string()))?;
    Ok(path)
}

/// Append `.json` unless the path already ends with it (case-insensitive).
fn ensure_json_suffix(path: &Path) -> PathBuf {
    let already_json = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"));
    if already_json {
        return path.to_path_buf();
    }
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".json");
    path.with_file_name(name)
}

fn write_failed(path: &Path, reason: &str) -> CloudbenchError {
    CloudbenchError::WriteFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}
