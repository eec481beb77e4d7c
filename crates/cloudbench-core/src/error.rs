//! Error types for CloudBench

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CloudbenchError {
    // Tool registry errors
    #[error("Tool not found: {name}")]
    ToolNotFound { name: String },

    #[error("Tool already registered: {name}")]
    ToolAlreadyRegistered { name: String },

    #[error("Tool '{tool}' is missing required parameter '{key}'")]
    MissingParameter { tool: String, key: String },

    #[error("Invalid value for parameter '{key}' of tool '{tool}': {reason}")]
    InvalidParameter {
        tool: String,
        key: String,
        reason: String,
    },

    // Pipeline execution errors
    #[error("Stage {index} failed: {message}")]
    StageFailed { index: usize, message: String },

    #[error("Invalid stage configuration: {reason}")]
    InvalidStageConfig { reason: String },

    #[error("Stage type '{kind}' is not executable by the native backend")]
    UnsupportedStage { kind: String },

    #[error("Pipeline produced no points")]
    EmptyResult,

    #[error("Execution interrupted before completion")]
    Interrupted,

    // Reader/writer errors
    #[error("No file path given")]
    EmptyPath,

    #[error("Failed to read {path}: {reason}")]
    ReadFailed { path: PathBuf, reason: String },

    #[error("Failed to write {path}: {reason}")]
    WriteFailed { path: PathBuf, reason: String },

    // CRS errors
    #[error("CRS transformation failed: {reason}")]
    CrsTransform { reason: String },

    // Database errors
    #[error("Database error: {0}")]
    Database(String),

    #[error("No points found for the given table and predicate")]
    EmptyTable,

    #[error("Import incomplete: {written} points were committed before a later pass failed: {reason}")]
    PartialImport { written: u64, reason: String },

    // Configuration errors
    #[error("Invalid configuration value for {key}: {reason}")]
    ConfigInvalid { key: String, reason: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CloudbenchError>;
