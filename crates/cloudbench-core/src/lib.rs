//! CloudBench Core - domain models, tool registry, and collaborator ports
//!
//! This crate holds everything the other CloudBench crates share: the
//! columnar point-buffer model, pipeline stages and their backend configs,
//! the layer context with its bounded stage cache, the tool registry that
//! expands user parameters into executable stages, render reduction, the
//! layered configuration, and the trait ports the session controller is
//! wired with.

pub mod cache;
pub mod config;
pub mod error;
pub mod models;
pub mod ports;
pub mod registry;
pub mod render;

pub use error::{CloudbenchError, Result};
