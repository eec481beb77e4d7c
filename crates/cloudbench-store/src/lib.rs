//! CloudBench Store - storage ports and adapters
//!
//! This crate defines the async storage ports the session consumes and
//! provides the adapter implementations: a PostgreSQL pointcloud backend
//! for patch tables and batch presets, and in-memory stores for
//! connection profiles and testing.

pub mod memory;
pub mod ports;
pub mod postgres;

pub use memory::{MemoryPresetStore, MemoryProfileStore};
pub use ports::{
    ImportReport, LoadOptions, PatchStore, PatchStoreProvider, PatchTableInfo, PresetStore,
    ProfileStore, TableLoad, TableRef,
};
pub use postgres::{PostgresProvider, PostgresStore};
