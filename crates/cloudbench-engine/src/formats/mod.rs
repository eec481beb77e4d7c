//! File format adapters: LAS/LAZ point I/O, pipeline and metadata JSON,
//! and the elevation-grid raster writer.

pub mod grid;
pub mod las;
pub mod pipeline;
