//! CloudBench Geo - CRS identification and coordinate reprojection
//!
//! Point-cloud sources report their CRS as raw WKT. This crate pulls out
//! the pieces the workbench needs (EPSG code, linear unit, display name)
//! and wraps the PROJ bindings for canonicalizing bounds to WGS84 and
//! reprojecting coordinate arrays.

pub mod crs;
pub mod transform;

pub use crs::{parse_crs_info, parse_epsg_code, CrsInfo};
pub use transform::{bounds_to_wgs84, transform_bounds, transform_coords, WGS84_EPSG};
