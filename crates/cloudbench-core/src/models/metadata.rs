use serde::{Deserialize, Serialize};

/// Complete reader-reported metadata for a point-cloud source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub point_count: u64,
    pub point_format: u8,
    /// LAS specification version, e.g. "1.2"
    pub version: String,
    pub software_id: String,
    pub system_id: String,
    pub compressed: bool,
    /// Raw WKT spatial reference, when the file declares one
    pub crs_wkt: Option<String>,
    pub minx: f64,
    pub maxx: f64,
    pub miny: f64,
    pub maxy: f64,
    pub minz: f64,
    pub maxz: f64,
}

/// Condensed metadata shown in the host's metadata panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryMetadata {
    pub points: u64,
    pub compressed: bool,
    /// Human-readable CRS name, `EPSG:n`, or "Unknown"
    pub crs_name: String,
    pub epsg: Option<u32>,
    /// Linear unit of the CRS, or "N/A" when unknown
    pub unit: String,
    pub software_id: String,
    pub x_range: String,
    pub y_range: String,
    pub z_range: String,
}

impl SummaryMetadata {
    /// `[lo to hi]` with two decimals, the format the metadata panel shows
    pub fn range_string(lo: f64, hi: f64) -> String {
        format!("[{:.2} to {:.2}]", lo, hi)
    }
}
