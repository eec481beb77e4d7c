//! LAS/LAZ reading and writing
//!
//! The reader materializes a whole file into [`PointBuffers`] and derives
//! the metadata the workbench shows; the writer emits point format 0 or 2
//! (2 when the buffers carry color), compressing when the target path says
//! `.laz`. Channels the LAS point record cannot hold (extra channels such
//! as `ClusterID`) are dropped on write.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use las::point::{Classification, Format};
use las::{Builder, Color, Point, Reader, Transform, Vector, Vlr, Writer};

use cloudbench_core::models::{Bounds, FileMetadata, PointBuffers, SummaryMetadata};
use cloudbench_core::ports::{PointReader, PointWriter};
use cloudbench_core::{CloudbenchError, Result};
use cloudbench_geo::{bounds_to_wgs84, parse_crs_info};

/// VLR identifiers for an OGC WKT coordinate system record.
const WKT_VLR_USER_ID: &str = "LASF_Projection";
const WKT_VLR_RECORD_ID: u16 = 2112;

const COORDINATE_SCALE: f64 = 0.001;

#[derive(Debug, Clone, Copy, Default)]
pub struct LasFileReader;

impl LasFileReader {
    pub fn new() -> Self {
        Self
    }

    fn open(&self, path: &Path) -> Result<Reader> {
        let file = File::open(path).map_err(|e| read_failed(path, &e.to_string()))?;
        Reader::new(BufReader::new(file)).map_err(|e| read_failed(path, &e.to_string()))
    }
}

impl PointReader for LasFileReader {
    fn read_points(&self, path: &Path) -> Result<PointBuffers> {
        let mut reader = self.open(path)?;
        let total = reader.header().number_of_points() as usize;
        let has_color = reader.header().point_format().has_color;

        let mut buffers = PointBuffers::new();
        buffers.x = Vec::with_capacity(total);
        buffers.y = Vec::with_capacity(total);
        buffers.z = Vec::with_capacity(total);
        let mut intensity = Vec::with_capacity(total);
        let mut classification = Vec::with_capacity(total);
        let mut red = Vec::new();
        let mut green = Vec::new();
        let mut blue = Vec::new();
        if has_color {
            red.reserve(total);
            green.reserve(total);
            blue.reserve(total);
        }

        for result in reader.points() {
            let point = result.map_err(|e| read_failed(path, &e.to_string()))?;
            buffers.x.push(point.x);
            buffers.y.push(point.y);
            buffers.z.push(point.z);
            intensity.push(point.intensity);
            let mut class = u8::from(point.classification);
            if point.is_overlap {
                class = 12;
            }
            classification.push(class);
            if has_color {
                let color = point.color.unwrap_or(Color {
                    red: 0,
                    green: 0,
                    blue: 0,
                });
                red.push(color.red);
                green.push(color.green);
                blue.push(color.blue);
            }
        }

        buffers.intensity = Some(intensity);
        buffers.classification = Some(classification);
        if has_color {
            buffers.red = Some(red);
            buffers.green = Some(green);
            buffers.blue = Some(blue);
        }

        tracing::debug!(path = %path.display(), count = buffers.len(), "read point file");
        Ok(buffers)
    }

    fn read_metadata(&self, path: &Path) -> Result<FileMetadata> {
        let reader = self.open(path)?;
        let header = reader.header();
        let bounds = header.bounds();
        let point_format = header
            .point_format()
            .to_u8()
            .map_err(|e| read_failed(path, &e.to_string()))?;

        Ok(FileMetadata {
            point_count: header.number_of_points(),
            point_format,
            version: format!("{}.{}", header.version().major, header.version().minor),
            software_id: header.generating_software().to_string(),
            system_id: header.system_identifier().to_string(),
            compressed: header.point_format().is_compressed,
            crs_wkt: wkt_record(header),
            minx: bounds.min.x,
            maxx: bounds.max.x,
            miny: bounds.min.y,
            maxy: bounds.max.y,
            minz: bounds.min.z,
            maxz: bounds.max.z,
        })
    }

    fn summarize(&self, metadata: &FileMetadata) -> SummaryMetadata {
        let info = metadata
            .crs_wkt
            .as_deref()
            .map(parse_crs_info)
            .unwrap_or_default();
        let crs_name = info
            .name
            .clone()
            .or_else(|| info.epsg.map(|epsg| format!("EPSG:{}", epsg)))
            .unwrap_or_else(|| "Unknown".to_string());

        SummaryMetadata {
            points: metadata.point_count,
            compressed: metadata.compressed,
            crs_name,
            epsg: info.epsg,
            unit: info.unit.unwrap_or_else(|| "N/A".to_string()),
            software_id: metadata.software_id.clone(),
            x_range: SummaryMetadata::range_string(metadata.minx, metadata.maxx),
            y_range: SummaryMetadata::range_string(metadata.miny, metadata.maxy),
            z_range: SummaryMetadata::range_string(metadata.minz, metadata.maxz),
        }
    }

    fn read_bounds(&self, path: &Path) -> Result<Bounds> {
        let metadata = self.read_metadata(path)?;
        let info = metadata
            .crs_wkt
            .as_deref()
            .map(parse_crs_info)
            .unwrap_or_default();
        let bounds = Bounds {
            minx: metadata.minx,
            maxx: metadata.maxx,
            miny: metadata.miny,
            maxy: metadata.maxy,
            minz: metadata.minz,
            maxz: metadata.maxz,
            epsg: info.epsg,
        };
        match info.epsg {
            Some(_) => match bounds_to_wgs84(&bounds) {
                Ok(wgs84) => Ok(wgs84),
                Err(e) => {
                    tracing::warn!("Falling back to source-CRS bounds: {}", e);
                    Ok(bounds)
                }
            },
            None => Ok(bounds),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LasFileWriter;

impl LasFileWriter {
    pub fn new() -> Self {
        Self
    }
}

impl PointWriter for LasFileWriter {
    fn write_points(
        &self,
        path: &Path,
        points: &PointBuffers,
        crs_wkt: Option<&str>,
    ) -> Result<u64> {
        let has_color = points.red.is_some() && points.green.is_some() && points.blue.is_some();
        let mut format = Format::new(if has_color { 2 } else { 0 })
            .map_err(|e| write_failed(path, &e.to_string()))?;
        format.is_compressed = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("laz"));

        let mut builder = Builder::default();
        builder.point_format = format;
        builder.generating_software = "cloudbench".to_string();
        builder.transforms = Vector {
            x: coordinate_transform(&points.x),
            y: coordinate_transform(&points.y),
            z: coordinate_transform(&points.z),
        };
        if let Some(wkt) = crs_wkt {
            let mut data = wkt.as_bytes().to_vec();
            data.push(0);
            builder.vlrs.push(Vlr {
                user_id: WKT_VLR_USER_ID.to_string(),
                record_id: WKT_VLR_RECORD_ID,
                description: "OGC WKT Coordinate System".to_string(),
                data,
            });
        }
        let header = builder
            .into_header()
            .map_err(|e| write_failed(path, &e.to_string()))?;

        let mut writer =
            Writer::from_path(path, header).map_err(|e| write_failed(path, &e.to_string()))?;
        for i in 0..points.len() {
            let mut point = Point {
                x: points.x[i],
                y: points.y[i],
                z: points.z[i],
                ..Point::default()
            };
            if let Some(intensity) = &points.intensity {
                point.intensity = intensity[i];
            }
            if let Some(classification) = &points.classification {
                match Classification::new(classification[i]) {
                    Ok(class) => point.classification = class,
                    // class 12 travels as the overlap flag
                    Err(_) if classification[i] == 12 => point.is_overlap = true,
                    Err(e) => return Err(write_failed(path, &e.to_string())),
                }
            }
            if has_color {
                point.color = Some(Color {
                    red: points.red.as_ref().map_or(0, |v| v[i]),
                    green: points.green.as_ref().map_or(0, |v| v[i]),
                    blue: points.blue.as_ref().map_or(0, |v| v[i]),
                });
            }
            writer
                .write_point(point)
                .map_err(|e| write_failed(path, &e.to_string()))?;
        }
        writer
            .close()
            .map_err(|e| write_failed(path, &e.to_string()))?;

        tracing::debug!(path = %path.display(), count = points.len(), "wrote point file");
        Ok(points.len() as u64)
    }
}

fn wkt_record(header: &las::Header) -> Option<String> {
    header
        .vlrs()
        .iter()
        .chain(header.evlrs().iter())
        .find(|vlr| vlr.user_id == WKT_VLR_USER_ID && vlr.record_id == WKT_VLR_RECORD_ID)
        .map(|vlr| {
            String::from_utf8_lossy(&vlr.data)
                .trim_end_matches('\0')
                .to_string()
        })
}

/// Millimeter precision, anchored at the data's minimum corner.
fn coordinate_transform(values: &[f64]) -> Transform {
    let offset = values.iter().copied().fold(f64::INFINITY, f64::min);
    Transform {
        scale: COORDINATE_SCALE,
        offset: if offset.is_finite() { offset } else { 0.0 },
    }
}

fn read_failed(path: &Path, reason: &str) -> CloudbenchError {
    CloudbenchError::ReadFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn write_failed(path: &Path, reason: &str) -> CloudbenchError {
    CloudbenchError::WriteFailed {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample() -> PointBuffers {
        let mut buffers = PointBuffers::from_xyz(
            vec![635_577.5, 635_580.0, 635_582.5],
            vec![848_882.0, 848_885.0, 848_888.0],
            vec![406.5, 407.0, 408.25],
        );
        buffers.intensity = Some(vec![100, 200, 300]);
        buffers.classification = Some(vec![2, 7, 2]);
        buffers
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("sample.las");

        let written = LasFileWriter::new().write_points(&path, &sample(), None).unwrap();
        assert_eq!(written, 3);

        let back = LasFileReader::new().read_points(&path).unwrap();
        assert_eq!(back.len(), 3);
        for i in 0..3 {
            assert!((back.x[i] - sample().x[i]).abs() < 0.001);
            assert!((back.z[i] - sample().z[i]).abs() < 0.001);
        }
        assert_eq!(back.intensity, Some(vec![100, 200, 300]));
        assert_eq!(back.classification, Some(vec![2, 7, 2]));
        // format 0 carries no color
        assert!(back.red.is_none());
    }

    #[test]
    fn test_color_selects_format_two() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("colored.las");

        let mut colored = sample();
        colored.red = Some(vec![1000, 2000, 3000]);
        colored.green = Some(vec![1100, 2100, 3100]);
        colored.blue = Some(vec![1200, 2200, 3200]);
        LasFileWriter::new().write_points(&path, &colored, None).unwrap();

        let metadata = LasFileReader::new().read_metadata(&path).unwrap();
        assert_eq!(metadata.point_format, 2);

        let back = LasFileReader::new().read_points(&path).unwrap();
        assert_eq!(back.red, Some(vec![1000, 2000, 3000]));
        assert_eq!(back.blue, Some(vec![1200, 2200, 3200]));
    }

    #[test]
    fn test_wkt_vlr_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("georeferenced.las");

        let wkt = r#"PROJCS["WGS 84 / UTM zone 35N",GEOGCS["WGS 84",UNIT["degree",0.0174532925199433]],UNIT["metre",1],AUTHORITY["EPSG","32635"]]"#;
        LasFileWriter::new()
            .write_points(&path, &sample(), Some(wkt))
            .unwrap();

        let metadata = LasFileReader::new().read_metadata(&path).unwrap();
        assert_eq!(metadata.crs_wkt.as_deref(), Some(wkt));

        let summary = LasFileReader::new().summarize(&metadata);
        assert_eq!(summary.epsg, Some(32635));
        assert_eq!(summary.unit, "metre");
        assert_eq!(summary.crs_name, "WGS 84 / UTM zone 35N");
        assert_eq!(summary.points, 3);
    }

    #[test]
    fn test_metadata_reports_extents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("extents.las");
        LasFileWriter::new().write_points(&path, &sample(), None).unwrap();

        let metadata = LasFileReader::new().read_metadata(&path).unwrap();
        assert_eq!(metadata.point_count, 3);
        assert!((metadata.minx - 635_577.5).abs() < 0.001);
        assert!((metadata.maxz - 408.25).abs() < 0.001);
        assert_eq!(metadata.version, "1.2");
        assert!(!metadata.compressed);
    }

    #[test]
    fn test_summary_without_crs() {
        let metadata = FileMetadata {
            point_count: 10,
            point_format: 0,
            version: "1.2".to_string(),
            software_id: "cloudbench".to_string(),
            system_id: "".to_string(),
            compressed: false,
            crs_wkt: None,
            minx: 0.0,
            maxx: 1.0,
            miny: 0.0,
            maxy: 1.0,
            minz: 0.0,
            maxz: 1.0,
        };
        let summary = LasFileReader::new().summarize(&metadata);
        assert_eq!(summary.crs_name, "Unknown");
        assert_eq!(summary.unit, "N/A");
        assert_eq!(summary.epsg, None);
        assert_eq!(summary.x_range, "[0.00 to 1.00]");
    }

    #[test]
    fn test_missing_file_is_read_failure() {
        let err = LasFileReader::new()
            .read_points(Path::new("/nonexistent/missing.las"))
            .unwrap_err();
        assert!(matches!(err, CloudbenchError::ReadFailed { .. }));
    }
}
