//! pgpointcloud schema-document codec
//!
//! Every patch table references a row in `pointcloud_formats` whose
//! `schema` column is an XML document describing the packed dimensions.
//! This module builds that document for a buffer's channel set, parses it
//! back when loading, and interleaves buffer values into the point-major
//! `float8[]` layout `PC_MakePatch` consumes.

use std::fmt::Write as _;
use std::ops::Range;

use cloudbench_core::error::{CloudbenchError, Result};
use cloudbench_core::models::PointBuffers;
use quick_xml::events::Event;
use quick_xml::Reader;

/// One packed dimension of a patch schema, in `pointcloud_formats` terms
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDimension {
    /// 1-based pack position
    pub position: u32,
    pub name: String,
    /// pgpointcloud interpretation keyword, e.g. `double` or `uint16_t`
    pub interpretation: String,
    /// Packed size in bytes
    pub size: u32,
}

/// Interpretation, size, and description for a channel name
fn channel_layout(name: &str) -> (&'static str, u32, &'static str) {
    match name {
        "X" => ("double", 8, "X coordinate"),
        "Y" => ("double", 8, "Y coordinate"),
        "Z" => ("double", 8, "Z coordinate"),
        "Intensity" => ("uint16_t", 2, "Pulse return amplitude"),
        "Classification" => ("uint8_t", 1, "ASPRS classification"),
        "Red" => ("uint16_t", 2, "Red image channel"),
        "Green" => ("uint16_t", 2, "Green image channel"),
        "Blue" => ("uint16_t", 2, "Blue image channel"),
        _ => ("double", 8, "Derived channel"),
    }
}

/// The packed dimensions a buffer's channel set maps to, in schema order
pub fn schema_dimensions(points: &PointBuffers) -> Vec<SchemaDimension> {
    points
        .dimension_names()
        .into_iter()
        .enumerate()
        .map(|(i, name)| {
            let (interpretation, size, _) = channel_layout(&name);
            SchemaDimension {
                position: i as u32 + 1,
                name,
                interpretation: interpretation.to_string(),
                size,
            }
        })
        .collect()
}

/// Render the `pointcloud_formats` XML document for `dims`
pub fn build_schema_xml(dims: &[SchemaDimension]) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <pc:PointCloudSchema xmlns:pc=\"http://pointcloud.org/schemas/PC/1.1\" \
         xmlns:xsi=\"http://www.w3.org/2001/XMLSchema-instance\">\n",
    );
    for dim in dims {
        let (_, _, description) = channel_layout(&dim.name);
        let _ = write!(
            xml,
            "  <pc:dimension>\n    <pc:position>{}</pc:position>\n    <pc:size>{}</pc:size>\n    <pc:description>{}</pc:description>\n    <pc:name>{}</pc:name>\n    <pc:interpretation>{}</pc:interpretation>\n  </pc:dimension>\n",
            dim.position, dim.size, description, dim.name, dim.interpretation
        );
    }
    xml.push_str(
        "  <pc:metadata>\n    <Metadata name=\"compression\">dimensional</Metadata>\n  </pc:metadata>\n</pc:PointCloudSchema>\n",
    );
    xml
}

/// Parse a `pointcloud_formats` schema document back into its dimensions,
/// sorted by pack position.
pub fn parse_schema_xml(xml: &str) -> Result<Vec<SchemaDimension>> {
    let mut reader = Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();

    let mut dims: Vec<SchemaDimension> = Vec::new();
    let mut current: Option<SchemaDimension> = None;
    let mut field: Option<Vec<u8>> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = e.local_name();
                if name.as_ref() == b"dimension" {
                    current = Some(SchemaDimension {
                        position: 0,
                        name: String::new(),
                        interpretation: String::new(),
                        size: 0,
                    });
                } else if current.is_some() {
                    field = Some(name.as_ref().to_vec());
                }
            }
            Ok(Event::Text(e)) => {
                if let (Some(dim), Some(field)) = (current.as_mut(), field.as_deref()) {
                    let text = e
                        .unescape()
                        .map_err(|e| invalid(format!("bad text node: {}", e)))?;
                    let text = text.trim();
                    match field {
                        b"position" => {
                            dim.position = text
                                .parse()
                                .map_err(|_| invalid(format!("bad position '{}'", text)))?;
                        }
                        b"size" => {
                            dim.size = text
                                .parse()
                                .map_err(|_| invalid(format!("bad size '{}'", text)))?;
                        }
                        b"name" => dim.name = text.to_string(),
                        b"interpretation" => dim.interpretation = text.to_string(),
                        _ => {}
                    }
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"dimension" {
                    match current.take() {
                        Some(dim) if !dim.name.is_empty() && dim.position > 0 => dims.push(dim),
                        Some(dim) => {
                            return Err(invalid(format!(
                                "dimension missing name or position: {:?}",
                                dim
                            )))
                        }
                        None => {}
                    }
                } else {
                    field = None;
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(invalid(format!("malformed XML: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    if dims.is_empty() {
        return Err(invalid("no dimensions declared".to_string()));
    }
    dims.sort_by_key(|d| d.position);
    Ok(dims)
}

/// Interleave `points[range]` into the point-major `float8[]` layout
/// `PC_MakePatch(pcid, float8[])` expects: every dimension of point 0,
/// then every dimension of point 1, and so on.
pub fn interleave(points: &PointBuffers, dims: &[SchemaDimension], range: Range<usize>) -> Vec<f64> {
    let mut values = Vec::with_capacity(range.len() * dims.len());
    for i in range {
        for dim in dims {
            values.push(points.value(&dim.name, i).unwrap_or(0.0));
        }
    }
    values
}

fn invalid(reason: String) -> CloudbenchError {
    CloudbenchError::Serialization(format!("Invalid patch schema document: {}", reason))
}
