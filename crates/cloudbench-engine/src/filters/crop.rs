//! Crop filter: keep points inside an axis-aligned box
//!
//! Bounds use the pipeline-file notation `([minx,maxx],[miny,maxy])`,
//! optionally with a third `[minz,maxz]` pair.

use cloudbench_core::models::PointBuffers;
use cloudbench_core::{CloudbenchError, Result};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropBounds {
    pub minx: f64,
    pub maxx: f64,
    pub miny: f64,
    pub maxy: f64,
    pub z: Option<(f64, f64)>,
}

impl CropBounds {
    fn contains(&self, x: f64, y: f64, z: f64) -> bool {
        if x < self.minx || x > self.maxx || y < self.miny || y > self.maxy {
            return false;
        }
        match self.z {
            Some((lo, hi)) => z >= lo && z <= hi,
            None => true,
        }
    }
}

/// Parse `([minx,maxx],[miny,maxy])` / `([minx,maxx],[miny,maxy],[minz,maxz])`.
pub fn parse_bounds(bounds: &str) -> Result<CropBounds> {
    let pairs = bracket_pairs(bounds)?;
    let ranges: Vec<(f64, f64)> = pairs
        .iter()
        .map(|(lo, hi)| ordered(*lo, *hi, bounds))
        .collect::<Result<_>>()?;

    match ranges.as_slice() {
        [x, y] => Ok(CropBounds {
            minx: x.0,
            maxx: x.1,
            miny: y.0,
            maxy: y.1,
            z: None,
        }),
        [x, y, z] => Ok(CropBounds {
            minx: x.0,
            maxx: x.1,
            miny: y.0,
            maxy: y.1,
            z: Some(*z),
        }),
        _ => Err(invalid(&format!(
            "bounds '{}' must hold two or three [min,max] pairs",
            bounds
        ))),
    }
}

fn bracket_pairs(bounds: &str) -> Result<Vec<(f64, f64)>> {
    let mut pairs = Vec::new();
    let mut rest = bounds;
    while let Some(open) = rest.find('[') {
        let close = rest[open..]
            .find(']')
            .ok_or_else(|| invalid(&format!("bounds '{}' has an unclosed '['", bounds)))?;
        let body = &rest[open + 1..open + close];
        let (lo, hi) = body
            .split_once(',')
            .ok_or_else(|| invalid(&format!("bounds '{}' pair '{}' has no comma", bounds, body)))?;
        let parse = |t: &str| {
            t.trim().parse::<f64>().map_err(|_| {
                invalid(&format!("bounds '{}' has non-numeric value '{}'", bounds, t.trim()))
            })
        };
        pairs.push((parse(lo)?, parse(hi)?));
        rest = &rest[open + close + 1..];
    }
    if pairs.is_empty() {
        return Err(invalid(&format!("bounds '{}' holds no [min,max] pairs", bounds)));
    }
    Ok(pairs)
}

fn ordered(lo: f64, hi: f64, bounds: &str) -> Result<(f64, f64)> {
    if lo > hi {
        return Err(invalid(&format!("bounds '{}' has a min above its max", bounds)));
    }
    Ok((lo, hi))
}

fn invalid(reason: &str) -> CloudbenchError {
    CloudbenchError::InvalidStageConfig {
        reason: reason.to_string(),
    }
}

pub fn apply(bounds: &str, input: &PointBuffers) -> Result<PointBuffers> {
    let the_box = parse_bounds(bounds)?;
    let mask: Vec<bool> = (0..input.len())
        .map(|i| the_box.contains(input.x[i], input.y[i], input.z[i]))
        .collect();
    Ok(input.retain_mask(&mask))
}
