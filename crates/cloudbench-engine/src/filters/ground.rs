//! Morphological ground classification (SMRF-style)
//!
//! A simplified take on the simple-morphological-filter family: the XY
//! plane is gridded at `cell` resolution and a provisional ground surface
//! is taken as the minimum elevation within a `window`-sized neighborhood
//! of each cell. A point is ground when it sits within
//! `threshold + slope * window` of that surface. Ground points get class
//! 2, the rest class 1; points matched by the optional `ignore` range
//! expression keep their classification and never shape the surface.

use std::collections::HashMap;

use cloudbench_core::models::PointBuffers;
use cloudbench_core::{CloudbenchError, Result};

use super::outlier::ensure_classification;
use super::range;

pub const GROUND_CLASS: u8 = 2;
pub const UNCLASSIFIED: u8 = 1;

#[derive(Debug, Clone)]
pub struct GroundParams {
    pub cell: f64,
    pub slope: f64,
    pub window: f64,
    pub threshold: f64,
}

pub fn apply(
    input: &PointBuffers,
    params: &GroundParams,
    ignore: Option<&str>,
) -> Result<PointBuffers> {
    if params.cell <= 0.0 {
        return Err(invalid(format!("cell size must be positive, got {}", params.cell)));
    }
    if params.window < 0.0 || params.slope < 0.0 || params.threshold < 0.0 {
        return Err(invalid(format!(
            "slope/window/threshold must be non-negative, got {}/{}/{}",
            params.slope, params.window, params.threshold
        )));
    }

    let ignored = match ignore {
        Some(limits) => range::match_mask(limits, input)?,
        None => vec![false; input.len()],
    };

    // minimum elevation per occupied cell, ignored points excluded
    let mut minima: HashMap<(i64, i64), f64> = HashMap::new();
    for i in 0..input.len() {
        if ignored[i] {
            continue;
        }
        let key = cell_of(input.x[i], input.y[i], params.cell);
        let entry = minima.entry(key).or_insert(f64::INFINITY);
        if input.z[i] < *entry {
            *entry = input.z[i];
        }
    }

    let reach = (params.window / params.cell).ceil() as i64;
    let height_cap = params.threshold + params.slope * params.window;

    let mut output = input.clone();
    ensure_classification(&mut output);
    let Some(classification) = output.classification.as_mut() else {
        return Ok(output);
    };

    for i in 0..input.len() {
        if ignored[i] {
            continue;
        }
        let (cx, cy) = cell_of(input.x[i], input.y[i], params.cell);
        let surface = neighborhood_minimum(&minima, cx, cy, reach);
        classification[i] = if input.z[i] - surface <= height_cap {
            GROUND_CLASS
        } else {
            UNCLASSIFIED
        };
    }

    Ok(output)
}

fn cell_of(x: f64, y: f64, cell: f64) -> (i64, i64) {
    ((x / cell).floor() as i64, (y / cell).floor() as i64)
}

fn neighborhood_minimum(minima: &HashMap<(i64, i64), f64>, cx: i64, cy: i64, reach: i64) -> f64 {
    let mut min = f64::INFINITY;
    for dx in -reach..=reach {
        for dy in -reach..=reach {
            if let Some(&z) = minima.get(&(cx + dx, cy + dy)) {
                if z < min {
                    min = z;
                }
            }
        }
    }
    min
}

fn invalid(reason: String) -> CloudbenchError {
    CloudbenchError::InvalidStageConfig { reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> GroundParams {
        GroundParams {
            cell: 1.0,
            slope: 0.15,
            window: 3.0,
            threshold: 0.5,
        }
    }

    /// Flat terrain at z=0 with one elevated blob (a roof) at z=8.
    fn terrain_with_roof() -> PointBuffers {
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut z = Vec::new();
        for i in 0..10 {
            for j in 0..10 {
                x.push(i as f64 + 0.5);
                y.push(j as f64 + 0.5);
                z.push(0.0);
            }
        }
        for i in 4..6 {
            for j in 4..6 {
                x.push(i as f64 + 0.5);
                y.push(j as f64 + 0.5);
                z.push(8.0);
            }
        }
        PointBuffers::from_xyz(x, y, z)
    }

    #[test]
    fn test_flat_terrain_is_ground() {
        let out = apply(&terrain_with_roof(), &params(), None).unwrap();
        let classes = out.classification.unwrap();
        assert!(classes[..100].iter().all(|&c| c == GROUND_CLASS));
    }

    #[test]
    fn test_roof_is_not_ground() {
        let out = apply(&terrain_with_roof(), &params(), None).unwrap();
        let classes = out.classification.unwrap();
        assert!(classes[100..].iter().all(|&c| c == UNCLASSIFIED));
    }

    #[test]
    fn test_ignored_noise_keeps_class_and_surface_is_unpolluted() {
        // one noise return far below the terrain
        let mut input = terrain_with_roof();
        input.x.push(5.0);
        input.y.push(5.0);
        input.z.push(-50.0);
        let mut classes = vec![0u8; 104];
        classes.push(7);
        input.classification = Some(classes);

        let out = apply(&input, &params(), Some("Classification[7:7]")).unwrap();
        let classes = out.classification.unwrap();
        // the noise return keeps its class
        assert_eq!(classes[104], 7);
        // and did not drag the surface down around it
        assert!(classes[..100].iter().all(|&c| c == GROUND_CLASS));
    }

    #[test]
    fn test_gentle_slope_stays_ground() {
        // 5% grade across 20 meters
        let mut x = Vec::new();
        let mut y = Vec::new();
        let mut z = Vec::new();
        for i in 0..20 {
            x.push(i as f64 + 0.5);
            y.push(0.5);
            z.push(i as f64 * 0.05);
        }
        let input = PointBuffers::from_xyz(x, y, z);
        let out = apply(&input, &params(), None).unwrap();
        let classes = out.classification.unwrap();
        assert!(classes.iter().all(|&c| c == GROUND_CLASS));
    }

    #[test]
    fn test_invalid_parameters() {
        let input = PointBuffers::from_xyz(vec![0.0], vec![0.0], vec![0.0]);
        let bad = GroundParams {
            cell: 0.0,
            ..params()
        };
        assert!(apply(&input, &bad, None).is_err());
    }
}
