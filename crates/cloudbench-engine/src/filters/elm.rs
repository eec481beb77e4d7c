//! Extended local minimum: flag low outliers below the terrain
//!
//! The XY plane is cut into square cells. Within each cell, points are
//! scanned in ascending elevation; while the vertical gap to the next
//! point exceeds `threshold`, the lower point is flagged with the noise
//! class. Isolated low returns (birds' shadows, multipath under bridges)
//! separate from the terrain mass this way.

use std::collections::HashMap;

use cloudbench_core::models::PointBuffers;
use cloudbench_core::{CloudbenchError, Result};

use super::outlier::ensure_classification;

pub fn apply(input: &PointBuffers, cell: f64, class: u8, threshold: f64) -> Result<PointBuffers> {
    if cell <= 0.0 {
        return Err(CloudbenchError::InvalidStageConfig {
            reason: format!("cell size must be positive, got {}", cell),
        });
    }
    if threshold <= 0.0 {
        return Err(CloudbenchError::InvalidStageConfig {
            reason: format!("threshold must be positive, got {}", threshold),
        });
    }

    let mut cells: HashMap<(i64, i64), Vec<usize>> = HashMap::new();
    for i in 0..input.len() {
        let key = (
            (input.x[i] / cell).floor() as i64,
            (input.y[i] / cell).floor() as i64,
        );
        cells.entry(key).or_default().push(i);
    }

    let mut output = input.clone();
    ensure_classification(&mut output);
    let Some(classification) = output.classification.as_mut() else {
        return Ok(output);
    };

    for indices in cells.values_mut() {
        indices.sort_by(|&a, &b| input.z[a].total_cmp(&input.z[b]));
        for pair in indices.windows(2) {
            if input.z[pair[1]] - input.z[pair[0]] > threshold {
                classification[pair[0]] = class;
            } else {
                break;
            }
        }
    }

    Ok(output)
}
