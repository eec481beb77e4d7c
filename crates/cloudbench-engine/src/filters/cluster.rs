//! Euclidean cluster labeling
//!
//! Connects points closer than `tolerance` into clusters by flood fill
//! over a spatial hash whose cell edge equals the tolerance, so neighbor
//! candidates always sit in the 27 surrounding cells. Clusters that reach
//! `min_points` get ids 1..K in discovery order; everything else gets id
//! 0. Labels land in the `ClusterID` extra channel.

use std::collections::HashMap;

use cloudbench_core::models::PointBuffers;
use cloudbench_core::{CloudbenchError, Result};

pub const CLUSTER_DIMENSION: &str = "ClusterID";

pub fn apply(input: &PointBuffers, min_points: usize, tolerance: f64) -> Result<PointBuffers> {
    if tolerance <= 0.0 {
        return Err(CloudbenchError::InvalidStageConfig {
            reason: format!("tolerance must be positive, got {}", tolerance),
        });
    }

    let n = input.len();
    let mut grid: HashMap<(i64, i64, i64), Vec<usize>> = HashMap::new();
    for i in 0..n {
        grid.entry(cell_of(input, i, tolerance)).or_default().push(i);
    }

    let tolerance_sq = tolerance * tolerance;
    let mut labels = vec![0u64; n];
    let mut visited = vec![false; n];
    let mut next_id = 1u64;

    for start in 0..n {
        if visited[start] {
            continue;
        }
        visited[start] = true;

        let mut members = vec![start];
        let mut queue = vec![start];
        while let Some(current) = queue.pop() {
            let (cx, cy, cz) = cell_of(input, current, tolerance);
            for dx in -1..=1 {
                for dy in -1..=1 {
                    for dz in -1..=1 {
                        let Some(candidates) = grid.get(&(cx + dx, cy + dy, cz + dz)) else {
                            continue;
                        };
                        for &candidate in candidates {
                            if visited[candidate]
                                || distance_sq(input, current, candidate) > tolerance_sq
                            {
                                continue;
                            }
                            visited[candidate] = true;
                            members.push(candidate);
                            queue.push(candidate);
                        }
                    }
                }
            }
        }

        if members.len() >= min_points {
            for member in members {
                labels[member] = next_id;
            }
            next_id += 1;
        }
    }

    let mut output = input.clone();
    output
        .extra
        .insert(CLUSTER_DIMENSION.to_string(), labels.iter().map(|&l| l as f64).collect());
    Ok(output)
}

fn cell_of(input: &PointBuffers, i: usize, tolerance: f64) -> (i64, i64, i64) {
    (
        (input.x[i] / tolerance).floor() as i64,
        (input.y[i] / tolerance).floor() as i64,
        (input.z[i] / tolerance).floor() as i64,
    )
}

fn distance_sq(input: &PointBuffers, a: usize, b: usize) -> f64 {
    let dx = input.x[a] - input.x[b];
    let dy = input.y[a] - input.y[b];
    let dz = input.z[a] - input.z[b];
    dx * dx + dy * dy + dz * dz
}
