//! Statistical outlier classification
//!
//! For every point, the mean distance to its `mean_k` nearest neighbors is
//! computed over an R*-tree. Points whose mean distance exceeds
//! `global_mean + multiplier * global_stddev` are flagged as noise
//! (class 7); nothing is removed. Pairing this stage with a
//! `Classification![7:7]` range filter yields outlier removal.

use cloudbench_core::models::PointBuffers;
use cloudbench_core::{CloudbenchError, Result};
use rstar::primitives::GeomWithData;
use rstar::RTree;

/// ASPRS low-noise class the statistical method assigns.
pub const NOISE_CLASS: u8 = 7;

type IndexedPoint = GeomWithData<[f64; 3], usize>;

pub fn apply(
    input: &PointBuffers,
    method: &str,
    mean_k: usize,
    multiplier: f64,
) -> Result<PointBuffers> {
    if method != "statistical" {
        return Err(CloudbenchError::InvalidStageConfig {
            reason: format!("unsupported outlier method '{}'", method),
        });
    }

    let n = input.len();
    let mut output = input.clone();
    ensure_classification(&mut output);

    let k = mean_k.min(n.saturating_sub(1));
    if k == 0 {
        // nothing to compare against
        return Ok(output);
    }

    let tree = RTree::bulk_load(
        (0..n)
            .map(|i| IndexedPoint::new([input.x[i], input.y[i], input.z[i]], i))
            .collect(),
    );

    let mut mean_distances = Vec::with_capacity(n);
    for i in 0..n {
        let query = [input.x[i], input.y[i], input.z[i]];
        // the first hit is the point itself at distance zero
        let sum: f64 = tree
            .nearest_neighbor_iter(&query)
            .skip(1)
            .take(k)
            .map(|neighbor| distance(&query, neighbor.geom()))
            .sum();
        mean_distances.push(sum / k as f64);
    }

    let mean = mean_distances.iter().sum::<f64>() / n as f64;
    let variance =
        mean_distances.iter().map(|d| (d - mean) * (d - mean)).sum::<f64>() / n as f64;
    let threshold = mean + multiplier * variance.sqrt();

    if let Some(classification) = output.classification.as_mut() {
        for (i, distance) in mean_distances.iter().enumerate() {
            if *distance > threshold {
                classification[i] = NOISE_CLASS;
            }
        }
    }

    Ok(output)
}

fn distance(a: &[f64; 3], b: &[f64; 3]) -> f64 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Add an all-zero classification channel when the input had none.
pub(crate) fn ensure_classification(buffers: &mut PointBuffers) {
    if buffers.classification.is_none() {
        buffers.classification = Some(vec![0; buffers.len()]);
    }
}
