//! Per-dimension dataset statistics
//!
//! Mirrors what the stage interpreter exposes: one min/max/mean/stddev row
//! per present channel plus a classification histogram, computed in a single
//! pass per channel over the columnar buffers.

use serde::Serialize;

use cloudbench_core::models::PointBuffers;
use cloudbench_core::{CloudbenchError, Result};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DimensionStats {
    pub name: String,
    pub minimum: f64,
    pub maximum: f64,
    pub average: f64,
    pub stddev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsReport {
    pub point_count: u64,
    pub dimensions: Vec<DimensionStats>,
    /// Classification histogram as (class code, occurrences), ascending by code
    pub classification_counts: Vec<(u8, u64)>,
}

impl StatsReport {
    /// Histogram rows rendered as `class/count` strings
    pub fn formatted_class_counts(&self) -> Vec<String> {
        self.classification_counts
            .iter()
            .map(|(class, count)| format!("{}/{}", class, count))
            .collect()
    }
}

/// Summarize every present channel of `points`.
pub fn compute_statistics(points: &PointBuffers) -> Result<StatsReport> {
    if points.is_empty() {
        return Err(CloudbenchError::EmptyResult);
    }
    let n = points.len();

    let mut dimensions = Vec::new();
    for name in points.dimension_names() {
        let mut minimum = f64::INFINITY;
        let mut maximum = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut sum_sq = 0.0;
        for i in 0..n {
            // present by construction: the name came from dimension_names()
            let Some(value) = points.value(&name, i) else {
                continue;
            };
            minimum = minimum.min(value);
            maximum = maximum.max(value);
            sum += value;
            sum_sq += value * value;
        }
        let average = sum / n as f64;
        let variance = (sum_sq / n as f64 - average * average).max(0.0);
        dimensions.push(DimensionStats {
            name,
            minimum,
            maximum,
            average,
            stddev: variance.sqrt(),
        });
    }

    let mut classification_counts = Vec::new();
    if let Some(classes) = points.classification.as_ref() {
        let mut histogram = [0u64; 256];
        for &class in classes {
            histogram[class as usize] += 1;
        }
        classification_counts = histogram
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(class, &count)| (class as u8, count))
            .collect();
    }

    Ok(StatsReport {
        point_count: n as u64,
        dimensions,
        classification_counts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classified_sample() -> PointBuffers {
        let mut buffers = PointBuffers::from_xyz(
            vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0],
            vec![0.0; 8],
            vec![1.0; 8],
        );
        buffers.classification = Some(vec![2, 2, 2, 7, 7, 7, 7, 12]);
        buffers
    }

    #[test]
    fn test_x_moments() {
        let report = compute_statistics(&classified_sample()).unwrap();
        assert_eq!(report.point_count, 8);

        let x = &report.dimensions[0];
        assert_eq!(x.name, "X");
        assert_eq!(x.minimum, 2.0);
        assert_eq!(x.maximum, 9.0);
        assert!((x.average - 5.0).abs() < 1e-12);
        assert!((x.stddev - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_constant_channel_has_zero_spread() {
        let report = compute_statistics(&classified_sample()).unwrap();
        let z = report.dimensions.iter().find(|d| d.name == "Z").unwrap();
        assert_eq!(z.minimum, 1.0);
        assert_eq!(z.maximum, 1.0);
        assert_eq!(z.stddev, 0.0);
    }

    #[test]
    fn test_classification_histogram() {
        let report = compute_statistics(&classified_sample()).unwrap();
        assert_eq!(report.classification_counts, vec![(2, 3), (7, 4), (12, 1)]);
        assert_eq!(
            report.formatted_class_counts(),
            vec!["2/3".to_string(), "7/4".to_string(), "12/1".to_string()]
        );
    }

    #[test]
    fn test_extra_channels_are_covered() {
        let mut buffers = PointBuffers::from_xyz(vec![0.0, 1.0], vec![0.0, 0.0], vec![0.0, 0.0]);
        buffers
            .extra
            .insert("ClusterID".to_string(), vec![1.0, 3.0]);

        let report = compute_statistics(&buffers).unwrap();
        let cluster = report
            .dimensions
            .iter()
            .find(|d| d.name == "ClusterID")
            .unwrap();
        assert_eq!(cluster.minimum, 1.0);
        assert_eq!(cluster.maximum, 3.0);
        assert_eq!(cluster.average, 2.0);
        assert!(report.classification_counts.is_empty());
    }

    #[test]
    fn test_empty_input_is_an_error() {
        assert!(matches!(
            compute_statistics(&PointBuffers::new()),
            Err(CloudbenchError::EmptyResult)
        ));
    }
}
