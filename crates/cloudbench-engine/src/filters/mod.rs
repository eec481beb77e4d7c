//! Native filter-stage implementations
//!
//! Each submodule interprets one stage kind over columnar point buffers.
//! [`apply`] dispatches a single [`StageConfig`] and is the only entry
//! point the executor uses.

use cloudbench_core::models::{PointBuffers, StageConfig};
use cloudbench_core::{CloudbenchError, Result};
use cloudbench_geo::{parse_epsg_code, transform_coords};

pub mod cluster;
pub mod crop;
pub mod elm;
pub mod ground;
pub mod outlier;
pub mod range;

use ground::GroundParams;

/// Run one stage over `input`.
///
/// `crs_epsg` tracks the CRS of the running buffers: reprojection consumes
/// it as the implicit source when the stage names no `in_srs`, and updates
/// it afterwards. Reader and writer configs are not executable here and
/// yield [`CloudbenchError::UnsupportedStage`].
pub fn apply(
    config: &StageConfig,
    input: &PointBuffers,
    crs_epsg: &mut Option<u32>,
) -> Result<PointBuffers> {
    match config {
        StageConfig::Decimation { step } => {
            Ok(input.take_stride((*step).max(1) as usize))
        }
        StageConfig::Range { limits } => range::apply(limits, input),
        StageConfig::Crop { bounds } => crop::apply(bounds, input),
        StageConfig::Outlier {
            method,
            mean_k,
            multiplier,
        } => outlier::apply(input, method, *mean_k, *multiplier),
        StageConfig::Elm {
            cell,
            class,
            threshold,
        } => elm::apply(input, *cell, *class, *threshold),
        StageConfig::Smrf {
            cell,
            slope,
            window,
            threshold,
            ignore,
        } => {
            let params = GroundParams {
                cell: *cell,
                slope: *slope,
                window: *window,
                threshold: *threshold,
            };
            ground::apply(input, &params, ignore.as_deref())
        }
        StageConfig::Cluster {
            min_points,
            tolerance,
        } => cluster::apply(input, *min_points, *tolerance),
        StageConfig::Reprojection { in_srs, out_srs } => {
            reproject(input, in_srs.as_deref(), out_srs, crs_epsg)
        }
        // merging happens when the plan's sources are concatenated; the
        // stage itself passes buffers through
        StageConfig::Merge => Ok(input.clone()),
        other => Err(CloudbenchError::UnsupportedStage {
            kind: other.kind().to_string(),
        }),
    }
}

fn reproject(
    input: &PointBuffers,
    in_srs: Option<&str>,
    out_srs: &str,
    crs_epsg: &mut Option<u32>,
) -> Result<PointBuffers> {
    let to = parse_epsg_code(out_srs).ok_or_else(|| CloudbenchError::InvalidStageConfig {
        reason: format!("out_srs '{}' is not an EPSG:nnnn identifier", out_srs),
    })?;
    let from = match in_srs {
        Some(srs) => parse_epsg_code(srs).ok_or_else(|| CloudbenchError::InvalidStageConfig {
            reason: format!("in_srs '{}' is not an EPSG:nnnn identifier", srs),
        })?,
        None => crs_epsg.ok_or_else(|| CloudbenchError::CrsTransform {
            reason: "source CRS is unknown; provide in_srs".to_string(),
        })?,
    };

    let mut output = input.clone();
    transform_coords(&mut output.x, &mut output.y, from, to)?;
    *crs_epsg = Some(to);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimation_stride() {
        let input = PointBuffers::from_xyz(
            (0..10).map(|i| i as f64).collect(),
            vec![0.0; 10],
            vec![0.0; 10],
        );
        let mut crs = None;
        let out = apply(&StageConfig::Decimation { step: 3 }, &input, &mut crs).unwrap();
        assert_eq!(out.x, vec![0.0, 3.0, 6.0, 9.0]);
    }

    #[test]
    fn test_writer_config_is_not_executable() {
        let input = PointBuffers::from_xyz(vec![0.0], vec![0.0], vec![0.0]);
        let mut crs = None;
        let config = StageConfig::LasWriter {
            filename: "out.las".to_string(),
        };
        let err = apply(&config, &input, &mut crs).unwrap_err();
        assert!(matches!(err, CloudbenchError::UnsupportedStage { .. }));
    }

    #[test]
    fn test_reprojection_updates_tracked_crs() {
        let input = PointBuffers::from_xyz(vec![25.0], vec![60.2], vec![0.0]);
        let mut crs = Some(4326);
        let config = StageConfig::Reprojection {
            in_srs: None,
            out_srs: "EPSG:32635".to_string(),
        };
        let out = apply(&config, &input, &mut crs).unwrap();
        assert_eq!(crs, Some(32635));
        assert!(out.x[0] > 100_000.0);
    }

    #[test]
    fn test_reprojection_without_source_crs_fails() {
        let input = PointBuffers::from_xyz(vec![25.0], vec![60.2], vec![0.0]);
        let mut crs = None;
        let config = StageConfig::Reprojection {
            in_srs: None,
            out_srs: "EPSG:32635".to_string(),
        };
        let err = apply(&config, &input, &mut crs).unwrap_err();
        assert!(matches!(err, CloudbenchError::CrsTransform { .. }));
    }

    #[test]
    fn test_merge_passes_through() {
        let input = PointBuffers::from_xyz(vec![1.0, 2.0], vec![0.0, 0.0], vec![0.0, 0.0]);
        let mut crs = None;
        let out = apply(&StageConfig::Merge, &input, &mut crs).unwrap();
        assert_eq!(out, input);
    }
}
