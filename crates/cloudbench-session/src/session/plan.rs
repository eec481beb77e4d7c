//! Execution-plan construction from a layer's stage list and cache.
//!
//! Rebuilds never start from the source file: the plan seeds from the
//! newest cached stage output that survived invalidation, falling back to
//! the layer's full-resolution base buffers, and only the active stages
//! past the seed point are re-run. The seed's coordinate system is derived
//! by folding any reprojection stages the seed already covers over the
//! load-time EPSG, so a plan that continues after a reprojection carries
//! the reprojected code.

use std::sync::Arc;

use cloudbench_core::models::{LayerContext, PointBuffers, StageConfig};
use cloudbench_core::ports::{ExecutionPlan, StageGroup};
use cloudbench_geo::parse_epsg_code;

/// Start point for a rebuild: the buffers to seed from, the index of the
/// stage they cover (`None` for the base), and the EPSG they are in.
fn seed_point(layer: &LayerContext) -> (Arc<PointBuffers>, Option<usize>, Option<u32>) {
    match layer.latest_cached() {
        Some((index, seed)) => {
            let epsg = epsg_after(layer, index);
            (seed, Some(index), epsg)
        }
        None => (
            Arc::clone(&layer.base_data),
            None,
            layer.metadata.epsg,
        ),
    }
}

/// EPSG of the buffers after the active stages up to and including `index`
fn epsg_after(layer: &LayerContext, index: usize) -> Option<u32> {
    let mut epsg = layer.metadata.epsg;
    for (i, stage) in layer.active_stages() {
        if i > index {
            break;
        }
        for config in &stage.configs {
            if let StageConfig::Reprojection { out_srs, .. } = config {
                epsg = parse_epsg_code(out_srs);
            }
        }
    }
    epsg
}

/// EPSG of the buffers after the full active pipeline
pub(super) fn current_epsg(layer: &LayerContext) -> Option<u32> {
    match layer.stages.len() {
        0 => layer.metadata.epsg,
        n => epsg_after(layer, n - 1),
    }
}

/// Plan that brings the layer's current pipeline result up to date, then
/// appends `extra` groups. The second value is true when the cache already
/// covered every active stage, so only `extra` remains to run.
pub(super) fn extend_plan(
    layer: &LayerContext,
    extra: Vec<StageGroup>,
) -> (ExecutionPlan, bool) {
    let (seed, covered, epsg) = seed_point(layer);
    let remaining: Vec<StageConfig> = layer
        .active_stages()
        .filter(|(index, _)| covered.map_or(true, |c| *index > c))
        .flat_map(|(_, stage)| stage.configs.iter().cloned())
        .collect();
    let up_to_date = remaining.is_empty();

    let mut groups = Vec::new();
    if !up_to_date {
        groups.push(StageGroup::untagged(remaining));
    }
    groups.extend(extra);
    (ExecutionPlan::seeded(seed, groups, epsg), up_to_date)
}

/// Plan that recomputes the layer's current pipeline result
pub(super) fn replay_plan(layer: &LayerContext) -> ExecutionPlan {
    let (plan, _) = extend_plan(layer, Vec::new());
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use cloudbench_core::models::{
        Bounds, ParamValue, PipelineStage, SourceDescriptor, SummaryMetadata,
    };
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    fn summary(epsg: Option<u32>) -> SummaryMetadata {
        SummaryMetadata {
            points: 10,
            compressed: false,
            crs_name: epsg.map_or("Unknown".to_string(), |e| format!("EPSG:{}", e)),
            epsg,
            unit: "metre".to_string(),
            software_id: "test".to_string(),
            x_range: "[0.00 to 9.00]".to_string(),
            y_range: "[0.00 to 9.00]".to_string(),
            z_range: "[0.00 to 9.00]".to_string(),
        }
    }

    fn layer(epsg: Option<u32>) -> LayerContext {
        let coords: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let data = Arc::new(PointBuffers::from_xyz(
            coords.clone(),
            coords.clone(),
            coords,
        ));
        LayerContext::new(
            SourceDescriptor::File {
                path: PathBuf::from("/data/survey.las"),
            },
            Arc::clone(&data),
            data,
            Bounds::empty(),
            summary(epsg),
            None,
            2,
        )
    }

    fn decimation(step: u64) -> PipelineStage {
        let mut params = BTreeMap::new();
        params.insert("step".to_string(), ParamValue::Int(step as i64));
        PipelineStage::new("Decimation", params, vec![StageConfig::Decimation { step }])
    }

    fn reprojection(out: &str) -> PipelineStage {
        let mut params = BTreeMap::new();
        params.insert("out_srs".to_string(), ParamValue::from(out));
        PipelineStage::new(
            "Reprojection",
            params,
            vec![StageConfig::Reprojection {
                in_srs: None,
                out_srs: out.to_string(),
            }],
        )
    }

    #[test]
    fn test_fresh_layer_is_up_to_date() {
        let layer = layer(Some(32635));
        let (plan, up_to_date) = extend_plan(&layer, Vec::new());
        assert!(up_to_date);
        assert!(plan.groups.is_empty());
        assert!(Arc::ptr_eq(plan.seed.as_ref().unwrap(), &layer.base_data));
        assert_eq!(plan.source_epsg, Some(32635));
    }

    #[test]
    fn test_uncached_stages_replay_from_base() {
        let mut layer = layer(None);
        layer.add_stage(decimation(2));
        layer.add_stage(decimation(3));

        let plan = replay_plan(&layer);
        assert_eq!(plan.groups.len(), 1);
        assert!(plan.groups[0].tag.is_none());
        assert_eq!(plan.groups[0].configs.len(), 2);
        assert!(Arc::ptr_eq(plan.seed.as_ref().unwrap(), &layer.base_data));
    }

    #[test]
    fn test_cached_prefix_trims_the_replay() {
        let mut layer = layer(None);
        layer.add_stage(decimation(2));
        layer.add_stage(decimation(3));
        let cached = Arc::new(PointBuffers::from_xyz(vec![0.0], vec![0.0], vec![0.0]));
        layer.cache.insert(0, Arc::clone(&cached));

        let plan = replay_plan(&layer);
        assert!(Arc::ptr_eq(plan.seed.as_ref().unwrap(), &cached));
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(
            plan.groups[0].configs,
            vec![StageConfig::Decimation { step: 3 }]
        );
    }

    #[test]
    fn test_fully_cached_extension_runs_extra_only() {
        let mut layer = layer(None);
        layer.add_stage(decimation(2));
        let cached = Arc::new(PointBuffers::from_xyz(vec![0.0], vec![0.0], vec![0.0]));
        layer.cache.insert(0, Arc::clone(&cached));

        let extra = vec![StageGroup::tagged(
            vec![StageConfig::Decimation { step: 5 }],
            "Decimation (step:5)",
        )];
        let (plan, up_to_date) = extend_plan(&layer, extra);
        assert!(up_to_date);
        assert!(Arc::ptr_eq(plan.seed.as_ref().unwrap(), &cached));
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].tag.as_deref(), Some("Decimation (step:5)"));
    }

    #[test]
    fn test_inactive_stages_never_enter_the_plan() {
        let mut layer = layer(None);
        layer.add_stage(decimation(2));
        layer.add_stage(decimation(3));
        layer.set_stage_active(0, false);

        let plan = replay_plan(&layer);
        assert_eq!(plan.groups.len(), 1);
        assert_eq!(
            plan.groups[0].configs,
            vec![StageConfig::Decimation { step: 3 }]
        );
    }

    #[test]
    fn test_reprojection_updates_seed_epsg() {
        let mut layer = layer(Some(32635));
        layer.add_stage(reprojection("EPSG:4326"));
        layer.add_stage(decimation(2));
        let cached = Arc::new(PointBuffers::from_xyz(vec![0.0], vec![0.0], vec![0.0]));
        layer.cache.insert(0, Arc::clone(&cached));

        // seed covers the reprojection, so the plan continues in 4326
        let plan = replay_plan(&layer);
        assert_eq!(plan.source_epsg, Some(4326));
        assert_eq!(current_epsg(&layer), Some(4326));
    }

    #[test]
    fn test_inactive_reprojection_keeps_base_epsg() {
        let mut layer = layer(Some(32635));
        layer.add_stage(reprojection("EPSG:4326"));
        layer.set_stage_active(0, false);
        assert_eq!(current_epsg(&layer), Some(32635));
    }
}
