use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::StageCache;
use crate::models::metadata::{FileMetadata, SummaryMetadata};
use crate::models::points::{Bounds, PointBuffers};
use crate::models::preset::ConnectionProfile;
use crate::models::stage::{PipelineStage, StageConfig};

/// Where a layer's base data came from.
///
/// The descriptor is what gives a persisted pipeline its leading reader
/// stages; execution itself always seeds from the in-memory base buffers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SourceDescriptor {
    File {
        path: PathBuf,
    },
    Database {
        profile: ConnectionProfile,
        schema: String,
        table: String,
        predicate: String,
    },
    /// Several files loaded as one layer
    Merged {
        paths: Vec<PathBuf>,
    },
}

impl SourceDescriptor {
    /// The reader stages that lead every serialized pipeline for this
    /// source. Database connections are written redacted; credentials never
    /// leave the session.
    pub fn reader_configs(&self) -> Vec<StageConfig> {
        match self {
            SourceDescriptor::File { path } => vec![StageConfig::LasReader {
                filename: path.display().to_string(),
            }],
            SourceDescriptor::Database {
                profile,
                schema,
                table,
                predicate,
            } => vec![StageConfig::PgPointcloudReader {
                connection: profile.redacted(),
                schema: schema.clone(),
                table: table.clone(),
                column: "patch".to_string(),
                r#where: predicate.clone(),
            }],
            SourceDescriptor::Merged { paths } => {
                let mut configs: Vec<StageConfig> = paths
                    .iter()
                    .map(|path| StageConfig::LasReader {
                        filename: path.display().to_string(),
                    })
                    .collect();
                configs.push(StageConfig::Merge);
                configs
            }
        }
    }

    /// Short name used as the default layer key
    pub fn display_name(&self) -> String {
        fn stem(path: &std::path::Path) -> String {
            path.file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("layer")
                .to_string()
        }
        match self {
            SourceDescriptor::File { path } => stem(path),
            SourceDescriptor::Database { schema, table, .. } => format!("{}.{}", schema, table),
            SourceDescriptor::Merged { paths } => match paths.first() {
                Some(first) => format!("{}_merged", stem(first)),
                None => "merged".to_string(),
            },
        }
    }

    pub fn is_database(&self) -> bool {
        matches!(self, SourceDescriptor::Database { .. })
    }
}

/// Coloring channel a visualization consumer should use for a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RenderStyle {
    #[default]
    Elevation,
    Intensity,
    Rgb,
    Classification,
}

/// A loaded dataset plus its edit history.
///
/// `base_data` is the full-resolution result of the original load and is
/// what pipeline rebuilds seed from when no cached stage output applies.
/// `render_data` is the downsampled view handed to the host; it never
/// feeds back into processing.
#[derive(Debug, Clone)]
pub struct LayerContext {
    pub source: SourceDescriptor,
    pub stages: Vec<PipelineStage>,
    pub cache: StageCache,
    pub base_data: Arc<PointBuffers>,
    pub render_data: Arc<PointBuffers>,
    pub bounds: Bounds,
    pub metadata: SummaryMetadata,
    pub full_metadata: Option<FileMetadata>,
    pub active_style: RenderStyle,
}

impl LayerContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source: SourceDescriptor,
        base_data: Arc<PointBuffers>,
        render_data: Arc<PointBuffers>,
        bounds: Bounds,
        metadata: SummaryMetadata,
        full_metadata: Option<FileMetadata>,
        cache_capacity: usize,
    ) -> Self {
        Self {
            source,
            stages: Vec::new(),
            cache: StageCache::new(cache_capacity),
            base_data,
            render_data,
            bounds,
            metadata,
            full_metadata,
            active_style: RenderStyle::default(),
        }
    }

    pub fn is_database(&self) -> bool {
        self.source.is_database()
    }

    /// Append a stage; returns its index
    pub fn add_stage(&mut self, stage: PipelineStage) -> usize {
        self.stages.push(stage);
        self.stages.len() - 1
    }

    /// Remove the stage at `index`, dropping cache entries that depended on
    /// it and re-pointing the survivors. `None` when out of bounds.
    pub fn remove_stage(&mut self, index: usize) -> Option<PipelineStage> {
        if index >= self.stages.len() {
            return None;
        }
        let removed = self.stages.remove(index);
        self.cache.invalidate_from(index);
        self.cache.reindex_after_removal(index);
        Some(removed)
    }

    /// Toggle a stage on or off, invalidating everything it fed. Returns
    /// false when `index` is out of bounds or the flag already matches.
    pub fn set_stage_active(&mut self, index: usize, active: bool) -> bool {
        match self.stages.get_mut(index) {
            Some(stage) if stage.is_active != active => {
                stage.is_active = active;
                self.cache.invalidate_from(index);
                true
            }
            _ => false,
        }
    }

    /// Indices and stages that currently take part in execution
    pub fn active_stages(&self) -> impl Iterator<Item = (usize, &PipelineStage)> {
        self.stages
            .iter()
            .enumerate()
            .filter(|(_, stage)| stage.is_active)
    }

    pub fn last_active_index(&self) -> Option<usize> {
        self.stages.iter().rposition(|stage| stage.is_active)
    }

    /// Cached output of the highest stage that still has one
    pub fn latest_cached(&self) -> Option<(usize, Arc<PointBuffers>)> {
        self.cache.latest()
    }

    /// The executable pipeline: reader stages first, then every active
    /// stage's configs in insertion order.
    pub fn full_pipeline(&self) -> Vec<StageConfig> {
        let mut pipeline = self.source.reader_configs();
        for (_, stage) in self.active_stages() {
            pipeline.extend(stage.configs.iter().cloned());
        }
        pipeline
    }

    /// The `{"pipeline": [...]}` document the pipeline writer persists
    pub fn pipeline_json(&self) -> serde_json::Value {
        serde_json::json!({ "pipeline": self.full_pipeline() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stage::ParamValue;
    use std::collections::BTreeMap;

    fn summary() -> SummaryMetadata {
        SummaryMetadata {
            points: 4,
            compressed: false,
            crs_name: "EPSG:32635".to_string(),
            epsg: Some(32635),
            unit: "metre".to_string(),
            software_id: "test".to_string(),
            x_range: "[0.00 to 3.00]".to_string(),
            y_range: "[0.00 to 3.00]".to_string(),
            z_range: "[0.00 to 3.00]".to_string(),
        }
    }

    fn file_layer() -> LayerContext {
        let data = Arc::new(PointBuffers::from_xyz(
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, 1.0, 2.0, 3.0],
            vec![0.0, 1.0, 2.0, 3.0],
        ));
        LayerContext::new(
            SourceDescriptor::File {
                path: PathBuf::from("/data/survey.las"),
            },
            Arc::clone(&data),
            data,
            Bounds::empty(),
            summary(),
            None,
            2,
        )
    }

    fn decimation_stage(step: i64) -> PipelineStage {
        let mut params = BTreeMap::new();
        params.insert("step".to_string(), ParamValue::Int(step));
        PipelineStage::new(
            "Decimation",
            params,
            vec![StageConfig::Decimation { step: step as u64 }],
        )
    }

    #[test]
    fn test_full_pipeline_prepends_reader() {
        let mut layer = file_layer();
        layer.add_stage(decimation_stage(10));

        let pipeline = layer.full_pipeline();
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline[0].kind(), "readers.las");
        assert_eq!(pipeline[1], StageConfig::Decimation { step: 10 });
    }

    #[test]
    fn test_inactive_stage_left_out_of_pipeline() {
        let mut layer = file_layer();
        layer.add_stage(decimation_stage(10));
        layer.add_stage(decimation_stage(2));
        assert!(layer.set_stage_active(0, false));

        let pipeline = layer.full_pipeline();
        assert_eq!(pipeline.len(), 2);
        assert_eq!(pipeline[1], StageConfig::Decimation { step: 2 });
        assert_eq!(layer.last_active_index(), Some(1));
    }

    #[test]
    fn test_merged_source_pipeline() {
        let source = SourceDescriptor::Merged {
            paths: vec![PathBuf::from("a.las"), PathBuf::from("b.las")],
        };
        let configs = source.reader_configs();
        assert_eq!(configs.len(), 3);
        assert_eq!(configs[0].kind(), "readers.las");
        assert_eq!(configs[1].kind(), "readers.las");
        assert_eq!(configs[2], StageConfig::Merge);
        assert_eq!(source.display_name(), "a_merged");
    }

    #[test]
    fn test_database_reader_is_redacted() {
        let source = SourceDescriptor::Database {
            profile: ConnectionProfile {
                name: "db".to_string(),
                host: "localhost".to_string(),
                port: 5432,
                dbname: "points".to_string(),
                user: "scanner".to_string(),
                password: "secret".to_string(),
            },
            schema: "public".to_string(),
            table: "lidar".to_string(),
            predicate: String::new(),
        };
        let configs = source.reader_configs();
        match &configs[0] {
            StageConfig::PgPointcloudReader { connection, .. } => {
                assert!(!connection.contains("secret"));
            }
            other => panic!("unexpected config: {:?}", other),
        }
        assert_eq!(source.display_name(), "public.lidar");
    }

    #[test]
    fn test_remove_stage_invalidates_dependents() {
        let mut layer = file_layer();
        layer.add_stage(decimation_stage(10));
        layer.add_stage(decimation_stage(2));
        layer.cache.insert(0, Arc::clone(&layer.base_data));
        layer.cache.insert(1, Arc::clone(&layer.base_data));

        let removed = layer.remove_stage(1).unwrap();
        assert_eq!(removed.name, "Decimation");
        assert_eq!(layer.stages.len(), 1);
        // prefix entry survives, dependent entry is gone
        assert!(layer.cache.get(0).is_some());
        assert!(layer.cache.get(1).is_none());

        assert!(layer.remove_stage(5).is_none());
    }

    #[test]
    fn test_toggle_invalidates_from_index() {
        let mut layer = file_layer();
        layer.add_stage(decimation_stage(10));
        layer.add_stage(decimation_stage(2));
        layer.cache.insert(0, Arc::clone(&layer.base_data));
        layer.cache.insert(1, Arc::clone(&layer.base_data));

        assert!(layer.set_stage_active(1, false));
        assert!(layer.cache.get(0).is_some());
        assert!(layer.cache.get(1).is_none());

        // toggling to the current state is a no-op
        assert!(!layer.set_stage_active(1, false));
    }

    #[test]
    fn test_pipeline_json_shape() {
        let mut layer = file_layer();
        layer.add_stage(decimation_stage(10));

        let json = layer.pipeline_json();
        let stages = json["pipeline"].as_array().unwrap();
        assert_eq!(stages.len(), 2);
        assert_eq!(stages[0]["type"], "readers.las");
        assert_eq!(stages[1]["type"], "filters.decimation");
        assert_eq!(stages[1]["step"], 10);
    }
}
