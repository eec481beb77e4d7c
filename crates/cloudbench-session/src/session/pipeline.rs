//! Pipeline editing and derived products: filters, batches, stage
//! removal and toggling, statistics, and elevation models.
//!
//! Every operation that changes a layer's stage list runs in the filter
//! worker slot, so stage mutations are serialized end to end; statistics
//! and model generation replay the pipeline read-only in their own slots
//! and never touch the layer.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use cloudbench_core::models::{ParamValue, PipelineStage, PointBuffers, StageSpec};
use cloudbench_core::ports::{CancelFlag, ExecutionOutput, StageGroup, StageReport};
use cloudbench_core::render;
use cloudbench_core::{CloudbenchError, Result};
use cloudbench_engine::{compute_statistics, ElevationGridWriter, GridOutput};

use crate::events::{group_digits, LogLevel, OpKind, ProgressUpdate, SessionEvent};

use super::{plan, Session, SessionInner};

/// Parameters for elevation-model generation
#[derive(Debug, Clone)]
pub struct ModelParams {
    pub filename: PathBuf,
    pub resolution: f64,
    pub output_type: GridOutput,
    /// Search radius override; the writer defaults to
    /// `resolution * sqrt(2)`
    pub radius: Option<f64>,
    /// IDW exponent override
    pub power: Option<f64>,
}

impl Session {
    /// Build a stage from the tool registry and run it on top of the
    /// layer's current pipeline result. Parameter validation happens
    /// before anything is dispatched.
    pub async fn apply_filter(
        &self,
        key: &str,
        tool_name: &str,
        params: &BTreeMap<String, ParamValue>,
    ) -> Result<()> {
        if !self.inner.has_layer(key) {
            self.inner
                .log(LogLevel::Warning, format!("Layer not found: {}", key));
            return Ok(());
        }
        let stage = match self.inner.registry.build_stage(tool_name, params) {
            Ok(stage) => stage,
            Err(e) => {
                self.inner.log(
                    LogLevel::Error,
                    format!("Could not create stage for '{}': {}", tool_name, e),
                );
                return Err(e);
            }
        };
        let key = key.to_string();
        self.dispatch(OpKind::Filter, move |inner, cancel| async move {
            inner.run_stage_append(key, vec![stage], false, cancel).await;
        })
        .await;
        Ok(())
    }

    /// Run a queue of tools as one execution, appending every stage on
    /// success. The whole queue is validated up front; single-shot tools
    /// are rejected before anything runs.
    pub async fn apply_batch(&self, key: &str, queue: &[StageSpec]) -> Result<()> {
        if !self.inner.has_layer(key) {
            self.inner
                .log(LogLevel::Warning, format!("Layer not found: {}", key));
            return Ok(());
        }
        if queue.is_empty() {
            self.inner
                .log(LogLevel::Warning, "Batch queue is empty.".to_string());
            return Ok(());
        }

        let mut stages = Vec::with_capacity(queue.len());
        for spec in queue {
            let built = self.inner.registry.get(&spec.tool_name).and_then(|tool| {
                if !tool.batchable {
                    return Err(CloudbenchError::InvalidStageConfig {
                        reason: format!(
                            "'{}' is a single-shot tool and cannot run in a batch",
                            spec.tool_name
                        ),
                    });
                }
                self.inner.registry.build_stage(&spec.tool_name, &spec.params)
            });
            match built {
                Ok(stage) => stages.push(stage),
                Err(e) => {
                    self.inner.log(
                        LogLevel::Error,
                        format!("Could not create stage for '{}': {}", spec.tool_name, e),
                    );
                    return Err(e);
                }
            }
        }

        let key = key.to_string();
        self.dispatch(OpKind::Filter, move |inner, cancel| async move {
            inner.run_stage_append(key, stages, true, cancel).await;
        })
        .await;
        Ok(())
    }

    /// Remove a stage and rebuild the pipeline result from the surviving
    /// cached prefix
    pub async fn remove_stage(&self, key: &str, index: usize) -> Result<()> {
        match self.stage_count(key) {
            None => {
                self.inner
                    .log(LogLevel::Warning, format!("Layer not found: {}", key));
                return Ok(());
            }
            Some(n) if index >= n => {
                self.inner
                    .log(LogLevel::Warning, "Stage index out of bounds.".to_string());
                return Ok(());
            }
            Some(_) => {}
        }
        let key = key.to_string();
        self.dispatch(OpKind::Filter, move |inner, cancel| async move {
            let removed = {
                let mut layers = inner.layers.write().unwrap();
                layers
                    .get_mut(&key)
                    .and_then(|layer| layer.remove_stage(index))
            };
            let Some(removed) = removed else {
                inner
                    .log(LogLevel::Warning, "Stage index out of bounds.".to_string());
                return;
            };
            inner.log(
                LogLevel::Info,
                format!("Stage '{}' removed. Recalculating pipeline...", removed.name),
            );
            inner.refresh_render(key, cancel).await;
        })
        .await;
        Ok(())
    }

    /// Toggle a stage in or out of the pipeline and rebuild the result
    pub async fn set_stage_active(&self, key: &str, index: usize, active: bool) -> Result<()> {
        match self.stage_count(key) {
            None => {
                self.inner
                    .log(LogLevel::Warning, format!("Layer not found: {}", key));
                return Ok(());
            }
            Some(n) if index >= n => {
                self.inner
                    .log(LogLevel::Warning, "Stage index out of bounds.".to_string());
                return Ok(());
            }
            Some(_) => {}
        }
        let key = key.to_string();
        self.dispatch(OpKind::Filter, move |inner, cancel| async move {
            let toggled = {
                let mut layers = inner.layers.write().unwrap();
                layers.get_mut(&key).map(|layer| {
                    let changed = layer.set_stage_active(index, active);
                    let name = layer
                        .stages
                        .get(index)
                        .map(|stage| stage.name.clone())
                        .unwrap_or_default();
                    (changed, name)
                })
            };
            let Some((changed, name)) = toggled else {
                return;
            };
            if !changed {
                return;
            }
            let verb = if active { "enabled" } else { "disabled" };
            inner.log(
                LogLevel::Info,
                format!("Stage '{}' {}. Recalculating pipeline...", name, verb),
            );
            inner.refresh_render(key, cancel).await;
        })
        .await;
        Ok(())
    }

    /// Re-execute the active pipeline and refresh the render view, for
    /// example after the host changed its render ceiling
    pub async fn refresh_pipeline(&self, key: &str) -> Result<()> {
        if !self.inner.has_layer(key) {
            self.inner
                .log(LogLevel::Warning, format!("Layer not found: {}", key));
            return Ok(());
        }
        let key = key.to_string();
        self.dispatch(OpKind::Filter, move |inner, cancel| async move {
            inner.refresh_render(key, cancel).await;
        })
        .await;
        Ok(())
    }

    /// Compute per-dimension statistics over the layer's current pipeline
    /// result
    pub async fn calculate_statistics(&self, key: &str) -> Result<()> {
        if !self.inner.has_layer(key) {
            self.inner
                .log(LogLevel::Warning, format!("Layer not found: {}", key));
            return Ok(());
        }
        let key = key.to_string();
        self.dispatch(OpKind::Stats, move |inner, cancel| async move {
            inner.log(
                LogLevel::Info,
                format!("Calculating statistics for '{}'...", key),
            );
            inner.emit(SessionEvent::Progress(ProgressUpdate::Indeterminate));

            let Some(layer) = inner.snapshot(&key) else {
                inner.fail(OpKind::Stats, format!("Layer not found: {}", key));
                return;
            };
            let execution = plan::replay_plan(&layer);
            let backend = Arc::clone(&inner.backend);
            let exec_cancel = cancel.clone();
            let result = tokio::task::spawn_blocking(move || {
                let output = backend.execute(&execution, &exec_cancel, &mut |_| {})?;
                compute_statistics(&output.points)
            })
            .await;

            if cancel.is_cancelled() {
                return;
            }
            match result {
                Ok(Ok(stats)) => {
                    inner.emit(SessionEvent::StatsReady {
                        key: key.clone(),
                        stats,
                    });
                    inner.log(LogLevel::Info, format!("Statistics ready for '{}'.", key));
                    inner.emit(SessionEvent::Progress(ProgressUpdate::Percent(100)));
                }
                Ok(Err(e)) => {
                    inner.fail(OpKind::Stats, format!("Statistics calculation failed: {}", e))
                }
                Err(e) => inner.fail(OpKind::Stats, format!("stats worker failed: {}", e)),
            }
        })
        .await;
        Ok(())
    }

    /// Rasterize the layer's current pipeline result into an elevation
    /// grid
    pub async fn generate_model(&self, key: &str, params: ModelParams) -> Result<()> {
        if params.filename.as_os_str().is_empty() {
            return Err(CloudbenchError::EmptyPath);
        }
        if params.resolution <= 0.0 {
            return Err(CloudbenchError::InvalidStageConfig {
                reason: format!("resolution must be positive, got {}", params.resolution),
            });
        }
        if !self.inner.has_layer(key) {
            self.inner
                .log(LogLevel::Warning, format!("Layer not found: {}", key));
            return Ok(());
        }
        let key = key.to_string();
        self.dispatch(OpKind::Model, move |inner, cancel| async move {
            inner.log(
                LogLevel::Info,
                format!(
                    "Starting model generation ({}) -> {}",
                    params.output_type.as_str(),
                    params.filename.display()
                ),
            );
            inner.emit(SessionEvent::Progress(ProgressUpdate::Indeterminate));

            let Some(layer) = inner.snapshot(&key) else {
                inner.fail(OpKind::Model, format!("Layer not found: {}", key));
                return;
            };
            let execution = plan::replay_plan(&layer);
            let backend = Arc::clone(&inner.backend);
            let exec_cancel = cancel.clone();
            let result = tokio::task::spawn_blocking(move || {
                let output = backend.execute(&execution, &exec_cancel, &mut |_| {})?;
                let mut writer =
                    ElevationGridWriter::new(params.resolution, params.output_type);
                if let Some(radius) = params.radius {
                    writer = writer.with_radius(radius);
                }
                if let Some(power) = params.power {
                    writer = writer.with_power(power);
                }
                writer.write(&params.filename, &output.points)
            })
            .await;

            if cancel.is_cancelled() {
                return;
            }
            match result {
                Ok(Ok((path, used))) => {
                    let message = format!(
                        "Elevation Model generated successfully. Processed {} points.",
                        group_digits(used)
                    );
                    inner.emit(SessionEvent::ModelFinished {
                        path,
                        message: message.clone(),
                    });
                    inner.log(LogLevel::Info, message);
                    inner.emit(SessionEvent::Progress(ProgressUpdate::Percent(100)));
                }
                Ok(Err(e)) => inner.fail(OpKind::Model, format!("Model generation failed: {}", e)),
                Err(e) => inner.fail(OpKind::Model, format!("model worker failed: {}", e)),
            }
        })
        .await;
        Ok(())
    }

    fn stage_count(&self, key: &str) -> Option<usize> {
        self.inner
            .layers
            .read()
            .unwrap()
            .get(key)
            .map(|layer| layer.stages.len())
    }
}

impl SessionInner {
    /// Shared worker body for single-filter and batch appends.
    ///
    /// Batch stages run as one tagged group per stage so each reports its
    /// point-count transition; a single filter runs as one tagged group
    /// whose tag is its display text.
    async fn run_stage_append(
        self: Arc<Self>,
        key: String,
        stages: Vec<PipelineStage>,
        batch: bool,
        cancel: CancelFlag,
    ) {
        let Some(layer) = self.snapshot(&key) else {
            self.fail(OpKind::Filter, format!("Layer not found: {}", key));
            return;
        };
        let base = Arc::clone(&layer.base_data);

        let groups: Vec<StageGroup> = if batch {
            stages
                .iter()
                .enumerate()
                .map(|(i, stage)| {
                    StageGroup::tagged(stage.configs.clone(), format!("batch_stage_{}", i))
                })
                .collect()
        } else {
            stages
                .iter()
                .map(|stage| StageGroup::tagged(stage.configs.clone(), stage.display_text()))
                .collect()
        };
        let (execution, cached) = plan::extend_plan(&layer, groups);

        if batch {
            self.log(LogLevel::Info, "=== Batch Process Started ===".to_string());
            let queue: Vec<&str> = stages.iter().map(|stage| stage.name.as_str()).collect();
            self.log(LogLevel::Info, format!("Queue: {}", queue.join(" -> ")));
        } else {
            let mode = if cached { "Cached" } else { "Full" };
            self.log(
                LogLevel::Info,
                format!("Filter Running ({}): {}...", mode, stages[0].display_text()),
            );
        }
        self.emit(SessionEvent::Progress(ProgressUpdate::Indeterminate));

        let backend = Arc::clone(&self.backend);
        let progress = Arc::clone(&self);
        let labels: Vec<String> = stages.iter().map(|stage| stage.display_text()).collect();
        let exec_cancel = cancel.clone();
        let result = tokio::task::spawn_blocking(move || {
            backend.execute(&execution, &exec_cancel, &mut |report| {
                progress.stage_progress(&labels, &report);
            })
        })
        .await;

        if cancel.is_cancelled() {
            return;
        }
        match result {
            Ok(Ok(output)) => {
                let count = output.count;
                if !self.apply_stage_append(&key, &base, stages, output) {
                    return;
                }
                self.log(
                    LogLevel::Info,
                    format!("Pipeline refreshed. Current Points: {}", group_digits(count)),
                );
                if batch {
                    self.log(LogLevel::Info, "=== Batch Process Completed ===".to_string());
                }
                self.emit(SessionEvent::Progress(ProgressUpdate::Percent(100)));
            }
            Ok(Err(e)) => self.fail(OpKind::Filter, format!("Pipeline execution failed: {}", e)),
            Err(e) => self.fail(OpKind::Filter, format!("filter worker failed: {}", e)),
        }
    }

    /// Re-execute the active pipeline and refresh the layer's render view
    async fn refresh_render(self: Arc<Self>, key: String, cancel: CancelFlag) {
        self.emit(SessionEvent::Progress(ProgressUpdate::Indeterminate));

        let Some(layer) = self.snapshot(&key) else {
            self.fail(OpKind::Filter, format!("Layer not found: {}", key));
            return;
        };
        let base = Arc::clone(&layer.base_data);
        let execution = plan::replay_plan(&layer);

        let backend = Arc::clone(&self.backend);
        let exec_cancel = cancel.clone();
        let result = tokio::task::spawn_blocking(move || {
            backend.execute(&execution, &exec_cancel, &mut |_| {})
        })
        .await;

        if cancel.is_cancelled() {
            return;
        }
        match result {
            Ok(Ok(output)) => {
                let count = output.count;
                if !self.apply_refresh(&key, &base, output) {
                    return;
                }
                self.log(
                    LogLevel::Info,
                    format!("Pipeline refreshed. Current Points: {}", group_digits(count)),
                );
                self.emit(SessionEvent::Progress(ProgressUpdate::Percent(100)));
            }
            Ok(Err(e)) => self.fail(OpKind::Filter, format!("Pipeline execution failed: {}", e)),
            Err(e) => self.fail(OpKind::Filter, format!("filter worker failed: {}", e)),
        }
    }

    /// Append executed stages to the layer and cache their output.
    /// False when the layer vanished or was replaced since the snapshot;
    /// the result is then dropped without an event.
    fn apply_stage_append(
        &self,
        key: &str,
        base: &Arc<PointBuffers>,
        stages: Vec<PipelineStage>,
        output: ExecutionOutput,
    ) -> bool {
        let added: Vec<(String, String)> = stages
            .iter()
            .map(|stage| (stage.name.clone(), stage.param_summary()))
            .collect();
        {
            let mut layers = self.layers.write().unwrap();
            let Some(layer) = layers.get_mut(key) else {
                return false;
            };
            if !Arc::ptr_eq(&layer.base_data, base) {
                return false;
            }
            let points = Arc::new(output.points);
            let mut last_index = None;
            for stage in stages {
                last_index = Some(layer.add_stage(stage));
            }
            if let Some(index) = last_index {
                layer.cache.insert(index, Arc::clone(&points));
            }
            layer.render_data =
                render::downsample(&points, self.config.max_visible_points.value);
        }
        for (name, details) in added {
            self.emit(SessionEvent::StageAdded {
                key: key.to_string(),
                name,
                details,
            });
        }
        self.emit(SessionEvent::RenderUpdated {
            key: key.to_string(),
        });
        true
    }

    /// Install a replayed pipeline result: cache it at the last active
    /// stage and refresh the render view
    fn apply_refresh(&self, key: &str, base: &Arc<PointBuffers>, output: ExecutionOutput) -> bool {
        {
            let mut layers = self.layers.write().unwrap();
            let Some(layer) = layers.get_mut(key) else {
                return false;
            };
            if !Arc::ptr_eq(&layer.base_data, base) {
                return false;
            }
            let points = Arc::new(output.points);
            if let Some(index) = layer.last_active_index() {
                layer.cache.insert(index, Arc::clone(&points));
            }
            layer.render_data =
                render::downsample(&points, self.config.max_visible_points.value);
        }
        self.emit(SessionEvent::RenderUpdated {
            key: key.to_string(),
        });
        true
    }

    /// Live per-stage progress line from the executor callback
    fn stage_progress(&self, labels: &[String], report: &StageReport) {
        let line = match report
            .tag
            .strip_prefix("batch_stage_")
            .and_then(|suffix| suffix.parse::<usize>().ok())
        {
            Some(i) => format!(
                "Stage {}: {} | In: {} -> Out: {}",
                i + 1,
                labels.get(i).map(String::as_str).unwrap_or(&report.tag),
                group_digits(report.input_count),
                group_digits(report.output_count)
            ),
            None => format!(
                "Filter Applied: {} | In: {} -> Out: {}",
                report.tag,
                group_digits(report.input_count),
                group_digits(report.output_count)
            ),
        };
        self.log(LogLevel::Info, line);
    }
}
