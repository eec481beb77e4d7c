//! Data lifecycle operations: file loads, merges, layer removal, and the
//! export/save surfaces.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cloudbench_core::models::{Bounds, PointBuffers, SourceDescriptor, SummaryMetadata};
use cloudbench_core::{CloudbenchError, Result};

use crate::events::{group_digits, LogLevel, OpKind, ProgressUpdate, SessionEvent};

use super::{plan, Session};

impl Session {
    /// Load a LAS/LAZ file as a layer keyed by its file stem. A second
    /// load of the same stem replaces the existing layer.
    pub async fn load_layer(&self, path: PathBuf) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(CloudbenchError::EmptyPath);
        }
        let source = SourceDescriptor::File { path: path.clone() };
        let key = source.display_name();

        self.dispatch(OpKind::Read, move |inner, cancel| async move {
            inner.log(
                LogLevel::Info,
                format!("Loading file: {}...", path.display()),
            );
            inner.emit(SessionEvent::Progress(ProgressUpdate::Indeterminate));

            let reader = Arc::clone(&inner.reader);
            let read_path = path.clone();
            let result = tokio::task::spawn_blocking(move || {
                let points = reader.read_points(&read_path)?;
                let metadata = reader.read_metadata(&read_path)?;
                let summary = reader.summarize(&metadata);
                let bounds = reader.read_bounds(&read_path)?;
                Ok::<_, CloudbenchError>((points, metadata, summary, bounds))
            })
            .await;

            if cancel.is_cancelled() {
                return;
            }
            match result {
                Ok(Ok((points, metadata, summary, bounds))) => {
                    inner.install_layer(&key, &key, source, points, bounds, summary, Some(metadata));
                    inner.log(
                        LogLevel::Info,
                        format!("File '{}' loaded successfully.", key),
                    );
                    inner.emit(SessionEvent::Progress(ProgressUpdate::Percent(100)));
                }
                Ok(Err(e)) => inner.fail(OpKind::Read, format!("Error loading file: {}", e)),
                Err(e) => inner.fail(OpKind::Read, format!("read worker failed: {}", e)),
            }
        })
        .await;
        Ok(())
    }

    /// Combine several files into one layer. Channels survive only when
    /// every input carries them; the result keeps a common EPSG when all
    /// inputs agree and none otherwise.
    pub async fn merge_layers(&self, paths: Vec<PathBuf>, output_name: Option<String>) -> Result<()> {
        if paths.len() < 2 {
            self.inner
                .log(LogLevel::Warning, "Merge requires at least two files.".to_string());
            return Ok(());
        }
        let key = output_name.unwrap_or_else(|| "Merged".to_string());

        self.dispatch(OpKind::Merge, move |inner, cancel| async move {
            inner.log(LogLevel::Info, format!("Merging {} files...", paths.len()));
            inner.emit(SessionEvent::Progress(ProgressUpdate::Indeterminate));

            let reader = Arc::clone(&inner.reader);
            let read_paths = paths.clone();
            let merge_cancel = cancel.clone();
            let result = tokio::task::spawn_blocking(move || {
                let mut combined: Option<PointBuffers> = None;
                let mut bounds: Option<Bounds> = None;
                let mut epsg: Option<Option<u32>> = None;
                let mut mixed_crs = false;

                for path in &read_paths {
                    if merge_cancel.is_cancelled() {
                        return Err(CloudbenchError::Interrupted);
                    }
                    let points = reader.read_points(path)?;
                    let metadata = reader.read_metadata(path)?;
                    let summary = reader.summarize(&metadata);
                    let file_bounds = reader.read_bounds(path)?;

                    combined = Some(match combined {
                        None => points,
                        Some(mut existing) => {
                            existing.append(&points);
                            existing
                        }
                    });
                    bounds = Some(match bounds {
                        None => file_bounds,
                        Some(existing) => existing.merged(&file_bounds),
                    });
                    epsg = Some(match epsg {
                        None => summary.epsg,
                        Some(agreed) if agreed == summary.epsg => agreed,
                        Some(_) => {
                            mixed_crs = true;
                            None
                        }
                    });
                }

                let combined = combined.unwrap_or_default();
                if combined.is_empty() {
                    return Err(CloudbenchError::EmptyResult);
                }
                // metadata ranges stay in source coordinates; the layer
                // bounds above may already be canonicalized to WGS84
                let extent = combined.bounds().unwrap_or_else(Bounds::empty);
                let epsg = epsg.flatten();
                let summary = SummaryMetadata {
                    points: combined.len() as u64,
                    compressed: false,
                    crs_name: "Merged CRS".to_string(),
                    epsg,
                    unit: "N/A".to_string(),
                    software_id: "Merge".to_string(),
                    x_range: SummaryMetadata::range_string(extent.minx, extent.maxx),
                    y_range: SummaryMetadata::range_string(extent.miny, extent.maxy),
                    z_range: SummaryMetadata::range_string(extent.minz, extent.maxz),
                };
                let bounds = bounds.unwrap_or_else(Bounds::empty);
                Ok((combined, bounds, summary, mixed_crs))
            })
            .await;

            if cancel.is_cancelled() {
                return;
            }
            match result {
                Ok(Ok((points, bounds, summary, mixed_crs))) => {
                    if mixed_crs {
                        inner.log(
                            LogLevel::Warning,
                            "Merged files declare different coordinate systems; result EPSG left unset."
                                .to_string(),
                        );
                    }
                    inner.install_layer(
                        &key,
                        &key,
                        SourceDescriptor::Merged { paths },
                        points,
                        bounds,
                        summary,
                        None,
                    );
                    inner.log(
                        LogLevel::Info,
                        format!("File '{}' loaded successfully.", key),
                    );
                    inner.emit(SessionEvent::Progress(ProgressUpdate::Percent(100)));
                }
                Ok(Err(e)) => inner.fail(OpKind::Merge, format!("Merge failed: {}", e)),
                Err(e) => inner.fail(OpKind::Merge, format!("merge worker failed: {}", e)),
            }
        })
        .await;
        Ok(())
    }

    /// Drop a layer. [`SessionEvent::LayerRemoved`] fires even for unknown
    /// keys so a host's layer tree can always clear the entry.
    pub fn remove_layer(&self, key: &str) {
        let removed = self.inner.layers.write().unwrap().remove(key).is_some();
        if removed {
            self.inner
                .log(LogLevel::Info, format!("File '{}' removed from cache.", key));
        } else {
            self.inner
                .log(LogLevel::Warning, format!("File not found in cache: {}", key));
        }
        self.inner.emit(SessionEvent::LayerRemoved {
            key: key.to_string(),
        });
    }

    /// Write a layer's current pipeline result to a LAS/LAZ file.
    ///
    /// The source CRS is embedded only while the pipeline contains no
    /// active reprojection; after one, the load-time WKT no longer
    /// describes the coordinates.
    pub async fn export_layer(&self, key: &str, destination: PathBuf) -> Result<()> {
        if destination.as_os_str().is_empty() {
            self.inner
                .log(LogLevel::Warning, "Export path not selected.".to_string());
            return Ok(());
        }
        if !self.inner.has_layer(key) {
            self.inner.log(
                LogLevel::Warning,
                format!("Export failed: Layer not found {}", key),
            );
            return Ok(());
        }
        let key = key.to_string();

        self.dispatch(OpKind::Export, move |inner, cancel| async move {
            inner.log(
                LogLevel::Info,
                format!("Starting export: '{}' -> '{}'...", key, destination.display()),
            );
            inner.emit(SessionEvent::Progress(ProgressUpdate::Indeterminate));

            let Some(layer) = inner.snapshot(&key) else {
                inner.fail(OpKind::Export, format!("Export failed: Layer not found {}", key));
                return;
            };
            let wkt = if plan::current_epsg(&layer) == layer.metadata.epsg {
                layer.full_metadata.as_ref().and_then(|m| m.crs_wkt.clone())
            } else {
                None
            };
            let execution = plan::replay_plan(&layer);

            let backend = Arc::clone(&inner.backend);
            let writer = Arc::clone(&inner.writer);
            let dest = destination.clone();
            let exec_cancel = cancel.clone();
            let result = tokio::task::spawn_blocking(move || {
                let output = backend.execute(&execution, &exec_cancel, &mut |_| {})?;
                writer.write_points(&dest, &output.points, wkt.as_deref())
            })
            .await;

            if cancel.is_cancelled() {
                return;
            }
            match result {
                Ok(Ok(written)) => {
                    let message = format!(
                        "Export successful! File: {} | Points Written: {}",
                        destination.display(),
                        group_digits(written)
                    );
                    inner.emit(SessionEvent::ExportFinished { message });
                    inner.log(
                        LogLevel::Info,
                        "Export operation completed successfully.".to_string(),
                    );
                    inner.emit(SessionEvent::Progress(ProgressUpdate::Percent(100)));
                }
                Ok(Err(e)) => inner.fail(OpKind::Export, format!("Export failed: {}", e)),
                Err(e) => inner.fail(OpKind::Export, format!("export worker failed: {}", e)),
            }
        })
        .await;
        Ok(())
    }

    /// Serialize a layer's full pipeline, reader stage first. Returns the
    /// path written, or `None` when nothing was saved.
    pub fn save_pipeline(&self, key: &str, path: &Path) -> Result<Option<PathBuf>> {
        if path.as_os_str().is_empty() {
            self.inner
                .log(LogLevel::Warning, "Export path not selected.".to_string());
            return Ok(None);
        }
        let Some(layer) = self.inner.snapshot(key) else {
            self.inner
                .log(LogLevel::Warning, format!("Layer not found: {}", key));
            return Ok(None);
        };
        match self
            .inner
            .pipeline_writer
            .write_pipeline(path, &layer.full_pipeline())
        {
            Ok(written) => {
                self.inner
                    .log(LogLevel::Info, format!("Pipeline saved: {}", written.display()));
                Ok(Some(written))
            }
            Err(e) => {
                self.inner
                    .log(LogLevel::Error, format!("Pipeline save failed: {}", e));
                Err(e)
            }
        }
    }

    /// Serialize a layer's source metadata. Layers loaded from the
    /// database never carried full reader metadata; those fall back to the
    /// condensed summary.
    pub fn save_metadata(&self, key: &str, path: &Path) -> Result<Option<PathBuf>> {
        if path.as_os_str().is_empty() {
            self.inner
                .log(LogLevel::Warning, "Export path not selected.".to_string());
            return Ok(None);
        }
        let Some(layer) = self.inner.snapshot(key) else {
            self.inner
                .log(LogLevel::Warning, format!("Layer not found: {}", key));
            return Ok(None);
        };
        let written = match layer.full_metadata.as_ref() {
            Some(metadata) => self.inner.metadata_writer.write_metadata(path, metadata),
            None => {
                self.inner.log(
                    LogLevel::Warning,
                    format!("Full metadata not available for '{}'. Saving summary.", key),
                );
                self.inner.metadata_writer.write_summary(path, &layer.metadata)
            }
        };
        match written {
            Ok(written) => {
                self.inner
                    .log(LogLevel::Info, format!("Metadata saved: {}", written.display()));
                Ok(Some(written))
            }
            Err(e) => {
                self.inner
                    .log(LogLevel::Error, format!("Metadata save failed: {}", e));
                Err(e)
            }
        }
    }
}
