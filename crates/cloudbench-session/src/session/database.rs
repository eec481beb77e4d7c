//! Database-backed operations: loading pgpointcloud tables as layers,
//! importing files, and exporting pipeline results into patch tables.
//!
//! Each operation opens its target connection through the store provider
//! when the worker runs; connection failures surface as operation
//! failures, never as panics or hung slots.

use std::path::PathBuf;
use std::sync::Arc;

use cloudbench_core::models::{ConnectionProfile, SourceDescriptor};
use cloudbench_core::{CloudbenchError, Result};
use cloudbench_store::{LoadOptions, PatchTableInfo, TableRef};

use crate::events::{group_digits, LogLevel, OpKind, ProgressUpdate, SessionEvent};

use super::{plan, Session};

impl Session {
    /// Pull a decimated view of a patch table and install it as a layer.
    /// The layer key embeds host, table, and predicate so distinct
    /// queries against the same table coexist.
    pub async fn load_from_database(
        &self,
        profile: ConnectionProfile,
        schema: String,
        table: String,
        predicate: String,
    ) -> Result<()> {
        let key = database_key(&profile, &schema, &table, &predicate);
        self.dispatch(OpKind::DbLoad, move |inner, cancel| async move {
            inner.log(
                LogLevel::Info,
                format!("Loading from database: {}.{}...", schema, table),
            );
            inner.emit(SessionEvent::Progress(ProgressUpdate::Indeterminate));

            let target = TableRef::new(schema.clone(), table.clone());
            let options = LoadOptions {
                predicate: predicate.clone(),
                ceiling: inner.config.max_visible_points.value,
            };
            let result = match inner.store_provider.open(&profile).await {
                Ok(store) => store.load_table(&target, &options).await,
                Err(e) => Err(e),
            };

            if cancel.is_cancelled() {
                return;
            }
            match result {
                Ok(load) => {
                    let name = target.qualified();
                    let source = SourceDescriptor::Database {
                        profile,
                        schema,
                        table,
                        predicate,
                    };
                    inner.install_layer(
                        &key,
                        &name,
                        source,
                        load.points,
                        load.bounds,
                        load.summary,
                        None,
                    );
                    inner.log(LogLevel::Info, format!("Layer loaded from Database: {}", key));
                    inner.emit(SessionEvent::Progress(ProgressUpdate::Percent(100)));
                }
                Err(e) => inner.fail(OpKind::DbLoad, format!("Database load failed: {}", e)),
            }
        })
        .await;
        Ok(())
    }

    /// Import a LAS/LAZ file straight into a patch table without going
    /// through a layer
    pub async fn import_file_to_database(
        &self,
        profile: ConnectionProfile,
        path: PathBuf,
        schema: String,
        table: String,
    ) -> Result<()> {
        if path.as_os_str().is_empty() {
            return Err(CloudbenchError::EmptyPath);
        }
        self.dispatch(OpKind::DbImport, move |inner, cancel| async move {
            inner.log(
                LogLevel::Info,
                format!("Importing '{}' into {}.{}...", path.display(), schema, table),
            );
            inner.emit(SessionEvent::Progress(ProgressUpdate::Indeterminate));

            let target = TableRef::new(schema, table);
            let source_name = path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_else(|| "import".to_string());
            let result = match inner.store_provider.open(&profile).await {
                Ok(store) => store.import_file(&target, &path, &source_name).await,
                Err(e) => Err(e),
            };

            if cancel.is_cancelled() {
                return;
            }
            match result {
                Ok(report) => {
                    let message = format!(
                        "Successfully saved {} points to database. (SRID: {})",
                        group_digits(report.written),
                        report.srid
                    );
                    inner.emit(SessionEvent::DbImportFinished {
                        message: message.clone(),
                    });
                    inner.log(LogLevel::Info, message);
                    inner.emit(SessionEvent::Progress(ProgressUpdate::Percent(100)));
                }
                Err(e) => inner.fail(OpKind::DbImport, format!("Database import failed: {}", e)),
            }
        })
        .await;
        Ok(())
    }

    /// Run the layer's active pipeline and write the result into a patch
    /// table. The SRID follows the pipeline's current CRS; layers without
    /// one fall back to the configured default.
    pub async fn export_layer_to_database(
        &self,
        key: &str,
        profile: ConnectionProfile,
        schema: String,
        table: String,
    ) -> Result<()> {
        if !self.inner.has_layer(key) {
            self.inner.log(
                LogLevel::Warning,
                format!("Export failed: Layer not found {}", key),
            );
            return Ok(());
        }
        let key = key.to_string();
        self.dispatch(OpKind::DbImport, move |inner, cancel| async move {
            inner.log(
                LogLevel::Info,
                format!("Starting export: '{}' -> '{}.{}'...", key, schema, table),
            );
            inner.emit(SessionEvent::Progress(ProgressUpdate::Indeterminate));

            let Some(layer) = inner.snapshot(&key) else {
                inner.fail(
                    OpKind::DbImport,
                    format!("Export failed: Layer not found {}", key),
                );
                return;
            };
            let srid = match plan::current_epsg(&layer) {
                Some(epsg) => epsg,
                None => {
                    let fallback = inner.config.fallback_srid.value;
                    inner.log(
                        LogLevel::Warning,
                        format!(
                            "Layer '{}' has no EPSG; exporting with SRID {}.",
                            key, fallback
                        ),
                    );
                    fallback
                }
            };
            let execution = plan::replay_plan(&layer);

            let backend = Arc::clone(&inner.backend);
            let exec_cancel = cancel.clone();
            let executed = tokio::task::spawn_blocking(move || {
                backend.execute(&execution, &exec_cancel, &mut |_| {})
            })
            .await;

            if cancel.is_cancelled() {
                return;
            }
            let output = match executed {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    inner.fail(OpKind::DbImport, format!("Database export failed: {}", e));
                    return;
                }
                Err(e) => {
                    inner.fail(OpKind::DbImport, format!("db import worker failed: {}", e));
                    return;
                }
            };

            let target = TableRef::new(schema, table);
            let result = match inner.store_provider.open(&profile).await {
                Ok(store) => {
                    store
                        .import_buffers(&target, &output.points, srid, &key)
                        .await
                }
                Err(e) => Err(e),
            };

            if cancel.is_cancelled() {
                return;
            }
            match result {
                Ok(report) => {
                    let message = format!(
                        "Successfully saved {} points to database. (SRID: {})",
                        group_digits(report.written),
                        report.srid
                    );
                    inner.emit(SessionEvent::DbImportFinished {
                        message: message.clone(),
                    });
                    inner.log(LogLevel::Info, message);
                    inner.emit(SessionEvent::Progress(ProgressUpdate::Percent(100)));
                }
                Err(e) => inner.fail(OpKind::DbImport, format!("Database export failed: {}", e)),
            }
        })
        .await;
        Ok(())
    }

    /// Pointcloud tables visible through `profile`. Returns directly and
    /// emits no events.
    pub async fn list_database_tables(
        &self,
        profile: &ConnectionProfile,
    ) -> Result<Vec<PatchTableInfo>> {
        let store = self.inner.store_provider.open(profile).await?;
        store.list_tables().await
    }
}

fn database_key(
    profile: &ConnectionProfile,
    schema: &str,
    table: &str,
    predicate: &str,
) -> String {
    let mut key = format!("DB://{}/{}.{}", profile.host, schema, table);
    if !predicate.is_empty() {
        key.push('?');
        key.push_str(predicate);
    }
    key
}
