//! Patch-table import and export against pgpointcloud
//!
//! Import writes points in patches of the configured capacity via
//! `PC_MakePatch`, then runs a correction pass that backfills the `source`
//! column and re-declares the patch column with the pcid actually written.
//! A failure after patches were committed surfaces as `PartialImport`
//! rather than rolling back; the rows are already useful.
//!
//! Load never pulls a table in full: it counts first, derives a stride
//! for the visible-point ceiling, and decimates server-side with a
//! `row_number()` window before `PC_Get` extraction.

use std::path::Path;

use async_trait::async_trait;
use cloudbench_core::error::{CloudbenchError, Result};
use cloudbench_core::models::{PointBuffers, SummaryMetadata};
use cloudbench_core::render::decimation_stride;
use cloudbench_geo::{bounds_to_wgs84, parse_crs_info};
use sqlx::postgres::PgRow;
use sqlx::Row;

use super::schema::{build_schema_xml, interleave, parse_schema_xml, schema_dimensions, SchemaDimension};
use super::PostgresStore;
use crate::ports::{ImportReport, LoadOptions, PatchStore, PatchTableInfo, TableLoad, TableRef};

/// Double-quote an identifier for interpolation into DDL/DML text.
/// Patch tables are user-named, so this is the only quoting discipline
/// that keeps arbitrary names (and embedded quotes) safe.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn qualified_table(target: &TableRef) -> String {
    format!(
        "{}.{}",
        quote_ident(&target.schema),
        quote_ident(&target.table)
    )
}

fn create_schema_sql(target: &TableRef) -> String {
    format!("CREATE SCHEMA IF NOT EXISTS {}", quote_ident(&target.schema))
}

fn create_table_sql(target: &TableRef) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (id SERIAL PRIMARY KEY, {} PCPATCH, source TEXT)",
        qualified_table(target),
        quote_ident(&target.column)
    )
}

fn insert_patch_sql(target: &TableRef) -> String {
    format!(
        "INSERT INTO {} ({}) VALUES (PC_MakePatch($1, $2))",
        qualified_table(target),
        quote_ident(&target.column)
    )
}

fn backfill_source_sql(target: &TableRef) -> String {
    format!(
        "UPDATE {} SET source = $1 WHERE source IS NULL",
        qualified_table(target)
    )
}

/// The correction-pass DDL that makes the column declare the schema id
/// its patches were written with
fn declare_pcid_sql(target: &TableRef, pcid: i32) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} TYPE PCPATCH({})",
        qualified_table(target),
        quote_ident(&target.column),
        pcid
    )
}

fn count_points_sql(target: &TableRef, predicate: &str) -> String {
    let mut sql = format!(
        "SELECT COALESCE(SUM(PC_NumPoints({})), 0)::BIGINT FROM {}",
        quote_ident(&target.column),
        qualified_table(target)
    );
    let predicate = predicate.trim();
    if !predicate.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(predicate);
    }
    sql
}

fn select_points_sql(
    target: &TableRef,
    predicate: &str,
    dims: &[SchemaDimension],
    stride: u64,
) -> String {
    let extracts = dims
        .iter()
        .map(|dim| {
            format!(
                "PC_Get(pt, '{}')::float8 AS {}",
                dim.name,
                quote_ident(&dim.name.to_lowercase())
            )
        })
        .collect::<Vec<_>>()
        .join(", ");
    let predicate = predicate.trim();
    let where_clause = if predicate.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", predicate)
    };
    format!(
        "WITH exploded AS (SELECT PC_Explode({column}) AS pt FROM {table}{where_clause}), \
         numbered AS (SELECT pt, row_number() OVER () AS rn FROM exploded) \
         SELECT {extracts} FROM numbered WHERE (rn - 1) % {stride} = 0",
        column = quote_ident(&target.column),
        table = qualified_table(target),
        where_clause = where_clause,
        extracts = extracts,
        stride = stride.max(1)
    )
}

fn db_error(context: &str, e: impl std::fmt::Display) -> CloudbenchError {
    CloudbenchError::Database(format!("{}: {}", context, e))
}

/// Reassemble `PC_Get` rows into columnar buffers, mapping canonical
/// channel names back to their typed vectors.
fn rows_to_buffers(rows: &[PgRow], dims: &[SchemaDimension]) -> Result<PointBuffers> {
    let mut columns: Vec<Vec<f64>> = dims
        .iter()
        .map(|_| Vec::with_capacity(rows.len()))
        .collect();
    for row in rows {
        for (j, dim) in dims.iter().enumerate() {
            let alias = dim.name.to_lowercase();
            let value: f64 = row
                .try_get(alias.as_str())
                .map_err(|e| db_error("Failed to decode patch point", e))?;
            columns[j].push(value);
        }
    }

    let mut points = PointBuffers::new();
    let as_u16 = |column: &Vec<f64>| column.iter().map(|v| *v as u16).collect::<Vec<u16>>();
    for (dim, column) in dims.iter().zip(columns) {
        match dim.name.as_str() {
            "X" => points.x = column,
            "Y" => points.y = column,
            "Z" => points.z = column,
            "Intensity" => points.intensity = Some(as_u16(&column)),
            "Classification" => {
                points.classification = Some(column.iter().map(|v| *v as u8).collect())
            }
            "Red" => points.red = Some(as_u16(&column)),
            "Green" => points.green = Some(as_u16(&column)),
            "Blue" => points.blue = Some(as_u16(&column)),
            other => {
                points.extra.insert(other.to_string(), column);
            }
        }
    }

    let n = rows.len();
    if points.x.len() != n || points.y.len() != n || points.z.len() != n {
        return Err(CloudbenchError::Database(
            "Patch schema does not declare X, Y and Z".to_string(),
        ));
    }
    Ok(points)
}

impl PostgresStore {
    /// Find or register the `pointcloud_formats` entry for this channel
    /// set and SRID, returning its pcid.
    async fn ensure_format(&self, dims: &[SchemaDimension], srid: u32) -> Result<i32> {
        self.ensure_extension().await?;

        let xml = build_schema_xml(dims);
        let existing: Option<i32> = sqlx::query_scalar(
            "SELECT pcid FROM pointcloud_formats WHERE srid = $1 AND schema = $2",
        )
        .bind(srid as i32)
        .bind(&xml)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_error("Failed to look up patch schema", e))?;

        if let Some(pcid) = existing {
            return Ok(pcid);
        }

        let pcid: i32 = sqlx::query_scalar(
            "INSERT INTO pointcloud_formats (pcid, srid, schema) \
             SELECT COALESCE(MAX(pcid), 0) + 1, $1, $2 FROM pointcloud_formats \
             RETURNING pcid",
        )
        .bind(srid as i32)
        .bind(&xml)
        .fetch_one(self.pool())
        .await
        .map_err(|e| db_error("Failed to register patch schema", e))?;

        tracing::debug!(pcid, srid, "registered patch schema");
        Ok(pcid)
    }

    /// Make sure the pointcloud extension objects are present. Creating
    /// the extension needs elevated rights, so an existing installation
    /// is also accepted.
    async fn ensure_extension(&self) -> Result<()> {
        if sqlx::query("CREATE EXTENSION IF NOT EXISTS pointcloud")
            .execute(self.pool())
            .await
            .is_ok()
        {
            return Ok(());
        }
        sqlx::query("SELECT 1 FROM pointcloud_formats LIMIT 1")
            .fetch_optional(self.pool())
            .await
            .map_err(|e| {
                CloudbenchError::Database(format!(
                    "pointcloud extension is not installed and cannot be created: {}",
                    e
                ))
            })?;
        Ok(())
    }
}

#[async_trait]
impl PatchStore for PostgresStore {
    async fn import_file(
        &self,
        target: &TableRef,
        path: &Path,
        source_name: &str,
    ) -> Result<ImportReport> {
        let reader = self.reader();
        let owned_path = path.to_path_buf();
        let (points, metadata) = tokio::task::spawn_blocking(move || {
            let points = reader.read_points(&owned_path)?;
            let metadata = reader.read_metadata(&owned_path)?;
            Ok::<_, CloudbenchError>((points, metadata))
        })
        .await
        .map_err(|e| db_error("Import worker failed", e))??;

        let srid = metadata
            .crs_wkt
            .as_deref()
            .map(parse_crs_info)
            .and_then(|info| info.epsg)
            .unwrap_or_else(|| {
                tracing::warn!(
                    fallback = self.fallback_srid(),
                    "source file declares no EPSG code, using fallback SRID"
                );
                self.fallback_srid()
            });

        self.import_buffers(target, &points, srid, source_name).await
    }

    async fn import_buffers(
        &self,
        target: &TableRef,
        points: &PointBuffers,
        srid: u32,
        source_name: &str,
    ) -> Result<ImportReport> {
        if points.is_empty() {
            return Err(CloudbenchError::Database(
                "Refusing to import empty buffers".to_string(),
            ));
        }

        let dims = schema_dimensions(points);
        let pcid = self.ensure_format(&dims, srid).await?;

        sqlx::query(&create_schema_sql(target))
            .execute(self.pool())
            .await
            .map_err(|e| db_error("Failed to create schema", e))?;
        sqlx::query(&create_table_sql(target))
            .execute(self.pool())
            .await
            .map_err(|e| db_error("Failed to create table", e))?;

        let insert = insert_patch_sql(target);
        let capacity = self.patch_capacity();
        let mut written = 0u64;
        let mut patch_count = 0u64;
        for start in (0..points.len()).step_by(capacity) {
            let end = (start + capacity).min(points.len());
            let values = interleave(points, &dims, start..end);
            sqlx::query(&insert)
                .bind(pcid)
                .bind(&values)
                .execute(self.pool())
                .await
                .map_err(|e| {
                    if written > 0 {
                        CloudbenchError::PartialImport {
                            written,
                            reason: format!("patch insert failed: {}", e),
                        }
                    } else {
                        db_error("Failed to write patch", e)
                    }
                })?;
            written += (end - start) as u64;
            patch_count += 1;
        }

        // correction pass: rows are in, label them and pin the column type
        sqlx::query(&backfill_source_sql(target))
            .bind(source_name)
            .execute(self.pool())
            .await
            .map_err(|e| CloudbenchError::PartialImport {
                written,
                reason: format!("source backfill failed: {}", e),
            })?;
        sqlx::query(&declare_pcid_sql(target, pcid))
            .execute(self.pool())
            .await
            .map_err(|e| CloudbenchError::PartialImport {
                written,
                reason: format!("patch column type declaration failed: {}", e),
            })?;

        tracing::debug!(
            table = %target.qualified(),
            written,
            patch_count,
            srid,
            pcid,
            "import committed"
        );
        Ok(ImportReport {
            written,
            srid,
            patch_count,
        })
    }

    async fn load_table(&self, target: &TableRef, options: &LoadOptions) -> Result<TableLoad> {
        let column_row = sqlx::query(
            "SELECT pcid, srid FROM pointcloud_columns \
             WHERE \"schema\" = $1 AND \"table\" = $2 AND \"column\" = $3",
        )
        .bind(&target.schema)
        .bind(&target.table)
        .bind(&target.column)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| db_error("Failed to resolve pointcloud column", e))?;

        let Some(column_row) = column_row else {
            return Err(CloudbenchError::Database(format!(
                "{} has no registered pointcloud column",
                target.qualified()
            )));
        };
        let pcid: i32 = column_row.get("pcid");
        let srid = column_row.get::<i32, _>("srid") as u32;

        let total: i64 = sqlx::query_scalar(&count_points_sql(target, &options.predicate))
            .fetch_one(self.pool())
            .await
            .map_err(|e| db_error("Failed to count points", e))?;
        if total <= 0 {
            return Err(CloudbenchError::EmptyTable);
        }
        let total = total as u64;
        let stride = decimation_stride(total, options.ceiling as u64);

        let xml: String = sqlx::query_scalar("SELECT schema FROM pointcloud_formats WHERE pcid = $1")
            .bind(pcid)
            .fetch_one(self.pool())
            .await
            .map_err(|e| db_error("Failed to fetch patch schema", e))?;
        let dims = parse_schema_xml(&xml)?;

        let rows = sqlx::query(&select_points_sql(target, &options.predicate, &dims, stride))
            .fetch_all(self.pool())
            .await
            .map_err(|e| db_error("Failed to fetch points", e))?;
        let points = rows_to_buffers(&rows, &dims)?;
        let mut bounds = points.bounds().ok_or(CloudbenchError::EmptyTable)?;
        bounds.epsg = Some(srid);

        let summary = SummaryMetadata {
            points: total,
            compressed: false,
            crs_name: format!("EPSG:{}", srid),
            epsg: Some(srid),
            unit: "N/A".to_string(),
            software_id: "PostgreSQL/pgpointcloud".to_string(),
            x_range: SummaryMetadata::range_string(bounds.minx, bounds.maxx),
            y_range: SummaryMetadata::range_string(bounds.miny, bounds.maxy),
            z_range: SummaryMetadata::range_string(bounds.minz, bounds.maxz),
        };

        let wgs84 = if srid == 4326 {
            bounds
        } else {
            match bounds_to_wgs84(&bounds) {
                Ok(wgs84) => wgs84,
                Err(e) => {
                    tracing::warn!("Falling back to source-CRS bounds: {}", e);
                    bounds
                }
            }
        };

        tracing::debug!(
            table = %target.qualified(),
            total,
            stride,
            kept = points.len(),
            srid,
            "table loaded"
        );
        Ok(TableLoad {
            points,
            total_in_table: total,
            stride,
            bounds: wgs84,
            summary,
            srid,
        })
    }

    async fn list_tables(&self) -> Result<Vec<PatchTableInfo>> {
        let rows = sqlx::query(
            "SELECT \"schema\", \"table\", \"column\", srid FROM pointcloud_columns \
             ORDER BY \"schema\", \"table\"",
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| db_error("Failed to list patch tables", e))?;

        Ok(rows
            .iter()
            .map(|row| PatchTableInfo {
                schema: row.get("schema"),
                table: row.get("table"),
                column: row.get("column"),
                srid: row.get::<i32, _>("srid") as u32,
            })
            .collect())
    }
}
