//! Batch-preset persistence
//!
//! Presets live in a `cloudbench_presets` table created on first use;
//! stages are stored as JSONB in the `{tool_name, params}` shape the tool
//! registry round-trips.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cloudbench_core::error::{CloudbenchError, Result};
use cloudbench_core::models::{BatchPreset, StageSpec};
use sqlx::Row;
use uuid::Uuid;

use super::PostgresStore;
use crate::ports::PresetStore;

const CREATE_PRESETS_TABLE: &str = "CREATE TABLE IF NOT EXISTS cloudbench_presets (\
     id UUID PRIMARY KEY, \
     name TEXT NOT NULL, \
     description TEXT NOT NULL, \
     stages JSONB NOT NULL, \
     created_at TIMESTAMPTZ NOT NULL)";

impl PostgresStore {
    async fn ensure_preset_table(&self) -> Result<()> {
        sqlx::query(CREATE_PRESETS_TABLE)
            .execute(self.pool())
            .await
            .map_err(|e| {
                CloudbenchError::Database(format!("Failed to create preset table: {}", e))
            })?;
        Ok(())
    }
}

fn row_to_preset(row: &sqlx::postgres::PgRow) -> Result<BatchPreset> {
    let stages_json: serde_json::Value = row.get("stages");
    let stages: Vec<StageSpec> = serde_json::from_value(stages_json)
        .map_err(|e| CloudbenchError::Serialization(format!("Corrupt preset stages: {}", e)))?;
    Ok(BatchPreset {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        stages,
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
    })
}

#[async_trait]
impl PresetStore for PostgresStore {
    async fn save_preset(&self, preset: &BatchPreset) -> Result<()> {
        self.ensure_preset_table().await?;
        let stages = serde_json::to_value(&preset.stages)
            .map_err(|e| CloudbenchError::Serialization(format!("Failed to serialize preset stages: {}", e)))?;

        sqlx::query(
            "INSERT INTO cloudbench_presets (id, name, description, stages, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (id) DO UPDATE \
             SET name = EXCLUDED.name, \
                 description = EXCLUDED.description, \
                 stages = EXCLUDED.stages",
        )
        .bind(preset.id)
        .bind(&preset.name)
        .bind(&preset.description)
        .bind(stages)
        .bind(preset.created_at)
        .execute(self.pool())
        .await
        .map_err(|e| CloudbenchError::Database(format!("Failed to save preset: {}", e)))?;
        Ok(())
    }

    async fn get_preset(&self, id: Uuid) -> Result<Option<BatchPreset>> {
        self.ensure_preset_table().await?;
        let row = sqlx::query(
            "SELECT id, name, description, stages, created_at FROM cloudbench_presets WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| CloudbenchError::Database(format!("Failed to get preset: {}", e)))?;

        row.as_ref().map(row_to_preset).transpose()
    }

    async fn list_presets(&self) -> Result<Vec<BatchPreset>> {
        self.ensure_preset_table().await?;
        let rows = sqlx::query(
            "SELECT id, name, description, stages, created_at FROM cloudbench_presets \
             ORDER BY created_at DESC",
        )
        .fetch_all(self.pool())
        .await
        .map_err(|e| CloudbenchError::Database(format!("Failed to list presets: {}", e)))?;

        rows.iter().map(row_to_preset).collect()
    }

    async fn delete_preset(&self, id: Uuid) -> Result<()> {
        self.ensure_preset_table().await?;
        sqlx::query("DELETE FROM cloudbench_presets WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| CloudbenchError::Database(format!("Failed to delete preset: {}", e)))?;
        Ok(())
    }
}
