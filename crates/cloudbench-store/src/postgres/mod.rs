//! PostgreSQL pointcloud storage adapter

pub mod patch;
pub mod preset;
pub mod schema;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cloudbench_core::config::LayeredConfig;
use cloudbench_core::error::{CloudbenchError, Result};
use cloudbench_core::models::ConnectionProfile;
use cloudbench_core::ports::PointReader;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

use crate::ports::{PatchStore, PatchStoreProvider};

/// PostgreSQL storage adapter.
///
/// One instance per connection profile; implements [`PatchStore`] for
/// pgpointcloud patch tables and [`PresetStore`] for batch presets.
///
/// [`PatchStore`]: crate::ports::PatchStore
/// [`PresetStore`]: crate::ports::PresetStore
pub struct PostgresStore {
    pool: PgPool,
    reader: Arc<dyn PointReader>,
    patch_capacity: usize,
    fallback_srid: u32,
}

impl PostgresStore {
    /// Connect to the database described by `profile` and verify the
    /// connection with a probe query. `reader` is used by file imports.
    pub async fn connect(
        profile: &ConnectionProfile,
        reader: Arc<dyn PointReader>,
        config: &LayeredConfig,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect(&profile.url())
            .await
            .map_err(|e| {
                CloudbenchError::Database(format!(
                    "Failed to connect to {}: {}",
                    profile.redacted(),
                    e
                ))
            })?;

        // Test connection by executing a simple query
        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| CloudbenchError::Database(format!("Connection test failed: {}", e)))?;

        tracing::debug!(database = %profile.redacted(), "connected to patch store");
        Ok(Self {
            pool,
            reader,
            patch_capacity: config.patch_capacity.value.max(1),
            fallback_srid: config.fallback_srid.value,
        })
    }

    /// Wrap an existing pool, for tests that manage their own connection
    pub fn from_pool(pool: PgPool, reader: Arc<dyn PointReader>, config: &LayeredConfig) -> Self {
        Self {
            pool,
            reader,
            patch_capacity: config.patch_capacity.value.max(1),
            fallback_srid: config.fallback_srid.value,
        }
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn reader(&self) -> Arc<dyn PointReader> {
        Arc::clone(&self.reader)
    }

    pub(crate) fn patch_capacity(&self) -> usize {
        self.patch_capacity
    }

    pub(crate) fn fallback_srid(&self) -> u32 {
        self.fallback_srid
    }

    /// Perform a health check on the database connection
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| CloudbenchError::Database(format!("Health check failed: {}", e)))?;
        Ok(())
    }
}

/// [`PatchStoreProvider`] that connects a [`PostgresStore`] per profile
pub struct PostgresProvider {
    reader: Arc<dyn PointReader>,
    config: LayeredConfig,
}

impl PostgresProvider {
    pub fn new(reader: Arc<dyn PointReader>, config: LayeredConfig) -> Self {
        Self { reader, config }
    }
}

#[async_trait]
impl PatchStoreProvider for PostgresProvider {
    async fn open(&self, profile: &ConnectionProfile) -> Result<Arc<dyn PatchStore>> {
        let store =
            PostgresStore::connect(profile, Arc::clone(&self.reader), &self.config).await?;
        Ok(Arc::new(store))
    }
}
