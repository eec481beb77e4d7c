//! In-memory storage implementations for development and testing.
//!
//! These implementations use `RwLock::unwrap()` intentionally. Lock poisoning
//! only occurs when another thread panicked while holding the lock, which is
//! an unrecoverable state. Batch presets additionally have a PostgreSQL
//! backend; connection profiles live only in memory for the host's lifetime.

use async_trait::async_trait;
use cloudbench_core::error::Result;
use cloudbench_core::models::{BatchPreset, ConnectionProfile};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::ports::{PresetStore, ProfileStore};

/// In-memory implementation of PresetStore
#[derive(Debug, Clone, Default)]
pub struct MemoryPresetStore {
    presets: Arc<RwLock<HashMap<Uuid, BatchPreset>>>,
}

impl MemoryPresetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PresetStore for MemoryPresetStore {
    async fn save_preset(&self, preset: &BatchPreset) -> Result<()> {
        let mut presets = self.presets.write().unwrap();
        presets.insert(preset.id, preset.clone());
        Ok(())
    }

    async fn get_preset(&self, id: Uuid) -> Result<Option<BatchPreset>> {
        let presets = self.presets.read().unwrap();
        Ok(presets.get(&id).cloned())
    }

    async fn list_presets(&self) -> Result<Vec<BatchPreset>> {
        let presets = self.presets.read().unwrap();
        let mut all: Vec<BatchPreset> = presets.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(all)
    }

    async fn delete_preset(&self, id: Uuid) -> Result<()> {
        let mut presets = self.presets.write().unwrap();
        presets.remove(&id);
        Ok(())
    }
}

/// In-memory implementation of ProfileStore
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    profiles: Arc<RwLock<HashMap<String, ConnectionProfile>>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn save_profile(&self, profile: &ConnectionProfile) -> Result<()> {
        let mut profiles = self.profiles.write().unwrap();
        profiles.insert(profile.name.clone(), profile.clone());
        Ok(())
    }

    async fn get_profile(&self, name: &str) -> Result<Option<ConnectionProfile>> {
        let profiles = self.profiles.read().unwrap();
        Ok(profiles.get(name).cloned())
    }

    async fn list_profiles(&self) -> Result<Vec<ConnectionProfile>> {
        let profiles = self.profiles.read().unwrap();
        let mut all: Vec<ConnectionProfile> = profiles.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }

    async fn delete_profile(&self, name: &str) -> Result<()> {
        let mut profiles = self.profiles.write().unwrap();
        profiles.remove(name);
        Ok(())
    }
}
