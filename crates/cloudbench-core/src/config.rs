use crate::error::{CloudbenchError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::Path;

/// Configuration source for tracking where values come from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigSource {
    /// Default value
    Default,
    /// Loaded from config file
    File,
    /// Loaded from environment variable
    Environment,
    /// Set by the embedding host (settings dialog, service flags)
    Host,
}

impl ConfigSource {
    /// Returns the precedence level (higher = higher priority)
    pub fn precedence(&self) -> u8 {
        match self {
            ConfigSource::Default => 0,
            ConfigSource::File => 1,
            ConfigSource::Environment => 2,
            ConfigSource::Host => 3,
        }
    }
}

/// A configuration value with its source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigValue<T> {
    pub value: T,
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    pub fn new(value: T, source: ConfigSource) -> Self {
        Self { value, source }
    }

    /// Update the value if the new source has higher precedence
    pub fn update(&mut self, value: T, source: ConfigSource) {
        if source.precedence() > self.source.precedence() {
            self.value = value;
            self.source = source;
        }
    }
}

/// Layered configuration for CloudBench
#[derive(Debug, Clone)]
pub struct LayeredConfig {
    /// Ceiling on points handed to the renderer per layer
    pub max_visible_points: ConfigValue<usize>,
    /// Cached full-resolution stage outputs kept per layer
    pub stage_cache_capacity: ConfigValue<usize>,
    /// Points per pgpointcloud patch when writing to the database
    pub patch_capacity: ConfigValue<usize>,
    /// SRID assumed when a source declares no CRS
    pub fallback_srid: ConfigValue<u32>,
}

impl LayeredConfig {
    /// Create a new configuration with default values
    pub fn with_defaults() -> Self {
        Self {
            max_visible_points: ConfigValue::new(1_000_000, ConfigSource::Default),
            stage_cache_capacity: ConfigValue::new(2, ConfigSource::Default),
            patch_capacity: ConfigValue::new(1000, ConfigSource::Default),
            fallback_srid: ConfigValue::new(4326, ConfigSource::Default),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(mut self, path: P) -> Result<Self> {
        let content =
            fs::read_to_string(path.as_ref()).map_err(|e| CloudbenchError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to read config file: {}", e),
            })?;

        let file_config: FileConfig =
            toml::from_str(&content).map_err(|e| CloudbenchError::ConfigInvalid {
                key: "file".to_string(),
                reason: format!("Failed to parse TOML: {}", e),
            })?;

        // Update values from file
        if let Some(max_visible_points) = file_config.max_visible_points {
            validate_nonzero("max_visible_points", max_visible_points)?;
            self.max_visible_points
                .update(max_visible_points, ConfigSource::File);
        }

        if let Some(stage_cache_capacity) = file_config.stage_cache_capacity {
            self.stage_cache_capacity
                .update(stage_cache_capacity, ConfigSource::File);
        }

        if let Some(patch_capacity) = file_config.patch_capacity {
            validate_nonzero("patch_capacity", patch_capacity)?;
            self.patch_capacity
                .update(patch_capacity, ConfigSource::File);
        }

        if let Some(fallback_srid) = file_config.fallback_srid {
            self.fallback_srid.update(fallback_srid, ConfigSource::File);
        }

        Ok(self)
    }

    /// Load configuration from environment variables
    pub fn load_from_env(mut self) -> Self {
        // CLOUDBENCH_MAX_VISIBLE_POINTS
        if let Ok(points_str) = env::var("CLOUDBENCH_MAX_VISIBLE_POINTS") {
            match points_str.parse::<usize>() {
                Ok(points) if points > 0 => self
                    .max_visible_points
                    .update(points, ConfigSource::Environment),
                _ => tracing::warn!(
                    "Invalid CLOUDBENCH_MAX_VISIBLE_POINTS value '{}': expected positive integer",
                    points_str
                ),
            }
        }

        // CLOUDBENCH_STAGE_CACHE_CAPACITY
        if let Ok(capacity_str) = env::var("CLOUDBENCH_STAGE_CACHE_CAPACITY") {
            match capacity_str.parse::<usize>() {
                Ok(capacity) => self
                    .stage_cache_capacity
                    .update(capacity, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid CLOUDBENCH_STAGE_CACHE_CAPACITY value '{}': expected integer",
                    capacity_str
                ),
            }
        }

        // CLOUDBENCH_PATCH_CAPACITY
        if let Ok(capacity_str) = env::var("CLOUDBENCH_PATCH_CAPACITY") {
            match capacity_str.parse::<usize>() {
                Ok(capacity) if capacity > 0 => {
                    self.patch_capacity.update(capacity, ConfigSource::Environment)
                }
                _ => tracing::warn!(
                    "Invalid CLOUDBENCH_PATCH_CAPACITY value '{}': expected positive integer",
                    capacity_str
                ),
            }
        }

        // CLOUDBENCH_FALLBACK_SRID
        if let Ok(srid_str) = env::var("CLOUDBENCH_FALLBACK_SRID") {
            match srid_str.parse::<u32>() {
                Ok(srid) => self.fallback_srid.update(srid, ConfigSource::Environment),
                Err(_) => tracing::warn!(
                    "Invalid CLOUDBENCH_FALLBACK_SRID value '{}': expected integer SRID",
                    srid_str
                ),
            }
        }

        self
    }

    /// Update configuration from host-supplied overrides
    pub fn update_from_host(&mut self, overrides: HostConfigOverrides) {
        if let Some(max_visible_points) = overrides.max_visible_points {
            self.max_visible_points
                .update(max_visible_points, ConfigSource::Host);
        }

        if let Some(stage_cache_capacity) = overrides.stage_cache_capacity {
            self.stage_cache_capacity
                .update(stage_cache_capacity, ConfigSource::Host);
        }

        if let Some(patch_capacity) = overrides.patch_capacity {
            self.patch_capacity.update(patch_capacity, ConfigSource::Host);
        }

        if let Some(fallback_srid) = overrides.fallback_srid {
            self.fallback_srid.update(fallback_srid, ConfigSource::Host);
        }
    }

    /// Get all configuration values as a map for inspection
    pub fn to_inspection_map(&self) -> HashMap<String, (String, ConfigSource)> {
        let mut map = HashMap::new();

        map.insert(
            "max_visible_points".to_string(),
            (
                self.max_visible_points.value.to_string(),
                self.max_visible_points.source,
            ),
        );

        map.insert(
            "stage_cache_capacity".to_string(),
            (
                self.stage_cache_capacity.value.to_string(),
                self.stage_cache_capacity.source,
            ),
        );

        map.insert(
            "patch_capacity".to_string(),
            (
                self.patch_capacity.value.to_string(),
                self.patch_capacity.source,
            ),
        );

        map.insert(
            "fallback_srid".to_string(),
            (
                format!("EPSG:{}", self.fallback_srid.value),
                self.fallback_srid.source,
            ),
        );

        map
    }
}

/// Configuration loaded from TOML file
#[derive(Debug, Deserialize, Serialize)]
struct FileConfig {
    max_visible_points: Option<usize>,
    stage_cache_capacity: Option<usize>,
    patch_capacity: Option<usize>,
    fallback_srid: Option<u32>,
}

/// Host configuration overrides
#[derive(Debug, Default)]
pub struct HostConfigOverrides {
    pub max_visible_points: Option<usize>,
    pub stage_cache_capacity: Option<usize>,
    pub patch_capacity: Option<usize>,
    pub fallback_srid: Option<u32>,
}

fn validate_nonzero(key: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(CloudbenchError::ConfigInvalid {
            key: key.to_string(),
            reason: "value must be greater than zero".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = LayeredConfig::with_defaults();
        assert_eq!(config.max_visible_points.value, 1_000_000);
        assert_eq!(config.max_visible_points.source, ConfigSource::Default);
        assert_eq!(config.stage_cache_capacity.value, 2);
        assert_eq!(config.patch_capacity.value, 1000);
        assert_eq!(config.fallback_srid.value, 4326);
    }

    #[test]
    fn test_config_precedence() {
        let mut value = ConfigValue::new(100, ConfigSource::Default);

        // File should override default
        value.update(200, ConfigSource::File);
        assert_eq!(value.value, 200);
        assert_eq!(value.source, ConfigSource::File);

        // Environment should override file
        value.update(300, ConfigSource::Environment);
        assert_eq!(value.value, 300);
        assert_eq!(value.source, ConfigSource::Environment);

        // Host should override environment
        value.update(400, ConfigSource::Host);
        assert_eq!(value.value, 400);
        assert_eq!(value.source, ConfigSource::Host);

        // Lower precedence should not override
        value.update(500, ConfigSource::File);
        assert_eq!(value.value, 400);
        assert_eq!(value.source, ConfigSource::Host);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
max_visible_points = 250000
stage_cache_capacity = 4
patch_capacity = 600
fallback_srid = 32635
"#
        )
        .unwrap();

        let config = LayeredConfig::with_defaults()
            .load_from_file(file.path())
            .unwrap();

        assert_eq!(config.max_visible_points.value, 250_000);
        assert_eq!(config.max_visible_points.source, ConfigSource::File);
        assert_eq!(config.stage_cache_capacity.value, 4);
        assert_eq!(config.patch_capacity.value, 600);
        assert_eq!(config.fallback_srid.value, 32635);
    }

    #[test]
    fn test_zero_ceiling_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "max_visible_points = 0").unwrap();

        let result = LayeredConfig::with_defaults().load_from_file(file.path());
        assert!(matches!(
            result,
            Err(CloudbenchError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn test_host_overrides() {
        let mut config = LayeredConfig::with_defaults();

        let overrides = HostConfigOverrides {
            max_visible_points: Some(500_000),
            stage_cache_capacity: None,
            patch_capacity: Some(400),
            fallback_srid: None,
        };

        config.update_from_host(overrides);

        assert_eq!(config.max_visible_points.value, 500_000);
        assert_eq!(config.max_visible_points.source, ConfigSource::Host);
        assert_eq!(config.patch_capacity.value, 400);
        assert_eq!(config.patch_capacity.source, ConfigSource::Host);
        // These should still be defaults
        assert_eq!(config.stage_cache_capacity.source, ConfigSource::Default);
        assert_eq!(config.fallback_srid.source, ConfigSource::Default);
    }

    #[test]
    #[serial]
    fn test_load_from_env() {
        std::env::set_var("CLOUDBENCH_MAX_VISIBLE_POINTS", "750000");
        std::env::set_var("CLOUDBENCH_FALLBACK_SRID", "25832");

        let config = LayeredConfig::with_defaults().load_from_env();

        assert_eq!(config.max_visible_points.value, 750_000);
        assert_eq!(config.max_visible_points.source, ConfigSource::Environment);
        assert_eq!(config.fallback_srid.value, 25832);

        std::env::remove_var("CLOUDBENCH_MAX_VISIBLE_POINTS");
        std::env::remove_var("CLOUDBENCH_FALLBACK_SRID");
    }

    #[test]
    #[serial]
    fn test_invalid_env_value_ignored() {
        std::env::set_var("CLOUDBENCH_MAX_VISIBLE_POINTS", "not-a-number");

        let config = LayeredConfig::with_defaults().load_from_env();
        assert_eq!(config.max_visible_points.value, 1_000_000);
        assert_eq!(config.max_visible_points.source, ConfigSource::Default);

        std::env::remove_var("CLOUDBENCH_MAX_VISIBLE_POINTS");
    }

    #[test]
    fn test_inspection_map() {
        let config = LayeredConfig::with_defaults();
        let map = config.to_inspection_map();

        assert!(map.contains_key("max_visible_points"));
        assert!(map.contains_key("stage_cache_capacity"));
        assert!(map.contains_key("patch_capacity"));
        assert!(map.contains_key("fallback_srid"));

        let (srid_value, srid_source) = &map["fallback_srid"];
        assert_eq!(srid_value, "EPSG:4326");
        assert_eq!(*srid_source, ConfigSource::Default);
    }
}
