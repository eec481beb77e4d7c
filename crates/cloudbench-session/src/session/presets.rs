//! Saved batch presets and named connection profiles.
//!
//! Presets are validated against the tool registry on save, so a stored
//! preset replays cleanly later; applying one reuses the batch path.

use cloudbench_core::models::{BatchPreset, ConnectionProfile, StageSpec};
use cloudbench_core::{CloudbenchError, Result};
use uuid::Uuid;

use crate::events::LogLevel;

use super::Session;

impl Session {
    /// Validate and persist a batch preset. Every stage must name a
    /// batchable tool and build cleanly with its parameters.
    pub async fn save_preset(
        &self,
        name: &str,
        description: &str,
        stages: Vec<StageSpec>,
    ) -> Result<BatchPreset> {
        for spec in &stages {
            let tool = self.inner.registry.get(&spec.tool_name)?;
            if !tool.batchable {
                return Err(CloudbenchError::InvalidStageConfig {
                    reason: format!(
                        "'{}' is a single-shot tool and cannot run in a batch",
                        spec.tool_name
                    ),
                });
            }
            tool.build(&spec.params)?;
        }
        let preset = BatchPreset::new(name, description, stages);
        self.inner.presets.save_preset(&preset).await?;
        self.inner
            .log(LogLevel::Info, format!("Preset '{}' saved.", preset.name));
        Ok(preset)
    }

    pub async fn list_presets(&self) -> Result<Vec<BatchPreset>> {
        self.inner.presets.list_presets().await
    }

    pub async fn delete_preset(&self, id: Uuid) -> Result<()> {
        self.inner.presets.delete_preset(id).await
    }

    /// Run a stored preset against a layer as a batch
    pub async fn apply_preset(&self, key: &str, id: Uuid) -> Result<()> {
        let Some(preset) = self.inner.presets.get_preset(id).await? else {
            self.inner
                .log(LogLevel::Warning, format!("Preset not found: {}", id));
            return Ok(());
        };
        self.inner.log(
            LogLevel::Info,
            format!(
                "Applying preset '{}' ({} stages)...",
                preset.name,
                preset.stages.len()
            ),
        );
        self.apply_batch(key, &preset.stages).await
    }

    pub async fn save_profile(&self, profile: &ConnectionProfile) -> Result<()> {
        self.inner.profiles.save_profile(profile).await?;
        self.inner.log(
            LogLevel::Info,
            format!("Connection profile '{}' saved.", profile.name),
        );
        Ok(())
    }

    pub async fn get_profile(&self, name: &str) -> Result<Option<ConnectionProfile>> {
        self.inner.profiles.get_profile(name).await
    }

    pub async fn list_profiles(&self) -> Result<Vec<ConnectionProfile>> {
        self.inner.profiles.list_profiles().await
    }

    pub async fn delete_profile(&self, name: &str) -> Result<()> {
        self.inner.profiles.delete_profile(name).await
    }
}

#[cfg(test)]
mod tests {
    use cloudbench_core::config::LayeredConfig;
    use cloudbench_core::models::StageSpec;
    use cloudbench_core::CloudbenchError;
    use tokio::sync::mpsc::UnboundedReceiver;
    use uuid::Uuid;

    use crate::events::{LogLevel, SessionEvent};
    use crate::session::{Session, SessionDeps};

    fn test_session() -> (Session, UnboundedReceiver<SessionEvent>) {
        let config = LayeredConfig::with_defaults();
        let deps = SessionDeps::native(&config);
        Session::new(deps, &config)
    }

    #[tokio::test]
    async fn test_preset_round_trip() {
        let (session, _events) = test_session();
        let params = session
            .registry()
            .default_params("Decimation")
            .expect("builtin tool");
        let spec = StageSpec::new("Decimation", params);

        let saved = session
            .save_preset("Thin", "Every 4th point", vec![spec])
            .await
            .expect("preset should validate");
        let listed = session.list_presets().await.unwrap();
        assert!(listed.iter().any(|preset| preset.id == saved.id));

        session.delete_preset(saved.id).await.unwrap();
        assert!(session.list_presets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_preset_rejects_single_shot_tool() {
        let (session, _events) = test_session();
        let params = session
            .registry()
            .default_params("Crop")
            .expect("builtin tool");
        let spec = StageSpec::new("Crop", params);

        let err = session
            .save_preset("Clip", "", vec![spec])
            .await
            .expect_err("crop is not batchable");
        match err {
            CloudbenchError::InvalidStageConfig { reason } => {
                assert!(reason.contains("single-shot"), "got: {}", reason);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_save_preset_rejects_unknown_tool() {
        let (session, _events) = test_session();
        let spec = StageSpec::new("Imaginary Tool", Default::default());
        let err = session
            .save_preset("Broken", "", vec![spec])
            .await
            .expect_err("unknown tool must fail");
        assert!(matches!(err, CloudbenchError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_apply_missing_preset_warns_and_noops() {
        let (session, mut events) = test_session();
        session
            .apply_preset("anything", Uuid::new_v4())
            .await
            .expect("missing preset is not an error");

        let mut warned = false;
        while let Ok(event) = events.try_recv() {
            if let SessionEvent::Log {
                level: LogLevel::Warning,
                message,
            } = event
            {
                warned |= message.contains("Preset not found");
            }
        }
        assert!(warned);
    }

    #[tokio::test]
    async fn test_profile_round_trip() {
        let (session, _events) = test_session();
        let profile = cloudbench_core::models::ConnectionProfile {
            name: "survey".to_string(),
            host: "localhost".to_string(),
            port: 5432,
            dbname: "lidar".to_string(),
            user: "scan".to_string(),
            password: "pw".to_string(),
        };
        session.save_profile(&profile).await.unwrap();
        let fetched = session.get_profile("survey").await.unwrap();
        assert_eq!(fetched.as_ref().map(|p| p.host.as_str()), Some("localhost"));

        session.delete_profile("survey").await.unwrap();
        assert!(session.get_profile("survey").await.unwrap().is_none());
    }
}
