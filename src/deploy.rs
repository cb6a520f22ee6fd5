//! Model deployment to the hub
//!
//! Validate local artifacts, commit the model, commit the processor, refresh
//! the model card and optionally tag a release. The first failing step ends
//! the run; commits that already landed stay on the hub.

use crate::card::{CARD_PATH, update_card};
use crate::config::DeployConfig;
use crate::error::{Error, Result};
use crate::hub::{CommitFile, CommitInfo, HubClient, ModelHub};
use crate::metrics;
use crate::models::{LoadedModel, ModelLoader};
use crate::Metrics;
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Timeout for hub API calls made during deployment
const HUB_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Commits produced by a successful deployment
#[derive(Debug, Clone)]
pub struct DeployReport {
    pub repo_id: String,
    pub model_commit: CommitInfo,
    pub processor_commit: CommitInfo,
    pub card_commit: CommitInfo,
    /// Tag created after the upload, if a release was requested
    pub release: Option<String>,
}

/// Pushes trained checkpoints to a hub repository
pub struct ModelDeployer {
    config: DeployConfig,
    hub: Arc<dyn ModelHub>,
    loader: ModelLoader,
}

impl ModelDeployer {
    /// Create a deployer that talks to the given hub
    pub fn new(config: DeployConfig, hub: Arc<dyn ModelHub>) -> Self {
        let loader = ModelLoader::new(config.hub.clone());
        Self {
            config,
            hub,
            loader,
        }
    }

    /// Create a deployer backed by the HTTP hub client
    pub fn from_config(config: DeployConfig) -> Result<Self> {
        let hub = HubClient::new(&config.hub, HUB_REQUEST_TIMEOUT)?;
        Ok(Self::new(config, Arc::new(hub)))
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    /// Check that the model and processor at `model_path` load
    pub fn validate_model(&self, model_path: &Path) -> Result<LoadedModel> {
        match self.loader.load_local(model_path) {
            Ok(loaded) => {
                tracing::info!(path = %model_path.display(), "Model validation successful");
                Ok(loaded)
            }
            Err(e) => {
                tracing::error!(path = %model_path.display(), error = %e, "Model validation failed");
                Err(e)
            }
        }
    }

    /// Write `metrics` into the repository's model card
    #[tracing::instrument(skip_all, fields(repo_id = %repo_id))]
    pub async fn update_model_card(&self, repo_id: &str, metrics: &Metrics) -> Result<CommitInfo> {
        tracing::info!("Updating model card");

        let existing = self
            .hub
            .read_file(repo_id, CARD_PATH)
            .await?
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

        let card = update_card(existing.as_deref(), repo_id, metrics, Utc::now());
        self.hub
            .upload_files(
                repo_id,
                vec![CommitFile::from_bytes(CARD_PATH, card.into_bytes())],
                "Update model card",
            )
            .await
    }

    /// Validate and upload a local checkpoint, then refresh the model card
    ///
    /// Nothing is sent to the hub when validation fails.
    #[tracing::instrument(skip_all, fields(repo_id = %repo_id))]
    pub async fn push_to_hub(
        &self,
        local_path: &Path,
        repo_id: &str,
        metrics: &Metrics,
    ) -> Result<DeployReport> {
        tracing::info!(local_path = %local_path.display(), "Starting deployment");

        let loaded = self.validate_model(local_path)?;

        self.hub.create_repo(repo_id, self.config.private).await?;

        let model_files = loaded
            .model_files
            .iter()
            .map(|f| CommitFile::from_dir(&loaded.path, f))
            .collect();
        let model_commit = self
            .hub
            .upload_files(repo_id, model_files, "Upload model")
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Model upload failed"))?;

        let processor_files = loaded
            .processor_files()
            .iter()
            .map(|f| CommitFile::from_dir(&loaded.path, f))
            .collect();
        let processor_commit = self
            .hub
            .upload_files(repo_id, processor_files, "Upload processor")
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Processor upload failed"))?;

        let card_commit = self
            .update_model_card(repo_id, metrics)
            .await
            .inspect_err(|e| tracing::error!(error = %e, "Failed to update model card"))?;

        tracing::info!("Successfully deployed");

        Ok(DeployReport {
            repo_id: repo_id.to_string(),
            model_commit,
            processor_commit,
            card_commit,
            release: None,
        })
    }

    /// Tag the repository head as `version`
    #[tracing::instrument(skip_all, fields(repo_id = %repo_id, version = %version))]
    pub async fn create_release(&self, repo_id: &str, version: &str) -> Result<()> {
        let message = format!("Release version {}", version);
        match self.hub.create_tag(repo_id, version, &message).await {
            Ok(()) => {
                metrics::record_release(repo_id, version);
                tracing::info!("Created release");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create release");
                Err(e)
            }
        }
    }

    /// Run the configured deployment: push, then release if requested
    pub async fn run(&self) -> Result<DeployReport> {
        let config = &self.config;
        let mut report = self
            .push_to_hub(&config.local_path, &config.repo_id, &config.metrics)
            .await?;

        if config.create_release {
            let version = config.version.as_deref().ok_or_else(|| {
                Error::Config("`version` is required when `create_release` is true".to_string())
            })?;
            self.create_release(&config.repo_id, version).await?;
            report.release = Some(version.to_string());
        }

        Ok(report)
    }
}
