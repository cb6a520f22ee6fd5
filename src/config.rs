//! Configuration structures and loading logic
//!
//! Every workflow reads one YAML document. Required keys have no serde
//! default, so a missing key fails at load time with an error naming it.

use crate::error::{Error, Result};
use crate::models::cache::get_hf_home;
use crate::Metrics;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default config path for `melodymaster deploy`
pub const DEFAULT_DEPLOY_CONFIG: &str = "deploy_config.yaml";
/// Default config path for `melodymaster test`
pub const DEFAULT_TEST_CONFIG: &str = "test_config.yaml";
/// Default config path for `melodymaster validate` (the training config)
pub const DEFAULT_VALIDATION_CONFIG: &str = "../training/config.yaml";
/// Hosted model exercised by the test suite unless overridden
pub const DEFAULT_TEST_MODEL: &str = "opentunesai/melodymaster-v1";

/// Connection settings for the model hub, shared by all workflows
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HubConfig {
    /// Hub base URL
    pub endpoint: String,

    /// Base URL of the hosted inference service
    pub inference_endpoint: String,

    /// Access token. Never written back out.
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Override for the local hub download cache
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            endpoint: default_hub_endpoint(),
            inference_endpoint: default_inference_endpoint(),
            token: None,
            cache_dir: None,
        }
    }
}

impl HubConfig {
    /// Apply `HF_ENDPOINT` / `HF_TOKEN` overrides, then fall back to the
    /// token file written by `huggingface-cli login`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(endpoint) = std::env::var("HF_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Ok(token) = std::env::var("HF_TOKEN") {
            self.token = Some(token);
        }
        if self.token.is_none() {
            self.token = read_token_file(&get_hf_home().join("token"));
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (key, url) in [
            ("hub.endpoint", &self.endpoint),
            ("hub.inference_endpoint", &self.inference_endpoint),
        ] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(Error::Config(format!(
                    "`{}` must be an http(s) URL (got {:?})",
                    key, url
                )));
            }
        }
        Ok(())
    }
}

fn read_token_file(path: &Path) -> Option<String> {
    let token = std::fs::read_to_string(path).ok()?;
    let token = token.trim();
    (!token.is_empty()).then(|| token.to_string())
}

/// Configuration for `melodymaster deploy`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeployConfig {
    /// Directory holding the trained model and processor files
    pub local_path: PathBuf,
    /// Target repository, `namespace/name` or a bare `name`
    pub repo_id: String,
    /// Metrics published on the model card
    pub metrics: Metrics,

    #[serde(default)]
    pub create_release: bool,

    /// Release tag. Required when `create_release` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// Visibility used if the repository has to be created
    #[serde(default)]
    pub private: bool,

    #[serde(default)]
    pub hub: HubConfig,
}

impl DeployConfig {
    /// Load from a YAML file with environment variable overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = read_yaml(path)?;
        config.hub.apply_env_overrides();
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        validate_repo_id(&self.repo_id)?;

        if self.create_release {
            match self.version.as_deref() {
                None => {
                    return Err(Error::Config(
                        "`version` is required when `create_release` is true".to_string(),
                    ));
                }
                Some(v) if v.trim().is_empty() || v.contains(char::is_whitespace) => {
                    return Err(Error::Config(format!("invalid release version {:?}", v)));
                }
                Some(_) => {}
            }
        }

        if let Some((name, value)) = self.metrics.iter().find(|(_, v)| !v.is_finite()) {
            return Err(Error::Config(format!(
                "metric '{}' must be a finite number (got {})",
                name, value
            )));
        }

        self.hub.validate()
    }
}

/// Configuration for `melodymaster test`
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TestConfig {
    /// Fraction of prompts that must generate without error, in `[0, 1]`
    pub minimum_success_rate: f64,

    #[serde(default = "default_test_model")]
    pub model_path: String,

    /// Full generation URL. Defaults to `{inference_endpoint}/models/{repo_id}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inference_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub hub: HubConfig,
}

impl TestConfig {
    /// Load from a YAML file with environment variable overrides
    pub fn load(path: &Path) -> Result<Self> {
        let mut config: Self = read_yaml(path)?;
        config.hub.apply_env_overrides();
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.minimum_success_rate) {
            return Err(Error::Config(format!(
                "`minimum_success_rate` must be within [0, 1] (got {})",
                self.minimum_success_rate
            )));
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "`request_timeout_secs` must be greater than zero".to_string(),
            ));
        }
        if self.model_path.trim().is_empty() {
            return Err(Error::Config("`model_path` cannot be empty".to_string()));
        }
        self.hub.validate()
    }
}

/// Training configuration consumed by `melodymaster validate`
///
/// Kept as an opaque document; no key is interpreted yet.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(transparent)]
pub struct ValidationConfig {
    pub training: serde_yaml::Value,
}

impl ValidationConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let config: Self = read_yaml(path)?;
        match config.training {
            serde_yaml::Value::Mapping(_) | serde_yaml::Value::Null => Ok(config),
            _ => Err(Error::config_at(path, "training config must be a mapping")),
        }
    }

    /// Number of top-level keys in the training config
    pub fn len(&self) -> usize {
        self.training.as_mapping().map_or(0, |m| m.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config_at(path, format!("failed to read config file: {}", e)))?;
    serde_yaml::from_str(&content).map_err(|e| Error::config_at(path, e))
}

/// Check a hub repository id: `name` or `namespace/name`
pub fn validate_repo_id(repo_id: &str) -> Result<()> {
    let parts: Vec<&str> = repo_id.split('/').collect();
    let valid = (1..=2).contains(&parts.len())
        && parts.iter().all(|p| {
            !p.is_empty()
                && p.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        });
    if valid {
        Ok(())
    } else {
        Err(Error::Config(format!("invalid repo_id {:?}", repo_id)))
    }
}

// Default functions
fn default_hub_endpoint() -> String {
    "https://huggingface.co".to_string()
}
fn default_inference_endpoint() -> String {
    "https://api-inference.huggingface.co".to_string()
}
fn default_test_model() -> String {
    DEFAULT_TEST_MODEL.to_string()
}
fn default_request_timeout() -> u64 {
    300
}
