//! Text-to-music generation backends
//!
//! A [`ModelBackend`] turns a model path into a ready [`MusicModel`]. The
//! shipped backend validates the checkpoint locally, then generates through
//! an HTTP inference service that answers with WAV audio.

use crate::audio::{GeneratedAudio, decode_wav};
use crate::config::{HubConfig, TestConfig};
use crate::error::{Error, Result};
use crate::models::{LoadedModel, ModelLoader, ModelSource};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use serde::Serialize;
use std::time::Duration;

/// A loaded model that can generate audio from a text prompt
#[async_trait]
pub trait MusicModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<GeneratedAudio>;
}

/// Loads models for generation
#[async_trait]
pub trait ModelBackend: Send + Sync {
    async fn load(&self, model_path: &str) -> Result<Box<dyn MusicModel>>;
}

#[derive(Debug, Serialize)]
struct GenerationRequest<'a> {
    inputs: &'a str,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_new_tokens: Option<u32>,
}

/// Backend that validates checkpoints and generates over HTTP
pub struct InferenceBackend {
    loader: ModelLoader,
    hub: HubConfig,
    inference_url: Option<String>,
    max_new_tokens: Option<u32>,
    timeout: Duration,
    http: reqwest::Client,
}

impl InferenceBackend {
    pub fn new(config: &TestConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("melodymaster/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| Error::Generation(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            loader: ModelLoader::new(config.hub.clone()),
            hub: config.hub.clone(),
            inference_url: config.inference_url.clone(),
            max_new_tokens: config.max_new_tokens,
            timeout: Duration::from_secs(config.request_timeout_secs),
            http,
        })
    }

    /// Resolve where generation requests for `loaded` are sent
    fn generation_url(&self, loaded: &LoadedModel) -> Result<String> {
        if let Some(url) = &self.inference_url {
            return Ok(url.clone());
        }
        match &loaded.source {
            ModelSource::Hub { repo_id } => Ok(format!(
                "{}/models/{}",
                self.hub.inference_endpoint.trim_end_matches('/'),
                repo_id
            )),
            ModelSource::Local => Err(Error::Config(format!(
                "`inference_url` is required to generate with local model {}",
                loaded.path.display()
            ))),
        }
    }
}

#[async_trait]
impl ModelBackend for InferenceBackend {
    async fn load(&self, model_path: &str) -> Result<Box<dyn MusicModel>> {
        let loaded = self.loader.load(model_path).await?;
        let url = self.generation_url(&loaded)?;
        tracing::info!(model = %model_path, url = %url, "Model ready for generation");

        Ok(Box::new(HostedModel {
            url,
            token: self.hub.token.clone(),
            max_new_tokens: self.max_new_tokens,
            timeout: self.timeout,
            http: self.http.clone(),
        }))
    }
}

/// Model served by an inference endpoint
pub struct HostedModel {
    url: String,
    token: Option<String>,
    max_new_tokens: Option<u32>,
    timeout: Duration,
    http: reqwest::Client,
}

#[async_trait]
impl MusicModel for HostedModel {
    async fn generate(&self, prompt: &str) -> Result<GeneratedAudio> {
        let body = GenerationRequest {
            inputs: prompt,
            parameters: GenerationParameters {
                max_new_tokens: self.max_new_tokens,
            },
        };

        let mut req = self
            .http
            .post(&self.url)
            .header(ACCEPT, "audio/wav")
            .timeout(self.timeout)
            .json(&body);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| Error::Generation(format!("request failed: {}", e)))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Generation(format!("HTTP {}: {}", status, text)));
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| Error::Generation(format!("failed to read response: {}", e)))?;
        decode_wav(&bytes)
    }
}
