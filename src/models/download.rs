//! Model download functionality using hf-hub
//!
//! Fetches a hosted checkpoint (config, weights, processor files) into the
//! standard HuggingFace cache so it can be validated like a local directory.

use super::metadata::PROCESSOR_FILES;
use crate::config::HubConfig;
use crate::error::{Error, Result};
use hf_hub::api::tokio::{Api, ApiBuilder, ApiError, ApiRepo};
use std::path::PathBuf;

/// Build an hf-hub client for the configured endpoint, token and cache
pub fn build_api(hub: &HubConfig) -> Result<Api> {
    let mut builder = ApiBuilder::from_env()
        .with_progress(false)
        .with_endpoint(hub.endpoint.clone())
        .with_token(hub.token.clone());

    if let Some(dir) = &hub.cache_dir {
        builder = builder.with_cache_dir(dir.clone());
    }

    builder
        .build()
        .map_err(|e| Error::Load(format!("Failed to create HF API client: {}", e)))
}

/// Whether the hub answered 404 for the requested file
fn is_not_found(err: &ApiError) -> bool {
    match err {
        ApiError::RequestError(e) => e.status().map(|s| s.as_u16()) == Some(404),
        _ => false,
    }
}

/// Download a model and its processor to the hub cache
///
/// # Returns
/// * `Ok(PathBuf)` - Path to the downloaded model's snapshot directory
/// * `Err(Error::Load)` - config.json or the weights could not be fetched
pub async fn download_model_to_cache(model_id: &str, hub: &HubConfig) -> Result<PathBuf> {
    tracing::info!(model_id = %model_id, cache_dir = ?hub.cache_dir, "Starting model download via hf-hub");

    let api = build_api(hub)?;
    let repo = api.model(model_id.to_string());

    let config_path = repo
        .get("config.json")
        .await
        .map_err(|e| Error::Load(format!("Failed to download config.json for {}: {}", model_id, e)))?;

    // Try to download model weights - safetensors preferred, fall back to pytorch
    let weight_files = [
        "model.safetensors",
        "model.safetensors.index.json",
        "pytorch_model.bin",
        "pytorch_model.bin.index.json",
    ];

    let mut downloaded_weights = false;
    for file in &weight_files {
        match repo.get(file).await {
            Ok(_) => {
                tracing::debug!(model_id = %model_id, file = %file, "Downloaded weight file");
                downloaded_weights = true;

                if file.ends_with(".index.json") {
                    download_sharded_weights(&repo, model_id, file).await?;
                }
                break;
            }
            Err(e) if is_not_found(&e) => continue,
            Err(e) => {
                return Err(Error::Load(format!(
                    "Failed to download {} for {}: {}",
                    file, model_id, e
                )));
            }
        }
    }

    if !downloaded_weights {
        return Err(Error::Load(format!(
            "No weight files found in hub repository {}",
            model_id
        )));
    }

    // Optional files; the loader decides whether what arrived is enough
    for file in ["generation_config.json"].iter().chain(PROCESSOR_FILES) {
        if repo.get(file).await.is_ok() {
            tracing::debug!(model_id = %model_id, file = %file, "Downloaded optional file");
        }
    }

    config_path
        .parent()
        .map(|p| p.to_path_buf())
        .ok_or_else(|| {
            Error::Load(format!(
                "Model downloaded but snapshot path not found for {}",
                model_id
            ))
        })
}

/// Download sharded weight files referenced in an index file
async fn download_sharded_weights(repo: &ApiRepo, model_id: &str, index_file: &str) -> Result<()> {
    let index_path = repo
        .get(index_file)
        .await
        .map_err(|e| Error::Load(format!("Failed to get index file: {}", e)))?;

    let index_content = tokio::fs::read_to_string(&index_path).await?;
    let index: serde_json::Value = serde_json::from_str(&index_content)
        .map_err(|e| Error::Load(format!("Failed to parse index file: {}", e)))?;

    if let Some(weight_map) = index.get("weight_map").and_then(|v| v.as_object()) {
        let shards: std::collections::BTreeSet<&str> =
            weight_map.values().filter_map(|v| v.as_str()).collect();

        tracing::info!(
            model_id = %model_id,
            shard_count = shards.len(),
            "Downloading sharded weights"
        );

        for shard in shards {
            tracing::debug!(model_id = %model_id, shard = %shard, "Downloading shard");
            repo.get(shard)
                .await
                .map_err(|e| Error::Load(format!("Failed to download shard {}: {}", shard, e)))?;
        }
    }

    Ok(())
}
