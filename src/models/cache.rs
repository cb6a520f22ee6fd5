//! HuggingFace cache detection utilities
//!
//! Resolves hosted models that are already present in the local hub cache.
//! Cache structure:
//! ```text
//! ~/.cache/huggingface/hub/
//! └── models--opentunesai--melodymaster-v1/
//!     ├── snapshots/
//!     │   └── {revision}/
//!     │       ├── config.json
//!     │       ├── model.safetensors
//!     │       └── preprocessor_config.json
//!     └── refs/
//!         └── main
//! ```

use std::path::{Path, PathBuf};

/// Get the HuggingFace home directory
///
/// Checks in order:
/// 1. `$HF_HOME`
/// 2. `$XDG_CACHE_HOME/huggingface`
/// 3. `~/.cache/huggingface`
pub fn get_hf_home() -> PathBuf {
    if let Ok(hf_home) = std::env::var("HF_HOME") {
        return PathBuf::from(hf_home);
    }

    if let Ok(xdg_cache) = std::env::var("XDG_CACHE_HOME") {
        return PathBuf::from(xdg_cache).join("huggingface");
    }

    dirs::home_dir()
        .map(|h| h.join(".cache/huggingface"))
        .unwrap_or_else(|| PathBuf::from("/tmp/huggingface"))
}

/// Get the hub download cache directory (`$HF_HUB_CACHE` or `{HF_HOME}/hub`)
pub fn get_cache_dir() -> PathBuf {
    std::env::var("HF_HUB_CACHE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| get_hf_home().join("hub"))
}

/// Whether `HF_HUB_OFFLINE` asks us to stay off the network
pub fn is_offline() -> bool {
    std::env::var("HF_HUB_OFFLINE")
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "yes"))
        .unwrap_or(false)
}

/// Convert model ID to cache directory name
///
/// e.g., "opentunesai/melodymaster-v1" -> "models--opentunesai--melodymaster-v1"
fn model_id_to_cache_name(model_id: &str) -> String {
    format!("models--{}", model_id.replace('/', "--"))
}

/// Get the snapshot directory for a cached model under `cache_dir`
///
/// Prefers the revision `refs/main` points at, then any snapshot holding a
/// `config.json`.
pub fn get_model_cache_path_in(cache_dir: &Path, model_id: &str) -> Option<PathBuf> {
    let model_dir = cache_dir.join(model_id_to_cache_name(model_id));

    let refs_main = model_dir.join("refs/main");
    if let Ok(revision) = std::fs::read_to_string(&refs_main) {
        let snapshot_path = model_dir.join("snapshots").join(revision.trim());
        if snapshot_path.join("config.json").exists() {
            return Some(snapshot_path);
        }
    }

    let entries = std::fs::read_dir(model_dir.join("snapshots")).ok()?;
    entries
        .flatten()
        .map(|entry| entry.path())
        .find(|path| path.join("config.json").exists())
}
