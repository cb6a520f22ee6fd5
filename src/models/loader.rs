//! Model loader for artifact validation
//!
//! Loads a checkpoint directory the way the inference stack would see it:
//! the model config must parse, weights must be present and readable, and a
//! processor must be loadable. Hosted models are first fetched into the hub
//! cache.

use super::cache::{get_cache_dir, get_model_cache_path_in, is_offline};
use super::download::download_model_to_cache;
use super::metadata::{ModelMetadata, ProcessorMetadata, parse_model_config, parse_processor_config};
use crate::config::{HubConfig, validate_repo_id};
use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

/// Model config files committed alongside the weights
pub const MODEL_CONFIG_FILES: &[&str] = &["config.json", "generation_config.json"];

/// Largest safetensors header accepted (matches the format's own limit)
const MAX_SAFETENSORS_HEADER: u64 = 100 * 1024 * 1024;

/// Where a loaded model came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// A directory on the local filesystem
    Local,
    /// A hub repository, resolved to a cache snapshot
    Hub { repo_id: String },
}

/// A checkpoint whose model and processor artifacts both loaded
#[derive(Debug, Clone)]
pub struct LoadedModel {
    /// Directory holding the artifacts
    pub path: PathBuf,
    pub source: ModelSource,
    pub metadata: ModelMetadata,
    pub processor: ProcessorMetadata,
    /// Model files relative to `path`: configs, weights, shard index
    pub model_files: Vec<String>,
}

impl LoadedModel {
    /// Processor files relative to `path`
    pub fn processor_files(&self) -> &[String] {
        &self.processor.files
    }
}

/// Loads and validates model checkpoints
pub struct ModelLoader {
    hub: HubConfig,
}

impl ModelLoader {
    /// Create a loader that resolves hosted models through `hub`
    pub fn new(hub: HubConfig) -> Self {
        Self { hub }
    }

    /// Load a model from a local directory or a hub repository id
    pub async fn load(&self, model_path: &str) -> Result<LoadedModel> {
        let local = Path::new(model_path);
        if local.is_dir() {
            return self.load_local(local);
        }

        validate_repo_id(model_path).map_err(|_| {
            Error::Load(format!(
                "{} is neither a local directory nor a hub repository id",
                model_path
            ))
        })?;

        let snapshot = if is_offline() {
            let cache_dir = self.hub.cache_dir.clone().unwrap_or_else(get_cache_dir);
            get_model_cache_path_in(&cache_dir, model_path).ok_or_else(|| {
                Error::Load(format!(
                    "{} is not in the hub cache and HF_HUB_OFFLINE is set",
                    model_path
                ))
            })?
        } else {
            download_model_to_cache(model_path, &self.hub).await?
        };

        let mut loaded = self.load_local(&snapshot)?;
        loaded.source = ModelSource::Hub {
            repo_id: model_path.to_string(),
        };
        Ok(loaded)
    }

    /// Load and validate the artifacts in a local directory
    pub fn load_local(&self, dir: &Path) -> Result<LoadedModel> {
        if !dir.is_dir() {
            return Err(Error::load_at(dir, "not a directory"));
        }

        let metadata = parse_model_config(dir)?;
        let weights = find_weight_files(dir)?;
        let processor = parse_processor_config(dir)?;

        let mut model_files: Vec<String> = MODEL_CONFIG_FILES
            .iter()
            .filter(|f| dir.join(f).is_file())
            .map(|f| f.to_string())
            .collect();
        model_files.extend(weights);

        tracing::info!(
            path = %dir.display(),
            model_type = ?metadata.model_type,
            files = model_files.len() + processor.files.len(),
            "Model and processor loaded"
        );

        Ok(LoadedModel {
            path: dir.to_path_buf(),
            source: ModelSource::Local,
            metadata,
            processor,
            model_files,
        })
    }
}

/// Locate and check the weight files of a checkpoint
///
/// Safetensors is preferred over pickled PyTorch weights. Sharded
/// checkpoints return the index followed by every shard it references.
fn find_weight_files(dir: &Path) -> Result<Vec<String>> {
    if dir.join("model.safetensors").is_file() {
        check_safetensors(&dir.join("model.safetensors"))?;
        return Ok(vec!["model.safetensors".to_string()]);
    }

    if dir.join("model.safetensors.index.json").is_file() {
        let shards = read_shard_index(dir, "model.safetensors.index.json")?;
        for shard in &shards {
            check_safetensors(&dir.join(shard))?;
        }
        return Ok(std::iter::once("model.safetensors.index.json".to_string())
            .chain(shards)
            .collect());
    }

    if dir.join("pytorch_model.bin").is_file() {
        check_non_empty(&dir.join("pytorch_model.bin"))?;
        return Ok(vec!["pytorch_model.bin".to_string()]);
    }

    if dir.join("pytorch_model.bin.index.json").is_file() {
        let shards = read_shard_index(dir, "pytorch_model.bin.index.json")?;
        for shard in &shards {
            check_non_empty(&dir.join(shard))?;
        }
        return Ok(std::iter::once("pytorch_model.bin.index.json".to_string())
            .chain(shards)
            .collect());
    }

    Err(Error::load_at(dir, "no weight files found"))
}

/// Read the unique shard file names from a weight index, sorted
pub(crate) fn read_shard_index(dir: &Path, index_file: &str) -> Result<Vec<String>> {
    let index_path = dir.join(index_file);
    let content = std::fs::read_to_string(&index_path)?;
    let index: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| Error::load_at(&index_path, format!("invalid JSON: {}", e)))?;

    let weight_map = index
        .get("weight_map")
        .and_then(|v| v.as_object())
        .ok_or_else(|| Error::load_at(&index_path, "missing weight_map"))?;

    let shards: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str())
        .map(|s| s.to_string())
        .collect();

    if shards.is_empty() {
        return Err(Error::load_at(&index_path, "weight_map is empty"));
    }
    // A shard must be a plain file name inside the checkpoint directory
    if let Some(outside) = shards.iter().find(|s| {
        let mut components = Path::new(s.as_str()).components();
        !matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        )
    }) {
        return Err(Error::load_at(
            &index_path,
            format!("shard {} escapes the checkpoint directory", outside),
        ));
    }
    if let Some(missing) = shards.iter().find(|s| !dir.join(s).is_file()) {
        return Err(Error::load_at(
            &index_path,
            format!("shard {} is missing", missing),
        ));
    }

    Ok(shards.into_iter().collect())
}

/// Check a safetensors file header: little-endian u64 length, then a JSON object
fn check_safetensors(path: &Path) -> Result<()> {
    let mut file = std::fs::File::open(path).map_err(|e| Error::load_at(path, e))?;
    let file_len = file.metadata()?.len();

    let mut len_bytes = [0u8; 8];
    file.read_exact(&mut len_bytes)
        .map_err(|_| Error::load_at(path, "truncated safetensors header"))?;
    let header_len = u64::from_le_bytes(len_bytes);

    if header_len == 0 || header_len > MAX_SAFETENSORS_HEADER || header_len > file_len - 8 {
        return Err(Error::load_at(
            path,
            format!("invalid safetensors header length {}", header_len),
        ));
    }

    let mut header = vec![0u8; header_len as usize];
    file.read_exact(&mut header)
        .map_err(|_| Error::load_at(path, "truncated safetensors header"))?;

    let parsed: serde_json::Value = serde_json::from_slice(&header)
        .map_err(|e| Error::load_at(path, format!("invalid safetensors header: {}", e)))?;
    if !parsed.is_object() {
        return Err(Error::load_at(path, "safetensors header is not an object"));
    }

    Ok(())
}

fn check_non_empty(path: &Path) -> Result<()> {
    let len = std::fs::metadata(path)
        .map_err(|e| Error::load_at(path, e))?
        .len();
    if len == 0 {
        return Err(Error::load_at(path, "weight file is empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn loader() -> ModelLoader {
        ModelLoader::new(HubConfig::default())
    }

    fn safetensors_bytes(header: &str) -> Vec<u8> {
        let mut bytes = (header.len() as u64).to_le_bytes().to_vec();
        bytes.extend_from_slice(header.as_bytes());
        bytes.extend_from_slice(&[0u8; 16]);
        bytes
    }

    fn write_checkpoint(dir: &Path) {
        std::fs::write(dir.join("config.json"), r#"{"model_type": "musicgen"}"#).unwrap();
        std::fs::write(
            dir.join("model.safetensors"),
            safetensors_bytes(r#"{"w":{"dtype":"F32","shape":[4],"data_offsets":[0,16]}}"#),
        )
        .unwrap();
        std::fs::write(
            dir.join("preprocessor_config.json"),
            r#"{"sampling_rate": 32000}"#,
        )
        .unwrap();
    }

    #[test]
    fn test_load_local_checkpoint() {
        let dir = TempDir::new().unwrap();
        write_checkpoint(dir.path());
        std::fs::write(dir.path().join("generation_config.json"), "{}").unwrap();

        let loaded = loader().load_local(dir.path()).unwrap();
        assert_eq!(loaded.source, ModelSource::Local);
        assert_eq!(
            loaded.model_files,
            vec!["config.json", "generation_config.json", "model.safetensors"]
        );
        assert_eq!(loaded.processor_files(), ["preprocessor_config.json"]);
    }

    #[test]
    fn test_load_local_missing_dir() {
        let err = loader()
            .load_local(Path::new("/nonexistent/model-12345"))
            .unwrap_err();
        assert!(matches!(err, Error::Load(_)));
    }

    #[test]
    fn test_no_weights() {
        let dir = TempDir::new().unwrap();
        write_checkpoint(dir.path());
        std::fs::remove_file(dir.path().join("model.safetensors")).unwrap();

        let err = loader().load_local(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no weight files found"));
    }

    #[test]
    fn test_missing_processor() {
        let dir = TempDir::new().unwrap();
        write_checkpoint(dir.path());
        std::fs::remove_file(dir.path().join("preprocessor_config.json")).unwrap();

        let err = loader().load_local(dir.path()).unwrap_err();
        assert!(err.to_string().contains("no processor found"));
    }

    #[test]
    fn test_corrupt_safetensors() {
        let dir = TempDir::new().unwrap();
        write_checkpoint(dir.path());
        std::fs::write(dir.path().join("model.safetensors"), b"garbage!garbage!").unwrap();

        let err = loader().load_local(dir.path()).unwrap_err();
        assert!(err.to_string().contains("safetensors"), "{}", err);
    }

    #[test]
    fn test_truncated_safetensors() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("model.safetensors"), [1u8, 2, 3]).unwrap();
        assert!(check_safetensors(&dir.path().join("model.safetensors")).is_err());
    }

    #[test]
    fn test_sharded_checkpoint() {
        let dir = TempDir::new().unwrap();
        write_checkpoint(dir.path());
        std::fs::remove_file(dir.path().join("model.safetensors")).unwrap();
        for shard in ["model-00001-of-00002.safetensors", "model-00002-of-00002.safetensors"] {
            std::fs::write(dir.path().join(shard), safetensors_bytes("{}")).unwrap();
        }
        std::fs::write(
            dir.path().join("model.safetensors.index.json"),
            r#"{"metadata": {}, "weight_map": {
                "a": "model-00001-of-00002.safetensors",
                "b": "model-00002-of-00002.safetensors",
                "c": "model-00001-of-00002.safetensors"
            }}"#,
        )
        .unwrap();

        let loaded = loader().load_local(dir.path()).unwrap();
        assert_eq!(
            loaded.model_files,
            vec![
                "config.json",
                "model.safetensors.index.json",
                "model-00001-of-00002.safetensors",
                "model-00002-of-00002.safetensors",
            ]
        );
    }

    #[test]
    fn test_sharded_checkpoint_missing_shard() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("model.safetensors.index.json"),
            r#"{"weight_map": {"a": "model-00001-of-00002.safetensors"}}"#,
        )
        .unwrap();

        let err = read_shard_index(dir.path(), "model.safetensors.index.json").unwrap_err();
        assert!(err.to_string().contains("is missing"));
    }

    #[test]
    fn test_shard_outside_checkpoint_rejected() {
        let root = TempDir::new().unwrap();
        let ckpt = root.path().join("ckpt");
        std::fs::create_dir(&ckpt).unwrap();
        std::fs::write(root.path().join("secret.bin"), b"not a shard").unwrap();
        let absolute = root.path().join("secret.bin").to_string_lossy().to_string();

        for shard in ["../secret.bin", absolute.as_str()] {
            std::fs::write(
                ckpt.join("pytorch_model.bin.index.json"),
                serde_json::json!({"weight_map": {"a": shard}}).to_string(),
            )
            .unwrap();

            let err = read_shard_index(&ckpt, "pytorch_model.bin.index.json").unwrap_err();
            assert!(matches!(err, Error::Load(_)));
            assert!(err.to_string().contains("escapes the checkpoint directory"), "{}", err);
        }
    }

    #[test]
    fn test_nested_shard_rejected() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/model-00001.safetensors"), b"x").unwrap();
        std::fs::write(
            dir.path().join("model.safetensors.index.json"),
            r#"{"weight_map": {"a": "sub/model-00001.safetensors"}}"#,
        )
        .unwrap();

        assert!(read_shard_index(dir.path(), "model.safetensors.index.json").is_err());
    }

    #[test]
    fn test_pytorch_weights_fallback() {
        let dir = TempDir::new().unwrap();
        write_checkpoint(dir.path());
        std::fs::remove_file(dir.path().join("model.safetensors")).unwrap();
        std::fs::write(dir.path().join("pytorch_model.bin"), b"PK\x03\x04").unwrap();

        let loaded = loader().load_local(dir.path()).unwrap();
        assert!(loaded.model_files.contains(&"pytorch_model.bin".to_string()));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_path() {
        let err = loader().load("not a path/or/repo").await.unwrap_err();
        assert!(err.to_string().contains("neither a local directory"));
    }

    #[tokio::test]
    async fn test_load_local_directory_via_load() {
        let dir = TempDir::new().unwrap();
        write_checkpoint(dir.path());
        let path = dir.path().to_string_lossy().to_string();
        let loaded = loader().load(&path).await.unwrap();
        assert_eq!(loaded.source, ModelSource::Local);
    }
}
