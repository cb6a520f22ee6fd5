//! Model and processor metadata parsing
//!
//! Parses `config.json` and the processor/tokenizer configuration files of a
//! text-to-music checkpoint. A file that exists but fails to parse is a load
//! error: the checkpoint would not load in the inference stack either.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Model metadata extracted from config.json
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ModelMetadata {
    /// Architecture family (e.g., "musicgen")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_type: Option<String>,

    /// Model classes the checkpoint was saved from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub architectures: Vec<String>,

    /// Output sample rate of the audio codec
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<u32>,

    /// Number of parallel codebooks predicted by the decoder
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_codebooks: Option<u32>,

    /// Decoder vocabulary size
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vocab_size: Option<u32>,

    /// Number of decoder layers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub num_hidden_layers: Option<u32>,
}

/// Raw config.json structure (partial)
#[derive(Debug, Deserialize)]
struct RawConfig {
    model_type: Option<String>,
    #[serde(default)]
    architectures: Vec<String>,
    sampling_rate: Option<u32>,
    vocab_size: Option<u32>,
    num_hidden_layers: Option<u32>,
    num_codebooks: Option<u32>,
    // Composite text-to-audio checkpoints nest the sub-model configs
    audio_encoder: Option<RawSubConfig>,
    decoder: Option<RawSubConfig>,
}

#[derive(Debug, Deserialize)]
struct RawSubConfig {
    sampling_rate: Option<u32>,
    vocab_size: Option<u32>,
    num_hidden_layers: Option<u32>,
    num_codebooks: Option<u32>,
}

/// Parse model metadata from a snapshot directory's config.json
pub fn parse_model_config(model_dir: &Path) -> Result<ModelMetadata> {
    let config_path = model_dir.join("config.json");

    if !config_path.exists() {
        return Err(Error::load_at(model_dir, "config.json not found"));
    }

    let content = std::fs::read_to_string(&config_path)?;
    let raw: RawConfig = serde_json::from_str(&content)
        .map_err(|e| Error::load_at(&config_path, format!("invalid JSON: {}", e)))?;

    if raw.model_type.is_none() && raw.architectures.is_empty() {
        return Err(Error::load_at(
            &config_path,
            "neither model_type nor architectures is set",
        ));
    }

    let decoder = raw.decoder.as_ref();
    Ok(ModelMetadata {
        model_type: raw.model_type,
        architectures: raw.architectures,
        sampling_rate: raw
            .audio_encoder
            .as_ref()
            .and_then(|a| a.sampling_rate)
            .or(raw.sampling_rate),
        num_codebooks: decoder.and_then(|d| d.num_codebooks).or(raw.num_codebooks),
        vocab_size: decoder.and_then(|d| d.vocab_size).or(raw.vocab_size),
        num_hidden_layers: decoder
            .and_then(|d| d.num_hidden_layers)
            .or(raw.num_hidden_layers),
    })
}

/// Files that make up a processor (feature extractor + tokenizer)
pub const PROCESSOR_FILES: &[&str] = &[
    "preprocessor_config.json",
    "processor_config.json",
    "tokenizer.json",
    "tokenizer_config.json",
    "special_tokens_map.json",
    "spiece.model",
    "vocab.json",
    "merges.txt",
];

/// Processor metadata merged from the processor's JSON config files
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ProcessorMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processor_class: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_extractor_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokenizer_class: Option<String>,

    /// Expected input sample rate of the feature extractor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampling_rate: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding_side: Option<String>,

    /// Processor files found in the directory, in [`PROCESSOR_FILES`] order
    pub files: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawProcessorConfig {
    processor_class: Option<String>,
    feature_extractor_type: Option<String>,
    tokenizer_class: Option<String>,
    sampling_rate: Option<u32>,
    padding_side: Option<String>,
}

/// Parse processor metadata from a snapshot directory
///
/// At least one of `preprocessor_config.json`, `tokenizer_config.json` or
/// `tokenizer.json` must be present. Every JSON file present must parse.
pub fn parse_processor_config(model_dir: &Path) -> Result<ProcessorMetadata> {
    let files: Vec<String> = PROCESSOR_FILES
        .iter()
        .filter(|f| model_dir.join(f).is_file())
        .map(|f| f.to_string())
        .collect();

    let has_entry_point = files.iter().any(|f| {
        matches!(
            f.as_str(),
            "preprocessor_config.json" | "tokenizer_config.json" | "tokenizer.json"
        )
    });
    if !has_entry_point {
        return Err(Error::load_at(
            model_dir,
            "no processor found (expected preprocessor_config.json or tokenizer files)",
        ));
    }

    let mut metadata = ProcessorMetadata {
        files,
        ..Default::default()
    };

    let json_files: Vec<String> = metadata
        .files
        .iter()
        .filter(|f| f.ends_with(".json"))
        .cloned()
        .collect();

    for file in &json_files {
        let path = model_dir.join(file);
        let content = std::fs::read_to_string(&path)?;

        // tokenizer.json is large and has no processor-level keys; only check it parses
        if file == "tokenizer.json" || file == "vocab.json" || file == "special_tokens_map.json" {
            serde_json::from_str::<serde_json::Value>(&content)
                .map_err(|e| Error::load_at(&path, format!("invalid JSON: {}", e)))?;
            continue;
        }

        let raw: RawProcessorConfig = serde_json::from_str(&content)
            .map_err(|e| Error::load_at(&path, format!("invalid JSON: {}", e)))?;
        metadata.processor_class = metadata.processor_class.or(raw.processor_class);
        metadata.feature_extractor_type = metadata
            .feature_extractor_type
            .or(raw.feature_extractor_type);
        metadata.tokenizer_class = metadata.tokenizer_class.or(raw.tokenizer_class);
        metadata.sampling_rate = metadata.sampling_rate.or(raw.sampling_rate);
        metadata.padding_side = metadata.padding_side.or(raw.padding_side);
    }

    Ok(metadata)
}
