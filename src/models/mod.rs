//! Model management module
//!
//! Provides functionality for:
//! - Resolving hosted models in the HuggingFace cache
//! - Downloading models from HuggingFace Hub
//! - Parsing model and processor metadata
//! - Validating that a checkpoint's artifacts load

pub mod cache;
pub mod download;
pub mod loader;
pub mod metadata;

pub use cache::{get_cache_dir, get_hf_home, get_model_cache_path_in};
pub use download::download_model_to_cache;
pub use loader::{LoadedModel, ModelLoader, ModelSource};
pub use metadata::{ModelMetadata, ProcessorMetadata, parse_model_config, parse_processor_config};
