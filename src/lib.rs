//! MelodyMaster - model lifecycle tooling
//!
//! Three independent workflows around a text-to-music model: deploying a
//! trained checkpoint to a model hub, smoke-testing generation against a
//! fixed prompt set, and per-step validation hooks for training.

pub mod audio;
pub mod card;
pub mod config;
pub mod deploy;
pub mod error;
pub mod generation;
pub mod hub;
pub mod metrics;
pub mod models;
pub mod suite;
pub mod validation;

/// Named numeric metrics, ordered by name
pub type Metrics = std::collections::BTreeMap<String, f64>;

pub use audio::GeneratedAudio;
pub use config::{DeployConfig, HubConfig, TestConfig, ValidationConfig};
pub use deploy::{DeployReport, ModelDeployer};
pub use error::{Error, Result};
pub use generation::{InferenceBackend, ModelBackend, MusicModel};
pub use hub::{HubClient, ModelHub};
pub use models::{LoadedModel, ModelLoader};
pub use suite::{ModelTester, PromptOutcome, QualityMetrics, SuiteReport, TEST_PROMPTS};
pub use validation::{EarlyStoppingPolicy, ModelValidator, NeverStop, QualityScorer};
