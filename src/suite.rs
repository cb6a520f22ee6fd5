//! Generation test suite
//!
//! Runs a fixed prompt set through a model, records per-prompt outcomes and
//! summarizes them against the configured pass threshold.

use crate::config::TestConfig;
use crate::error::{Error, Result};
use crate::generation::{InferenceBackend, ModelBackend, MusicModel};
use crate::metrics;
use crate::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Prompts exercised by every suite run
pub const TEST_PROMPTS: &[&str] = &[
    "upbeat electronic dance music with synth",
    "peaceful piano melody with strings",
    "rock song with electric guitar",
    "jazz trio with piano bass and drums",
    "ambient soundscape with nature sounds",
];

/// Outcome of generating one prompt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptOutcome {
    pub success: bool,
    /// Samples along the time axis, present on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_length: Option<usize>,
    /// Error description, present on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PromptOutcome {
    pub fn succeeded(audio_length: usize) -> Self {
        Self {
            success: true,
            audio_length: Some(audio_length),
            error: None,
        }
    }

    pub fn failed(error: impl ToString) -> Self {
        Self {
            success: false,
            audio_length: None,
            error: Some(error.to_string()),
        }
    }
}

/// Summary over a set of prompt outcomes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityMetrics {
    pub success_rate: f64,
    /// Mean audio length of successful prompts; 0 when none succeeded
    pub avg_audio_length: f64,
}

impl QualityMetrics {
    pub fn to_metrics(&self) -> Metrics {
        Metrics::from([
            ("success_rate".to_string(), self.success_rate),
            ("avg_audio_length".to_string(), self.avg_audio_length),
        ])
    }
}

/// Result of a full suite run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub results: BTreeMap<String, PromptOutcome>,
    pub quality: QualityMetrics,
    pub passed: bool,
}

/// Summarize prompt outcomes
///
/// Fails with [`Error::EmptyResults`] when there is nothing to summarize.
pub fn evaluate_quality(results: &BTreeMap<String, PromptOutcome>) -> Result<QualityMetrics> {
    if results.is_empty() {
        return Err(Error::EmptyResults);
    }

    let lengths: Vec<usize> = results
        .values()
        .filter(|r| r.success)
        .filter_map(|r| r.audio_length)
        .collect();
    let successes = results.values().filter(|r| r.success).count();

    let avg_audio_length = if lengths.is_empty() {
        0.0
    } else {
        lengths.iter().sum::<usize>() as f64 / lengths.len() as f64
    };

    Ok(QualityMetrics {
        success_rate: successes as f64 / results.len() as f64,
        avg_audio_length,
    })
}

/// Runs the generation suite against one model at a time
pub struct ModelTester {
    config: TestConfig,
    backend: Box<dyn ModelBackend>,
    model: Option<Box<dyn MusicModel>>,
}

impl ModelTester {
    pub fn new(config: TestConfig, backend: Box<dyn ModelBackend>) -> Self {
        Self {
            config,
            backend,
            model: None,
        }
    }

    /// Tester that generates through the configured inference service
    pub fn from_config(config: TestConfig) -> Result<Self> {
        let backend = InferenceBackend::new(&config)?;
        Ok(Self::new(config, Box::new(backend)))
    }

    pub fn config(&self) -> &TestConfig {
        &self.config
    }

    /// Load the model under test, replacing any previous one
    pub async fn load_model(&mut self, model_path: &str) -> Result<()> {
        self.model = None;
        let model = self.backend.load(model_path).await?;
        self.model = Some(model);
        tracing::info!(model = %model_path, "Loaded model for testing");
        Ok(())
    }

    /// Generate every prompt, recording failures instead of stopping
    ///
    /// Duplicate prompts collapse to a single entry.
    pub async fn test_generation(&self, prompts: &[&str]) -> Result<BTreeMap<String, PromptOutcome>> {
        let model = self
            .model
            .as_ref()
            .ok_or_else(|| Error::Load("no model loaded".to_string()))?;

        let mut results = BTreeMap::new();
        for prompt in prompts {
            let outcome = match model.generate(prompt).await {
                Ok(audio) => {
                    tracing::debug!(prompt = %prompt, audio_length = audio.len(), "Generated");
                    PromptOutcome::succeeded(audio.len())
                }
                Err(e) => {
                    tracing::error!(prompt = %prompt, error = %e, "Generation failed");
                    PromptOutcome::failed(e)
                }
            };
            metrics::record_generation(outcome.success);
            results.insert(prompt.to_string(), outcome);
        }

        Ok(results)
    }

    /// See [`evaluate_quality`]
    pub fn evaluate_quality(&self, results: &BTreeMap<String, PromptOutcome>) -> Result<QualityMetrics> {
        evaluate_quality(results)
    }

    /// Load `model_path`, run [`TEST_PROMPTS`] and compare to the threshold
    #[tracing::instrument(skip(self))]
    pub async fn run_test_suite(&mut self, model_path: &str) -> Result<SuiteReport> {
        self.load_model(model_path).await?;

        let results = self.test_generation(TEST_PROMPTS).await?;
        let quality = self.evaluate_quality(&results)?;
        let passed = quality.success_rate >= self.config.minimum_success_rate;

        metrics::update_success_rate(quality.success_rate);
        tracing::info!(
            success_rate = quality.success_rate,
            avg_audio_length = quality.avg_audio_length,
            minimum_success_rate = self.config.minimum_success_rate,
            passed,
            "Test suite finished"
        );

        Ok(SuiteReport {
            results,
            quality,
            passed,
        })
    }
}
