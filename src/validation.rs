//! Per-step validation hooks for training
//!
//! Only the audio length is measured out of the box. Quality scores come
//! from registered [`QualityScorer`]s and the stop decision from an
//! [`EarlyStoppingPolicy`]; the defaults register no scorer and never stop.

use crate::audio::GeneratedAudio;
use crate::config::ValidationConfig;
use crate::metrics;
use crate::Metrics;

/// Scores one generated sample; returns named metrics to merge
pub trait QualityScorer: Send + Sync {
    fn score(&self, audio: &GeneratedAudio, prompt: &str) -> Metrics;
}

/// Decides whether training should stop after a validation step
pub trait EarlyStoppingPolicy: Send + Sync {
    fn should_stop(&mut self, metrics: &Metrics, step: u64) -> bool;
}

/// Policy that never stops training
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverStop;

impl EarlyStoppingPolicy for NeverStop {
    fn should_stop(&mut self, _metrics: &Metrics, _step: u64) -> bool {
        false
    }
}

pub struct ModelValidator {
    config: ValidationConfig,
    scorers: Vec<Box<dyn QualityScorer>>,
    early_stopping: Box<dyn EarlyStoppingPolicy>,
}

impl ModelValidator {
    pub fn new(config: ValidationConfig) -> Self {
        tracing::debug!(keys = config.len(), "Validator configured");
        Self {
            config,
            scorers: Vec::new(),
            early_stopping: Box::new(NeverStop),
        }
    }

    pub fn with_scorer(mut self, scorer: Box<dyn QualityScorer>) -> Self {
        self.scorers.push(scorer);
        self
    }

    pub fn with_early_stopping(mut self, policy: Box<dyn EarlyStoppingPolicy>) -> Self {
        self.early_stopping = policy;
        self
    }

    pub fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Metrics for one generated sample at `step`
    pub fn validate_batch(&self, audio: &GeneratedAudio, prompt: &str, step: u64) -> Metrics {
        let mut result = Metrics::from([("audio_length".to_string(), audio.len() as f64)]);
        for scorer in &self.scorers {
            result.extend(scorer.score(audio, prompt));
        }

        metrics::record_validation_step(step);
        tracing::info!(step, prompt = %prompt, metrics = ?result, "Validation metrics");
        result
    }

    pub fn check_early_stopping(&mut self, metrics: &Metrics, step: u64) -> bool {
        let stop = self.early_stopping.should_stop(metrics, step);
        if stop {
            tracing::info!(step, "Early stopping triggered");
        }
        stop
    }
}
