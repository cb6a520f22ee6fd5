//! Prometheus metrics
//!
//! The CLI runs to completion, so instead of serving a scrape endpoint the
//! recorder is rendered once at exit (see `--metrics-out`).

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;

/// Setup Prometheus metrics recorder
/// Returns a handle that can be used to render collected metrics
pub fn setup_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install Prometheus recorder: {}", e))?;

    tracing::debug!("Prometheus metrics recorder installed");

    Ok(handle)
}

/// Write the current metrics snapshot in Prometheus text format
pub fn write_snapshot(handle: &PrometheusHandle, path: &Path) -> Result<()> {
    std::fs::write(path, handle.render())
        .map_err(|e| anyhow::anyhow!("Failed to write metrics to {:?}: {}", path, e))?;
    tracing::info!(path = ?path, "Metrics snapshot written");
    Ok(())
}

/// Record a commit pushed to a hub repository
pub fn record_commit(repo_id: &str, files: usize, bytes: u64) {
    metrics::counter!("melodymaster_hub_commits_total",
        "repo" => repo_id.to_string()
    )
    .increment(1);
    metrics::counter!("melodymaster_hub_files_uploaded_total",
        "repo" => repo_id.to_string()
    )
    .increment(files as u64);
    metrics::counter!("melodymaster_hub_bytes_uploaded_total",
        "repo" => repo_id.to_string()
    )
    .increment(bytes);
}

/// Record an LFS object transferred to storage
pub fn record_lfs_object(repo_id: &str) {
    metrics::counter!("melodymaster_hub_lfs_objects_total",
        "repo" => repo_id.to_string()
    )
    .increment(1);
}

/// Record a release tag
pub fn record_release(repo_id: &str, version: &str) {
    metrics::counter!("melodymaster_releases_total",
        "repo" => repo_id.to_string(),
        "version" => version.to_string()
    )
    .increment(1);
}

/// Record the outcome of one prompt's generation
pub fn record_generation(success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!("melodymaster_generations_total",
        "outcome" => outcome
    )
    .increment(1);
}

/// Update the success rate gauge after a test suite run
pub fn update_success_rate(rate: f64) {
    metrics::gauge!("melodymaster_test_success_rate").set(rate);
}

/// Record the training step of the latest validation pass
pub fn record_validation_step(step: u64) {
    metrics::gauge!("melodymaster_validation_step").set(step as f64);
}
