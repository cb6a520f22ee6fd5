//! Model card (README.md) rendering
//!
//! The metrics live in a marked section so repeated deployments replace
//! their own table and leave hand-written card content alone.

use crate::Metrics;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Path of the model card inside a repository
pub const CARD_PATH: &str = "README.md";

const METRICS_START: &str = "<!-- melodymaster-metrics:start -->";
const METRICS_END: &str = "<!-- melodymaster-metrics:end -->";

#[derive(Debug, Serialize)]
struct CardMetadata {
    library_name: &'static str,
    pipeline_tag: &'static str,
    tags: Vec<&'static str>,
}

impl Default for CardMetadata {
    fn default() -> Self {
        Self {
            library_name: "transformers",
            pipeline_tag: "text-to-audio",
            tags: vec!["music", "text-to-music", "melodymaster"],
        }
    }
}

/// Render the marked metrics section
pub fn render_metrics_section(metrics: &Metrics, updated: DateTime<Utc>) -> String {
    let mut out = String::new();
    out.push_str(METRICS_START);
    out.push_str("\n## Evaluation results\n\n");

    if metrics.is_empty() {
        out.push_str("No metrics reported.\n");
    } else {
        out.push_str("| Metric | Value |\n|---|---|\n");
        for (name, value) in metrics {
            out.push_str(&format!("| {} | {} |\n", name.replace('|', "\\|"), value));
        }
    }

    out.push_str(&format!(
        "\n_Last updated: {}_\n",
        updated.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    out.push_str(METRICS_END);
    out.push('\n');
    out
}

/// Render a fresh model card for a repository that has none
pub fn render_card(repo_id: &str, metrics: &Metrics, updated: DateTime<Utc>) -> String {
    // Serializing a fixed struct of strings cannot fail
    let front_matter = serde_yaml::to_string(&CardMetadata::default()).unwrap_or_default();
    let name = repo_id.rsplit('/').next().unwrap_or(repo_id);

    format!(
        "---\n{}---\n\n# {}\n\nText-to-music generation model.\n\n{}",
        front_matter,
        name,
        render_metrics_section(metrics, updated)
    )
}

/// Produce the new card content given the current one, if any
///
/// An existing metrics section is replaced in place; a card without one
/// gets the section appended.
pub fn update_card(
    existing: Option<&str>,
    repo_id: &str,
    metrics: &Metrics,
    updated: DateTime<Utc>,
) -> String {
    let section = render_metrics_section(metrics, updated);

    let Some(existing) = existing else {
        return render_card(repo_id, metrics, updated);
    };

    if let Some(start) = existing.find(METRICS_START)
        && let Some(end_rel) = existing[start..].find(METRICS_END)
    {
        let mut end = start + end_rel + METRICS_END.len();
        if existing[end..].starts_with('\n') {
            end += 1;
        }
        return format!("{}{}{}", &existing[..start], section, &existing[end..]);
    }

    let mut card = existing.trim_end().to_string();
    card.push_str("\n\n");
    card.push_str(&section);
    card
}
