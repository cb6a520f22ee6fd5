//! Error types shared by the deploy, test and validate workflows

use std::path::Path;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type
///
/// Each workflow stage maps onto exactly one variant so callers can tell a
/// missing config key apart from a failed upload.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration file missing, unreadable, or invalid
    #[error("config: {0}")]
    Config(String),

    /// Model or processor artifacts could not be loaded
    #[error("load: {0}")]
    Load(String),

    /// A hub call (repository, commit, LFS transfer, tag) failed
    #[error("upload: {0}")]
    Upload(String),

    /// Generation for a prompt failed
    #[error("generation: {0}")]
    Generation(String),

    /// Quality evaluation was asked to summarize zero results
    #[error("no generation results to evaluate")]
    EmptyResults,

    /// I/O error
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Build a load error that names the offending path
    pub fn load_at(path: &Path, reason: impl std::fmt::Display) -> Self {
        Error::Load(format!("{}: {}", path.display(), reason))
    }

    /// Build a config error for a file that failed to parse
    pub fn config_at(path: &Path, reason: impl std::fmt::Display) -> Self {
        Error::Config(format!("{}: {}", path.display(), reason))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<hound::Error> for Error {
    fn from(err: hound::Error) -> Self {
        Error::Generation(format!("wav decode: {}", err))
    }
}
