//! Model hub client
//!
//! Provides functionality for:
//! - Creating model repositories
//! - Committing files (inline for small files, Git LFS for large ones)
//! - Tagging releases

pub mod client;
pub mod commit;
pub mod lfs;

pub use client::HubClient;
pub use commit::{CommitFile, FileSource, PreparedFile, UploadMode};

use crate::error::Result;
use async_trait::async_trait;

/// Result of a successful commit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitInfo {
    pub oid: Option<String>,
    pub url: Option<String>,
    /// Files included in the commit
    pub files: usize,
}

/// Write operations against a hosted model repository
///
/// Each call is attempted once; there are no retries.
#[async_trait]
pub trait ModelHub: Send + Sync {
    /// Create the repository, succeeding if it already exists
    async fn create_repo(&self, repo_id: &str, private: bool) -> Result<()>;

    /// Commit `files` to the default branch in a single commit
    async fn upload_files(
        &self,
        repo_id: &str,
        files: Vec<CommitFile>,
        summary: &str,
    ) -> Result<CommitInfo>;

    /// Read a file from the default branch; `None` if it does not exist
    async fn read_file(&self, repo_id: &str, path: &str) -> Result<Option<Vec<u8>>>;

    /// Tag the current head of the default branch
    async fn create_tag(&self, repo_id: &str, tag: &str, message: &str) -> Result<()>;
}
