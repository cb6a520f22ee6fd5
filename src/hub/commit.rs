//! Commit payloads for the hub's NDJSON commit endpoint
//!
//! A commit is a header line followed by one line per file. Small files are
//! inlined as base64; files the hub routes to LFS are referenced by their
//! SHA-256 object id after the content has been uploaded separately.

use crate::error::{Error, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};

/// Bytes of each file sent to the preupload endpoint for classification
const SAMPLE_SIZE: usize = 512;

/// Where a file's content comes from
#[derive(Debug, Clone, PartialEq)]
pub enum FileSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// A file to add (or overwrite) in a commit
#[derive(Debug, Clone, PartialEq)]
pub struct CommitFile {
    /// Destination path inside the repository
    pub path_in_repo: String,
    pub source: FileSource,
}

impl CommitFile {
    /// Commit `dir/name` to `name` at the repository root
    pub fn from_dir(dir: &Path, name: &str) -> Self {
        Self {
            path_in_repo: name.to_string(),
            source: FileSource::Path(dir.join(name)),
        }
    }

    pub fn from_bytes(path_in_repo: &str, bytes: Vec<u8>) -> Self {
        Self {
            path_in_repo: path_in_repo.to_string(),
            source: FileSource::Bytes(bytes),
        }
    }

    /// Read the whole file content
    pub fn read(&self) -> Result<Vec<u8>> {
        match &self.source {
            FileSource::Path(path) => std::fs::read(path).map_err(|e| {
                Error::Upload(format!("failed to read {}: {}", path.display(), e))
            }),
            FileSource::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// Upload route chosen by the hub for a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    Regular,
    Lfs,
}

/// A commit file with the facts the hub needs before accepting it
#[derive(Debug, Clone)]
pub struct PreparedFile {
    pub file: CommitFile,
    pub size: u64,
    /// Hex SHA-256 of the content, used as the LFS object id
    pub sha256: String,
    /// Base64 of the first bytes of the content
    pub sample: String,
}

impl PreparedFile {
    /// Hash and sample a file without holding it in memory
    pub fn prepare(file: CommitFile) -> Result<Self> {
        let mut hasher = Sha256::new();
        let mut sample = Vec::with_capacity(SAMPLE_SIZE);
        let mut size = 0u64;

        let mut feed = |chunk: &[u8]| {
            if sample.len() < SAMPLE_SIZE {
                let take = (SAMPLE_SIZE - sample.len()).min(chunk.len());
                sample.extend_from_slice(&chunk[..take]);
            }
            hasher.update(chunk);
            size += chunk.len() as u64;
        };

        match &file.source {
            FileSource::Bytes(bytes) => feed(bytes),
            FileSource::Path(path) => {
                let mut reader = std::fs::File::open(path).map_err(|e| {
                    Error::Upload(format!("failed to open {}: {}", path.display(), e))
                })?;
                let mut buf = vec![0u8; 1 << 20];
                loop {
                    let n = reader.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    feed(&buf[..n]);
                }
            }
        }

        Ok(Self {
            file,
            size,
            sha256: hex::encode(hasher.finalize()),
            sample: BASE64.encode(&sample),
        })
    }
}

/// Build the NDJSON body for a commit
///
/// `files` pairs each prepared file with the mode the preupload call
/// assigned it. LFS content must already be uploaded.
pub fn build_commit_payload(
    summary: &str,
    description: &str,
    files: &[(PreparedFile, UploadMode)],
) -> Result<String> {
    let mut lines = Vec::with_capacity(files.len() + 1);
    lines.push(json!({
        "key": "header",
        "value": { "summary": summary, "description": description },
    }));

    for (prepared, mode) in files {
        let line = match mode {
            UploadMode::Regular => json!({
                "key": "file",
                "value": {
                    "content": BASE64.encode(prepared.file.read()?),
                    "path": prepared.file.path_in_repo,
                    "encoding": "base64",
                },
            }),
            UploadMode::Lfs => json!({
                "key": "lfsFile",
                "value": {
                    "path": prepared.file.path_in_repo,
                    "algo": "sha256",
                    "oid": prepared.sha256,
                },
            }),
        };
        lines.push(line);
    }

    let mut body = String::new();
    for line in lines {
        body.push_str(&serde_json::to_string(&line)?);
        body.push('\n');
    }
    Ok(body)
}
