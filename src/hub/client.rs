//! HTTP client for the model hub's REST API

use super::commit::{CommitFile, FileSource, PreparedFile, UploadMode, build_commit_payload};
use super::lfs::{
    BatchAction, BatchRequest, BatchResponse, LFS_MEDIA_TYPE, LfsPointer, MAX_BASIC_TRANSFER_SIZE,
};
use super::{CommitInfo, ModelHub};
use crate::config::HubConfig;
use crate::error::{Error, Result};
use crate::metrics;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;

/// Branch every commit and tag targets
const DEFAULT_REVISION: &str = "main";

/// Hub REST client
///
/// API calls carry `timeout`; LFS object transfers do not, since a
/// multi-gigabyte weight file can legitimately take longer.
pub struct HubClient {
    endpoint: String,
    token: Option<String>,
    timeout: Duration,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct PreuploadResponse {
    files: Vec<PreuploadFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreuploadFile {
    path: String,
    upload_mode: UploadMode,
    #[serde(default)]
    should_ignore: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CommitResponse {
    commit_oid: Option<String>,
    commit_url: Option<String>,
}

impl HubClient {
    /// Create a new hub client
    pub fn new(hub: &HubConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("melodymaster/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Upload(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            endpoint: hub.endpoint.trim_end_matches('/').to_string(),
            token: hub.token.clone(),
            timeout,
            http,
        })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/api/{}", self.endpoint, path)
    }

    fn revision_path(repo_id: &str, action: &str) -> String {
        format!(
            "models/{}/{}/{}",
            repo_id,
            action,
            urlencoding::encode(DEFAULT_REVISION)
        )
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    /// Ask the hub which files must go through LFS
    ///
    /// Returns files paired with their mode; files the hub ignores are dropped.
    async fn preupload(
        &self,
        repo_id: &str,
        files: Vec<PreparedFile>,
    ) -> Result<Vec<(PreparedFile, UploadMode)>> {
        let body = json!({
            "files": files.iter().map(|f| json!({
                "path": f.file.path_in_repo,
                "sample": f.sample,
                "size": f.size,
            })).collect::<Vec<_>>(),
        });

        let req = self
            .authorize(self.http.post(self.api_url(&Self::revision_path(repo_id, "preupload"))))
            .timeout(self.timeout)
            .json(&body);
        let resp: PreuploadResponse = send(req, "preupload").await?.json().await.map_err(|e| {
            Error::Upload(format!("preupload returned an unexpected body: {}", e))
        })?;

        let modes: HashMap<String, PreuploadFile> = resp
            .files
            .into_iter()
            .map(|f| (f.path.clone(), f))
            .collect();

        let mut classified = Vec::with_capacity(files.len());
        for file in files {
            let info = modes.get(&file.file.path_in_repo).ok_or_else(|| {
                Error::Upload(format!(
                    "preupload did not classify {}",
                    file.file.path_in_repo
                ))
            })?;
            if info.should_ignore {
                tracing::warn!(repo_id = %repo_id, path = %file.file.path_in_repo, "Hub ignores file, skipping");
                continue;
            }
            classified.push((file, info.upload_mode));
        }
        Ok(classified)
    }

    /// Upload LFS objects the hub does not already store
    async fn upload_lfs(&self, repo_id: &str, files: &[&PreparedFile]) -> Result<()> {
        let objects: Vec<LfsPointer> = files
            .iter()
            .map(|f| LfsPointer {
                oid: f.sha256.clone(),
                size: f.size,
            })
            .collect();
        if let Some((file, _)) = files
            .iter()
            .zip(&objects)
            .find(|(_, pointer)| !pointer.fits_basic_transfer())
        {
            return Err(Error::Upload(format!(
                "{} is {} bytes, over the {} byte limit of a single LFS upload",
                file.file.path_in_repo, file.size, MAX_BASIC_TRANSFER_SIZE
            )));
        }

        let url = format!("{}/{}.git/info/lfs/objects/batch", self.endpoint, repo_id);
        let req = self
            .authorize(self.http.post(url))
            .timeout(self.timeout)
            .header(ACCEPT, LFS_MEDIA_TYPE)
            .header(CONTENT_TYPE, LFS_MEDIA_TYPE)
            .json(&BatchRequest::upload(objects));
        let batch: BatchResponse = send(req, "LFS batch").await?.json().await.map_err(|e| {
            Error::Upload(format!("LFS batch returned an unexpected body: {}", e))
        })?;

        for object in batch.objects {
            if let Some(err) = object.error {
                return Err(Error::Upload(format!(
                    "LFS rejected object {}: {} ({})",
                    object.oid, err.message, err.code
                )));
            }

            let Some(actions) = object.actions else {
                tracing::debug!(oid = %object.oid, "LFS object already on the hub");
                continue;
            };

            let prepared = files
                .iter()
                .find(|f| f.sha256 == object.oid)
                .ok_or_else(|| {
                    Error::Upload(format!("LFS batch returned unknown object {}", object.oid))
                })?;

            if let Some(upload) = &actions.upload {
                tracing::info!(
                    repo_id = %repo_id,
                    path = %prepared.file.path_in_repo,
                    size = object.size,
                    "Uploading LFS object"
                );
                self.put_object(upload, prepared).await?;
                metrics::record_lfs_object(repo_id);
            }

            if let Some(verify) = &actions.verify {
                let mut req = self
                    .authorize(self.http.post(&verify.href))
                    .timeout(self.timeout)
                    .header(ACCEPT, LFS_MEDIA_TYPE)
                    .header(CONTENT_TYPE, LFS_MEDIA_TYPE);
                for (name, value) in &verify.header {
                    req = req.header(name, value);
                }
                let pointer = LfsPointer {
                    oid: object.oid.clone(),
                    size: object.size,
                };
                send(req.json(&pointer), "LFS verify").await?;
            }
        }

        Ok(())
    }

    /// PUT one object to the storage URL the batch call handed out
    async fn put_object(&self, action: &BatchAction, prepared: &PreparedFile) -> Result<()> {
        let body = match &prepared.file.source {
            FileSource::Path(path) => reqwest::Body::from(tokio::fs::File::open(path).await?),
            FileSource::Bytes(bytes) => reqwest::Body::from(bytes.clone()),
        };

        let mut req = self
            .http
            .put(&action.href)
            .header(CONTENT_LENGTH, prepared.size)
            .body(body);
        for (name, value) in &action.header {
            req = req.header(name, value);
        }

        send(req, "LFS upload").await?;
        Ok(())
    }
}

#[async_trait]
impl ModelHub for HubClient {
    async fn create_repo(&self, repo_id: &str, private: bool) -> Result<()> {
        let (organization, name) = match repo_id.split_once('/') {
            Some((org, name)) => (Some(org), name),
            None => (None, repo_id),
        };

        let mut body = json!({ "name": name, "type": "model", "private": private });
        if let Some(org) = organization {
            body["organization"] = json!(org);
        }

        let req = self
            .authorize(self.http.post(self.api_url("repos/create")))
            .timeout(self.timeout)
            .json(&body);
        let resp = req
            .send()
            .await
            .map_err(|e| Error::Upload(format!("create repo request failed: {}", e)))?;

        if resp.status() == StatusCode::CONFLICT {
            tracing::debug!(repo_id = %repo_id, "Repository already exists");
            return Ok(());
        }
        check(resp, "create repo").await?;
        tracing::info!(repo_id = %repo_id, private, "Created repository");
        Ok(())
    }

    async fn upload_files(
        &self,
        repo_id: &str,
        files: Vec<CommitFile>,
        summary: &str,
    ) -> Result<CommitInfo> {
        if files.is_empty() {
            return Err(Error::Upload(format!("nothing to commit to {}", repo_id)));
        }

        // Hashing reads every byte of the weights; keep it off the runtime threads
        let prepared = tokio::task::spawn_blocking(move || {
            files
                .into_iter()
                .map(PreparedFile::prepare)
                .collect::<Result<Vec<_>>>()
        })
        .await
        .map_err(|e| Error::Upload(format!("hashing task failed: {}", e)))??;

        let classified = self.preupload(repo_id, prepared).await?;
        if classified.is_empty() {
            return Err(Error::Upload(format!(
                "hub ignored every file in {:?} commit to {}",
                summary, repo_id
            )));
        }

        let lfs: Vec<&PreparedFile> = classified
            .iter()
            .filter(|(_, mode)| *mode == UploadMode::Lfs)
            .map(|(f, _)| f)
            .collect();
        if !lfs.is_empty() {
            self.upload_lfs(repo_id, &lfs).await?;
        }

        let payload = build_commit_payload(summary, "", &classified)?;
        let req = self
            .authorize(self.http.post(self.api_url(&Self::revision_path(repo_id, "commit"))))
            .timeout(self.timeout)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(payload);
        let resp: CommitResponse = match send(req, "commit").await?.json().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(repo_id = %repo_id, error = %e, "Commit response could not be parsed");
                CommitResponse::default()
            }
        };

        let bytes = classified.iter().map(|(f, _)| f.size).sum();
        metrics::record_commit(repo_id, classified.len(), bytes);
        tracing::info!(
            repo_id = %repo_id,
            files = classified.len(),
            lfs_files = lfs.len(),
            commit = ?resp.commit_oid,
            "Commit created"
        );

        Ok(CommitInfo {
            oid: resp.commit_oid,
            url: resp.commit_url,
            files: classified.len(),
        })
    }

    async fn read_file(&self, repo_id: &str, path: &str) -> Result<Option<Vec<u8>>> {
        let url = format!(
            "{}/{}/resolve/{}/{}",
            self.endpoint,
            repo_id,
            urlencoding::encode(DEFAULT_REVISION),
            path
        );
        let resp = self
            .authorize(self.http.get(url))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| Error::Upload(format!("download request failed: {}", e)))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let bytes = check(resp, "download")
            .await?
            .bytes()
            .await
            .map_err(|e| Error::Upload(format!("download body failed: {}", e)))?;
        Ok(Some(bytes.to_vec()))
    }

    async fn create_tag(&self, repo_id: &str, tag: &str, message: &str) -> Result<()> {
        let req = self
            .authorize(self.http.post(self.api_url(&Self::revision_path(repo_id, "tag"))))
            .timeout(self.timeout)
            .json(&json!({ "tag": tag, "message": message }));
        send(req, "create tag").await?;
        Ok(())
    }
}

async fn send(req: RequestBuilder, what: &str) -> Result<Response> {
    let resp = req
        .send()
        .await
        .map_err(|e| Error::Upload(format!("{} request failed: {}", what, e)))?;
    check(resp, what).await
}

async fn check(resp: Response, what: &str) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(Error::Upload(format!(
        "{} failed: HTTP {}: {}",
        what,
        status,
        body.trim()
    )))
}
