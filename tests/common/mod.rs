//! In-process fake hub and inference servers for integration tests

#![allow(dead_code)]

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::io::Cursor;
use std::path::Path as FsPath;
use std::sync::{Arc, Mutex};

pub const TEST_TOKEN: &str = "test-token";

/// Paths the fake hub's preupload marks as ignored
pub const IGNORED_SUFFIX: &str = ".ignored";

/// Commits with this summary get a plain-text reply instead of JSON
pub const PLAIN_TEXT_COMMIT: &str = "Plain text reply";

/// Everything the fake hub has been asked to do
#[derive(Debug, Default)]
pub struct HubRecord {
    pub created_repos: Vec<Value>,
    pub existing_repos: Vec<String>,
    /// (repo, summary, committed paths)
    pub commits: Vec<(String, String, Vec<String>)>,
    /// Files on the main branch, per repo
    pub files: HashMap<(String, String), Vec<u8>>,
    pub lfs_store: HashMap<String, Vec<u8>>,
    pub lfs_puts: usize,
    pub lfs_verified: Vec<String>,
    pub tags: Vec<(String, String, String)>,
    pub auth_headers: Vec<String>,
}

#[derive(Clone)]
pub struct FakeHub {
    pub base: String,
    pub record: Arc<Mutex<HubRecord>>,
}

impl FakeHub {
    pub fn record(&self) -> std::sync::MutexGuard<'_, HubRecord> {
        self.record.lock().unwrap()
    }

    pub fn file(&self, repo: &str, path: &str) -> Option<Vec<u8>> {
        self.record()
            .files
            .get(&(repo.to_string(), path.to_string()))
            .cloned()
    }
}

/// Start a fake hub on an ephemeral port
pub async fn spawn_hub() -> FakeHub {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let hub = FakeHub {
        base,
        record: Arc::default(),
    };

    let app = Router::new()
        .route("/api/repos/create", post(create_repo))
        .route("/api/models/{ns}/{name}/preupload/main", post(preupload))
        .route("/api/models/{ns}/{name}/commit/main", post(commit))
        .route("/api/models/{ns}/{name}/tag/main", post(create_tag))
        .route("/{ns}/{name}/info/lfs/objects/batch", post(lfs_batch))
        .route("/{ns}/{name}/resolve/main/{*path}", get(resolve))
        .route("/lfs/{oid}", put(lfs_put))
        .route("/lfs-verify", post(lfs_verify))
        .with_state(hub.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    hub
}

fn is_lfs_path(path: &str) -> bool {
    path.ends_with(".safetensors") || path.ends_with(".bin")
}

async fn create_repo(
    State(hub): State<FakeHub>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    let mut record = hub.record();
    if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
        record.auth_headers.push(auth.to_string());
    }

    let repo_id = match body["organization"].as_str() {
        Some(org) => format!("{}/{}", org, body["name"].as_str().unwrap_or_default()),
        None => body["name"].as_str().unwrap_or_default().to_string(),
    };
    if record.existing_repos.contains(&repo_id) {
        return StatusCode::CONFLICT;
    }
    record.existing_repos.push(repo_id);
    record.created_repos.push(body);
    StatusCode::OK
}

async fn preupload(Json(body): Json<Value>) -> Json<Value> {
    let files: Vec<Value> = body["files"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|f| {
            let path = f["path"].as_str().unwrap_or_default().to_string();
            let mode = if is_lfs_path(&path) { "lfs" } else { "regular" };
            let ignore = path.ends_with(IGNORED_SUFFIX);
            json!({ "path": path, "uploadMode": mode, "shouldIgnore": ignore })
        })
        .collect();
    Json(json!({ "files": files }))
}

async fn commit(
    State(hub): State<FakeHub>,
    Path((ns, name)): Path<(String, String)>,
    body: String,
) -> Response {
    let repo = format!("{}/{}", ns, name);
    let mut record = hub.record();
    let mut summary = String::new();
    let mut paths = Vec::new();

    for line in body.lines() {
        let line: Value = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(_) => return (StatusCode::BAD_REQUEST, "bad ndjson").into_response(),
        };
        let value = &line["value"];
        match line["key"].as_str() {
            Some("header") => summary = value["summary"].as_str().unwrap_or_default().to_string(),
            Some("file") => {
                let path = value["path"].as_str().unwrap_or_default().to_string();
                let content = BASE64
                    .decode(value["content"].as_str().unwrap_or_default())
                    .unwrap_or_default();
                record.files.insert((repo.clone(), path.clone()), content);
                paths.push(path);
            }
            Some("lfsFile") => {
                let path = value["path"].as_str().unwrap_or_default().to_string();
                let oid = value["oid"].as_str().unwrap_or_default();
                let Some(content) = record.lfs_store.get(oid).cloned() else {
                    return (StatusCode::UNPROCESSABLE_ENTITY, "LFS object not uploaded")
                        .into_response();
                };
                record.files.insert((repo.clone(), path.clone()), content);
                paths.push(path);
            }
            _ => return (StatusCode::BAD_REQUEST, "unknown key").into_response(),
        }
    }

    let n = record.commits.len();
    let plain_text = summary == PLAIN_TEXT_COMMIT;
    record.commits.push((repo.clone(), summary, paths));
    if plain_text {
        return "committed".into_response();
    }
    Json(json!({
        "commitOid": format!("{:040x}", n + 1),
        "commitUrl": format!("{}/{}/commit/{:040x}", hub.base, repo, n + 1),
    }))
    .into_response()
}

async fn create_tag(
    State(hub): State<FakeHub>,
    Path((ns, name)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> StatusCode {
    let repo = format!("{}/{}", ns, name);
    let tag = body["tag"].as_str().unwrap_or_default().to_string();
    let message = body["message"].as_str().unwrap_or_default().to_string();

    let mut record = hub.record();
    if record.tags.iter().any(|(r, t, _)| *r == repo && *t == tag) {
        return StatusCode::CONFLICT;
    }
    record.tags.push((repo, tag, message));
    StatusCode::OK
}

async fn lfs_batch(State(hub): State<FakeHub>, body: Bytes) -> Response {
    let Ok(request) = serde_json::from_slice::<Value>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    if request["operation"] != "upload" {
        return StatusCode::BAD_REQUEST.into_response();
    }

    let record = hub.record();
    let objects: Vec<Value> = request["objects"]
        .as_array()
        .cloned()
        .unwrap_or_default()
        .into_iter()
        .map(|o| {
            let oid = o["oid"].as_str().unwrap_or_default();
            if record.lfs_store.contains_key(oid) {
                return json!({ "oid": oid, "size": o["size"] });
            }
            json!({
                "oid": oid,
                "size": o["size"],
                "actions": {
                    "upload": { "href": format!("{}/lfs/{}", hub.base, oid) },
                    "verify": {
                        "href": format!("{}/lfs-verify", hub.base),
                        "header": { "x-verify-token": "secret" },
                    },
                },
            })
        })
        .collect();

    (
        [("content-type", "application/vnd.git-lfs+json")],
        Json(json!({ "transfer": "basic", "objects": objects })),
    )
        .into_response()
}

async fn lfs_put(
    State(hub): State<FakeHub>,
    Path(oid): Path<String>,
    body: Bytes,
) -> StatusCode {
    if hex::encode(Sha256::digest(&body)) != oid {
        return StatusCode::BAD_REQUEST;
    }
    let mut record = hub.record();
    record.lfs_store.insert(oid, body.to_vec());
    record.lfs_puts += 1;
    StatusCode::OK
}

async fn lfs_verify(
    State(hub): State<FakeHub>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if headers.get("x-verify-token").is_none() {
        return StatusCode::UNAUTHORIZED;
    }
    let Ok(pointer) = serde_json::from_slice::<Value>(&body) else {
        return StatusCode::BAD_REQUEST;
    };
    let oid = pointer["oid"].as_str().unwrap_or_default().to_string();

    let mut record = hub.record();
    if !record.lfs_store.contains_key(&oid) {
        return StatusCode::NOT_FOUND;
    }
    record.lfs_verified.push(oid);
    StatusCode::OK
}

async fn resolve(
    State(hub): State<FakeHub>,
    Path((ns, name, path)): Path<(String, String, String)>,
) -> Response {
    match hub.file(&format!("{}/{}", ns, name), &path) {
        Some(content) => content.into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Requests received by the fake inference server
#[derive(Debug, Default)]
pub struct InferenceRecord {
    pub requests: Vec<Value>,
    pub auth_headers: Vec<String>,
}

#[derive(Clone)]
pub struct FakeInference {
    pub url: String,
    pub record: Arc<Mutex<InferenceRecord>>,
}

/// Start a fake inference server at `{base}/generate`
///
/// Prompts containing `fail_on` get a 503; every other prompt returns a
/// mono WAV with ten samples per prompt character.
pub async fn spawn_inference(fail_on: &'static str) -> FakeInference {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}/generate", listener.local_addr().unwrap());
    let fake = FakeInference {
        url,
        record: Arc::default(),
    };

    let state = (fake.clone(), fail_on);
    let app = Router::new()
        .route("/generate", post(generate))
        .with_state(state);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    fake
}

async fn generate(
    State((fake, fail_on)): State<(FakeInference, &'static str)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let prompt = body["inputs"].as_str().unwrap_or_default().to_string();
    {
        let mut record = fake.record.lock().unwrap();
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            record.auth_headers.push(auth.to_string());
        }
        record.requests.push(body);
    }

    if prompt.contains(fail_on) {
        return (StatusCode::SERVICE_UNAVAILABLE, "model overloaded").into_response();
    }

    (
        [("content-type", "audio/wav")],
        wav_bytes(prompt.len() * 10),
    )
        .into_response()
}

/// Mono 16-bit WAV with `samples` samples
pub fn wav_bytes(samples: usize) -> Vec<u8> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 32000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
        for i in 0..samples {
            writer.write_sample((i % 64) as i16).unwrap();
        }
        writer.finalize().unwrap();
    }
    cursor.into_inner()
}

/// Write a minimal loadable checkpoint; returns the weight file's bytes
pub fn write_checkpoint(dir: &FsPath) -> Vec<u8> {
    let header = r#"{"w":{"dtype":"F32","shape":[8],"data_offsets":[0,32]}}"#;
    let mut weights = (header.len() as u64).to_le_bytes().to_vec();
    weights.extend_from_slice(header.as_bytes());
    weights.extend_from_slice(&[7u8; 32]);

    std::fs::write(
        dir.join("config.json"),
        r#"{"model_type": "musicgen", "architectures": ["MusicgenForConditionalGeneration"]}"#,
    )
    .unwrap();
    std::fs::write(dir.join("generation_config.json"), r#"{"max_new_tokens": 256}"#).unwrap();
    std::fs::write(dir.join("model.safetensors"), &weights).unwrap();
    std::fs::write(
        dir.join("preprocessor_config.json"),
        r#"{"feature_extractor_type": "EncodecFeatureExtractor", "sampling_rate": 32000}"#,
    )
    .unwrap();
    std::fs::write(
        dir.join("tokenizer_config.json"),
        r#"{"tokenizer_class": "T5Tokenizer"}"#,
    )
    .unwrap();
    weights
}

/// Metrics map from literal pairs
pub fn metrics(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}
