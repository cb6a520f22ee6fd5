//! Git LFS batch API types
//!
//! Large files reach the hub through the LFS batch protocol: request upload
//! actions for a set of object ids, PUT each object that the server does not
//! already have, then call the verify action if one is given.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Media type the LFS batch endpoint speaks
pub const LFS_MEDIA_TYPE: &str = "application/vnd.git-lfs+json";

/// Largest object the basic transfer adapter can move in one PUT (5 GiB)
pub const MAX_BASIC_TRANSFER_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Object id and size, the LFS identity of a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LfsPointer {
    pub oid: String,
    pub size: u64,
}

impl LfsPointer {
    pub fn fits_basic_transfer(&self) -> bool {
        self.size <= MAX_BASIC_TRANSFER_SIZE
    }
}

#[derive(Debug, Serialize)]
pub struct BatchRequest {
    pub operation: &'static str,
    pub transfers: Vec<&'static str>,
    pub objects: Vec<LfsPointer>,
    pub hash_algo: &'static str,
}

impl BatchRequest {
    /// Upload request for the basic (single PUT) transfer adapter
    ///
    /// Only `basic` is offered, so every object must fit in one PUT of at
    /// most [`MAX_BASIC_TRANSFER_SIZE`] bytes. Larger shards are rejected
    /// before the batch call; the multipart adapter is not implemented.
    pub fn upload(objects: Vec<LfsPointer>) -> Self {
        Self {
            operation: "upload",
            transfers: vec!["basic"],
            objects,
            hash_algo: "sha256",
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub objects: Vec<BatchObject>,
}

#[derive(Debug, Deserialize)]
pub struct BatchObject {
    pub oid: String,
    pub size: u64,
    /// Absent when the server already stores the object
    #[serde(default)]
    pub actions: Option<BatchActions>,
    #[serde(default)]
    pub error: Option<BatchError>,
}

#[derive(Debug, Deserialize)]
pub struct BatchActions {
    #[serde(default)]
    pub upload: Option<BatchAction>,
    #[serde(default)]
    pub verify: Option<BatchAction>,
}

#[derive(Debug, Deserialize)]
pub struct BatchAction {
    pub href: String,
    #[serde(default)]
    pub header: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct BatchError {
    pub code: u16,
    pub message: String,
}
