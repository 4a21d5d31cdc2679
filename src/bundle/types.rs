use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use thiserror::Error;

/// Container format version written into `contents.json`
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Archive paths inside a bundle
pub mod paths {
    pub const CONTENTS: &str = "contents.json";
    pub const RESOURCES: &str = "resources";
}

/// Header stored as `contents.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleHeader {
    pub version: u32,
    #[serde(rename = "type")]
    pub bundle_type: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub manifest: serde_json::Value,
    #[serde(default)]
    pub resources: Vec<ResourceDescriptor>,
}

/// Describes one binary resource stored under `resources/<id>`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: String,
    pub media_type: String,
    pub size: u64,
    pub digest: String,
}

/// A resource waiting to be written into a bundle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleResource {
    pub id: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl BundleResource {
    pub fn new(id: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            id: id.into(),
            media_type: media_type.into(),
            data,
        }
    }
}

/// Bundle read back from an archive
#[derive(Debug, Clone)]
pub struct ReadableBundle<M> {
    pub bundle_type: String,
    pub labels: BTreeMap<String, String>,
    pub manifest: M,
    pub resources: Vec<(ResourceDescriptor, Vec<u8>)>,
}

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("I/O error while processing bundle: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bundle is missing {0}")]
    MissingEntry(String),

    #[error("Bundle contents could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Unsupported bundle format version {0}")]
    UnsupportedVersion(u32),

    #[error("Expected bundle of type '{expected}' but found '{found}'")]
    TypeMismatch { expected: String, found: String },

    #[error("Digest mismatch for resource '{id}': expected {expected}, found {actual}")]
    DigestMismatch {
        id: String,
        expected: String,
        actual: String,
    },

    #[error("Invalid resource id '{0}'")]
    InvalidResourceId(String),

    #[error("Resource '{0}' was added twice with different contents")]
    DuplicateResource(String),
}

pub type ContainerResult<T> = Result<T, ContainerError>;

/// `sha256:<hex>` digest of `data`
pub fn sha256_digest(data: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(data))
}

/// Resource ids become archive file names and must stay inside `resources/`
pub fn validate_resource_id(id: &str) -> ContainerResult<()> {
    let valid = !id.is_empty()
        && id != "."
        && id != ".."
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
    if valid {
        Ok(())
    } else {
        Err(ContainerError::InvalidResourceId(id.to_string()))
    }
}
