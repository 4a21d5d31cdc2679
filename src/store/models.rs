//! Typed views over records returned by the remote store

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::store::error::{StoreError, StoreResult};

/// Read the numeric `id` of a record
pub fn record_id(record: &Value) -> StoreResult<u64> {
    record
        .get("id")
        .and_then(Value::as_u64)
        .ok_or_else(|| StoreError::Decode(format!("record has no numeric id: {record}")))
}

/// Read the id a navigation field points at.
///
/// Unexpanded navigation fields come back either as a bare number or as a
/// `{ "__id": n }` reference object.
pub fn reference_id(field: &Value) -> Option<u64> {
    match field {
        Value::Number(n) => n.as_u64(),
        Value::Object(obj) => obj
            .get("__id")
            .or_else(|| obj.get("id"))
            .and_then(Value::as_u64),
        _ => None,
    }
}

pub fn decode<T: DeserializeOwned>(record: Value) -> StoreResult<T> {
    serde_json::from_value(record).map_err(|e| StoreError::Decode(e.to_string()))
}

/// Release columns used by duplicate detection and revision backfill
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ReleaseRecord {
    pub id: u64,
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub semver: Option<String>,
    #[serde(default)]
    pub semver_major: Option<u64>,
    #[serde(default)]
    pub semver_minor: Option<u64>,
    #[serde(default)]
    pub semver_patch: Option<u64>,
    #[serde(default)]
    pub revision: Option<u64>,
}

impl ReleaseRecord {
    /// Human-readable version of the record for error messages
    pub fn version_label(&self) -> String {
        if let Some(semver) = &self.semver {
            return semver.clone();
        }
        match (self.semver_major, self.semver_minor, self.semver_patch) {
            (Some(major), Some(minor), Some(patch)) => format!("{major}.{minor}.{patch}"),
            _ => "unknown".to_string(),
        }
    }
}
