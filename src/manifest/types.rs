use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Build status of a release or an image as reported by the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Cancelled,
    Error,
    Failed,
    Interrupted,
    Local,
    Running,
    Success,
    Timeout,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Cancelled => "cancelled",
            ReleaseStatus::Error => "error",
            ReleaseStatus::Failed => "failed",
            ReleaseStatus::Interrupted => "interrupted",
            ReleaseStatus::Local => "local",
            ReleaseStatus::Running => "running",
            ReleaseStatus::Success => "success",
            ReleaseStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReleasePhase {
    Next,
    Current,
    Sunset,
    EndOfLife,
}

/// Wire form of a release manifest, as stored inside a bundle.
///
/// Fields that the normalizer has to type-check are kept as raw JSON values
/// (absent fields deserialize to `Null`). Everything the manifest carries
/// beyond the known fields survives a read/write cycle through `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    #[serde(default)]
    pub commit: Value,
    #[serde(default)]
    pub status: Value,
    #[serde(default)]
    pub semver: Value,
    #[serde(default)]
    pub semver_major: Value,
    #[serde(default)]
    pub semver_minor: Value,
    #[serde(default)]
    pub semver_patch: Value,
    #[serde(default)]
    pub revision: Value,
    #[serde(default)]
    pub release_image: Value,
    #[serde(default)]
    pub release_tag: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composition: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_invalidated: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<ReleasePhase>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver_prerelease: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semver_build: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub known_issue_list: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_final: Option<bool>,
    #[serde(
        rename = "is_finalized_at__date",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_finalized_at_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invalidation_reason: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ReleaseManifest {
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }
}

/// Image record embedded in a manifest's `release_image[].image[]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestImage {
    pub status: ReleaseStatus,
    pub content_hash: String,
    #[serde(
        rename = "is_stored_at__image_location",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub image_location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_log: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_absent_checked_fields_become_null() {
        let manifest = ReleaseManifest::from_value(json!({ "commit": "abc" })).unwrap();
        assert_eq!(manifest.commit, json!("abc"));
        assert!(manifest.status.is_null());
        assert!(manifest.release_image.is_null());
        assert!(manifest.release_tag.is_null());
    }

    #[test]
    fn test_unknown_fields_are_preserved() {
        let raw = json!({
            "commit": "abc",
            "status": "success",
            "id": 42,
            "__metadata": { "uri": "/resin/release(@id)?@id=42" }
        });
        let manifest = ReleaseManifest::from_value(raw).unwrap();
        assert_eq!(manifest.extra.get("id"), Some(&json!(42)));

        let back = manifest.to_value().unwrap();
        assert_eq!(back["__metadata"]["uri"], "/resin/release(@id)?@id=42");
    }

    #[test]
    fn test_phase_uses_kebab_case() {
        let manifest = ReleaseManifest::from_value(json!({ "phase": "end-of-life" })).unwrap();
        assert_eq!(manifest.phase, Some(ReleasePhase::EndOfLife));
    }
}
