use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Bundle label that records which manifest schema a bundle was written with
pub const SCHEMA_LABEL: &str = "io.release-bundle.schema";

/// Manifest schema variant.
///
/// Each variant fixes where the semantic version identity of a release is
/// read from and how duplicates are detected at the destination:
///
/// | variant      | identity                              | duplicate match                         |
/// |--------------|---------------------------------------|-----------------------------------------|
/// | `Triple`     | numeric `semver_major/minor/patch`    | same triple                             |
/// | `Semver`     | `semver` string                       | same commit OR same `semver`            |
/// | `Revisioned` | `semver` string + numeric `revision`  | same commit OR same triple and revision |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SchemaVersion {
    #[serde(rename = "v1")]
    Triple,
    #[default]
    #[serde(rename = "v2")]
    Semver,
    #[serde(rename = "v3")]
    Revisioned,
}

impl SchemaVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            SchemaVersion::Triple => "v1",
            SchemaVersion::Semver => "v2",
            SchemaVersion::Revisioned => "v3",
        }
    }

    /// Whether duplicate detection for this variant matches on commit
    pub fn matches_on_commit(&self) -> bool {
        !matches!(self, SchemaVersion::Triple)
    }

    /// Pick the schema for an incoming bundle: an explicit choice wins, then
    /// whatever the bundle was labelled with, then the configured default.
    pub fn resolve(
        explicit: Option<SchemaVersion>,
        labelled: Option<&str>,
        fallback: SchemaVersion,
    ) -> Result<SchemaVersion, UnknownSchema> {
        if let Some(schema) = explicit {
            return Ok(schema);
        }
        match labelled {
            Some(label) => label.parse(),
            None => Ok(fallback),
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown manifest schema '{0}' (expected v1, v2 or v3)")]
pub struct UnknownSchema(pub String);

impl FromStr for SchemaVersion {
    type Err = UnknownSchema;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "v1" | "triple" => Ok(SchemaVersion::Triple),
            "v2" | "semver" => Ok(SchemaVersion::Semver),
            "v3" | "revisioned" => Ok(SchemaVersion::Revisioned),
            other => Err(UnknownSchema(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_schema_wins_over_label() {
        let schema =
            SchemaVersion::resolve(Some(SchemaVersion::Triple), Some("v3"), SchemaVersion::Semver)
                .unwrap();
        assert_eq!(schema, SchemaVersion::Triple);
    }

    #[test]
    fn test_label_wins_over_fallback() {
        let schema = SchemaVersion::resolve(None, Some("v3"), SchemaVersion::Semver).unwrap();
        assert_eq!(schema, SchemaVersion::Revisioned);
    }

    #[test]
    fn test_unknown_label_is_rejected() {
        let err = SchemaVersion::resolve(None, Some("v9"), SchemaVersion::Semver).unwrap_err();
        assert!(err.to_string().contains("v9"));
    }

    #[test]
    fn test_serde_uses_short_names() {
        assert_eq!(serde_json::to_string(&SchemaVersion::Revisioned).unwrap(), "\"v3\"");
        let parsed: SchemaVersion = serde_json::from_str("\"v1\"").unwrap();
        assert_eq!(parsed, SchemaVersion::Triple);
    }
}
