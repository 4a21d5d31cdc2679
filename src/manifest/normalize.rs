//! Manifest normalization.
//!
//! This is the only gate between an externally authored manifest and the
//! remote mutation sequence, so every rule fails fast with the field that
//! broke it.

use semver::Version;
use serde_json::Value;
use thiserror::Error;

use crate::manifest::release::{Release, ReleaseImage, ReleaseTagEntry};
use crate::manifest::schema::SchemaVersion;
use crate::manifest::types::{ManifestImage, ReleaseManifest, ReleaseStatus};

/// A manifest field did not have the shape normalization requires
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Expected {field} to be {expected} but found {found}")]
pub struct ValidationError {
    pub field: String,
    pub expected: String,
    pub found: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, expected: impl Into<String>, found: &Value) -> Self {
        Self {
            field: field.into(),
            expected: expected.into(),
            found: describe(found),
        }
    }
}

/// Render a JSON value the way it shows up in validation messages
fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{s}'"),
        Value::Array(items) => format!("an array of {} element(s)", items.len()),
        Value::Object(_) => "an object".to_string(),
    }
}

/// Validate `raw` against `schema` and convert it into a [`Release`].
///
/// A `version_override` replaces the manifest's semantic version identity;
/// the manifest's own version fields are then not inspected.
pub fn normalize(
    raw: &ReleaseManifest,
    schema: SchemaVersion,
    version_override: Option<&str>,
) -> Result<Release, ValidationError> {
    let override_version = version_override
        .map(|v| {
            Version::parse(v.trim()).map_err(|_| {
                ValidationError::new(
                    "version override",
                    "a valid semantic version",
                    &Value::String(v.to_string()),
                )
            })
        })
        .transpose()?;

    let status = match &raw.status {
        Value::String(s) if s == ReleaseStatus::Success.as_str() => ReleaseStatus::Success,
        other => return Err(ValidationError::new("release status", "'success'", other)),
    };

    let version = match override_version {
        Some(version) => version,
        None => identity(raw, schema)?,
    };

    let commit = match (&raw.commit, schema.matches_on_commit()) {
        (Value::String(c), _) => Some(c.clone()),
        (Value::Null, false) => None,
        (other, _) => return Err(ValidationError::new("commit", "a string", other)),
    };

    let revision = match schema {
        SchemaVersion::Revisioned => match &raw.revision {
            Value::Null => None,
            value => Some(
                value
                    .as_u64()
                    .and_then(|r| u32::try_from(r).ok())
                    .ok_or_else(|| {
                        ValidationError::new("revision", "a non-negative integer", value)
                    })?,
            ),
        },
        _ => None,
    };

    let release_images = normalize_images(&raw.release_image)?;
    let release_tags = normalize_tags(&raw.release_tag)?;

    Ok(Release {
        schema,
        version,
        commit,
        revision,
        status,
        release_images,
        release_tags,
    })
}

fn identity(raw: &ReleaseManifest, schema: SchemaVersion) -> Result<Version, ValidationError> {
    match schema {
        SchemaVersion::Triple => {
            let major = semver_part("semver_major", &raw.semver_major)?;
            let minor = semver_part("semver_minor", &raw.semver_minor)?;
            let patch = semver_part("semver_patch", &raw.semver_patch)?;
            Ok(Version::new(major, minor, patch))
        }
        SchemaVersion::Semver | SchemaVersion::Revisioned => match &raw.semver {
            Value::String(s) => Version::parse(s)
                .map_err(|_| ValidationError::new("semver", "a valid semantic version", &raw.semver)),
            other => Err(ValidationError::new("semver", "a string", other)),
        },
    }
}

fn semver_part(field: &str, value: &Value) -> Result<u64, ValidationError> {
    value
        .as_u64()
        .ok_or_else(|| ValidationError::new(field, "a non-negative integer", value))
}

fn normalize_images(value: &Value) -> Result<Vec<ReleaseImage>, ValidationError> {
    let entries = value
        .as_array()
        .ok_or_else(|| ValidationError::new("release_image", "an array", value))?;

    let mut images = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        let field = format!("release_image[{i}]");

        let nested = entry.get("image").unwrap_or(&Value::Null);
        let image = match nested.as_array().and_then(|list| list.first()) {
            Some(image) => image,
            None => {
                return Err(ValidationError::new(
                    format!("{field}.image"),
                    "a non-empty array",
                    nested,
                ))
            }
        };

        let status = image.get("status").unwrap_or(&Value::Null);
        if status.as_str() != Some(ReleaseStatus::Success.as_str()) {
            return Err(ValidationError::new(
                format!("{field}.image[0].status"),
                "'success'",
                status,
            ));
        }

        let content_hash = image.get("content_hash").unwrap_or(&Value::Null);
        if !content_hash.is_string() {
            return Err(ValidationError::new(
                format!("{field}.image[0].content_hash"),
                "a string",
                content_hash,
            ));
        }

        let services = image.get("is_a_build_of__service").unwrap_or(&Value::Null);
        let service = match services.as_array().and_then(|list| list.first()) {
            Some(service) => service,
            None => {
                return Err(ValidationError::new(
                    format!("{field}.image[0].is_a_build_of__service"),
                    "a non-empty array",
                    services,
                ))
            }
        };
        let service_name = service.get("service_name").unwrap_or(&Value::Null);
        let service_name = service_name.as_str().ok_or_else(|| {
            ValidationError::new(
                format!("{field}.image[0].is_a_build_of__service[0].service_name"),
                "a string",
                service_name,
            )
        })?;

        let image: ManifestImage = serde_json::from_value(image.clone()).map_err(|e| {
            ValidationError {
                field: format!("{field}.image[0]"),
                expected: "an image record".to_string(),
                found: e.to_string(),
            }
        })?;

        images.push(ReleaseImage {
            image,
            service: service_name.to_string(),
        });
    }
    Ok(images)
}

fn normalize_tags(value: &Value) -> Result<Vec<ReleaseTagEntry>, ValidationError> {
    let entries = value
        .as_array()
        .ok_or_else(|| ValidationError::new("release_tag", "an array", value))?;

    entries
        .iter()
        .enumerate()
        .map(|(i, tag)| -> Result<ReleaseTagEntry, ValidationError> {
            let key = tag.get("tag_key").unwrap_or(&Value::Null);
            let tag_key = key
                .as_str()
                .ok_or_else(|| ValidationError::new(format!("release_tag[{i}].tag_key"), "a string", key))?;
            let value = tag.get("value").unwrap_or(&Value::Null);
            let value = value
                .as_str()
                .ok_or_else(|| ValidationError::new(format!("release_tag[{i}].value"), "a string", value))?;
            Ok(ReleaseTagEntry {
                tag_key: tag_key.to_string(),
                value: value.to_string(),
            })
        })
        .collect()
}
