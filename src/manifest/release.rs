use semver::Version;

use crate::manifest::schema::SchemaVersion;
use crate::manifest::types::{ManifestImage, ReleaseStatus};

/// A release manifest after normalization: identity resolved, every image
/// built successfully and bound to a service, every tag a string pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Release {
    pub schema: SchemaVersion,
    pub version: Version,
    pub commit: Option<String>,
    pub revision: Option<u32>,
    pub status: ReleaseStatus,
    pub release_images: Vec<ReleaseImage>,
    pub release_tags: Vec<ReleaseTagEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseImage {
    pub image: ManifestImage,
    pub service: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseTagEntry {
    pub tag_key: String,
    pub value: String,
}

impl Release {
    /// Semver string as stored on the remote release record
    pub fn semver(&self) -> String {
        self.version.to_string()
    }

    /// Distinct service names, in first-seen order
    pub fn service_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for image in &self.release_images {
            if !names.contains(&image.service.as_str()) {
                names.push(image.service.as_str());
            }
        }
        names
    }
}
