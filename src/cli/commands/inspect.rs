use anyhow::{Context, Result};
use std::io::Cursor;
use std::path::PathBuf;

use super::Command;
use crate::bundle::read_release_bundle;
use crate::error::BundleError;
use crate::manifest::{normalize, Release, SchemaVersion};

pub struct InspectCommand {
    pub bundle: PathBuf,
    pub schema: Option<SchemaVersion>,
    default_schema: SchemaVersion,
}

impl InspectCommand {
    pub fn new(bundle: PathBuf) -> Self {
        Self {
            bundle,
            schema: None,
            default_schema: SchemaVersion::default(),
        }
    }

    pub fn with_schema(mut self, schema: Option<SchemaVersion>) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_default_schema(mut self, schema: SchemaVersion) -> Self {
        self.default_schema = schema;
        self
    }

    /// Read and normalize the bundle
    pub fn load(&self) -> Result<Release> {
        let bytes = std::fs::read(&self.bundle)
            .with_context(|| format!("Failed to read bundle {}", self.bundle.display()))?;
        self.normalize(bytes)
    }

    fn normalize(&self, bytes: Vec<u8>) -> Result<Release> {
        let bundle = read_release_bundle(Cursor::new(bytes)).map_err(BundleError::malformed)?;
        let schema =
            SchemaVersion::resolve(self.schema, bundle.schema_label.as_deref(), self.default_schema)
                .map_err(BundleError::malformed)?;
        let release = normalize(&bundle.manifest, schema, None).map_err(BundleError::malformed)?;
        Ok(release)
    }
}

impl Command for InspectCommand {
    async fn execute(&self) -> Result<()> {
        let bytes = tokio::fs::read(&self.bundle)
            .await
            .with_context(|| format!("Failed to read bundle {}", self.bundle.display()))?;
        let release = self.normalize(bytes)?;

        println!("🔍 {}", self.bundle.display());
        println!("────────────────────");
        println!("   📐 Schema:   {}", release.schema);
        println!("   🏷️  Version:  {}", release.version);
        if let Some(commit) = &release.commit {
            println!("   🔖 Commit:   {commit}");
        }
        if let Some(revision) = release.revision {
            println!("   🔁 Revision: {revision}");
        }
        println!("   ✅ Status:   {}", release.status);
        println!();
        println!("🧱 IMAGES ({}):", release.release_images.len());
        for image in &release.release_images {
            println!("   • {} {}", image.service, image.image.content_hash);
        }
        println!("🏷️  TAGS ({}):", release.release_tags.len());
        for tag in &release.release_tags {
            println!("   • {}={}", tag.tag_key, tag.value);
        }
        Ok(())
    }
}
