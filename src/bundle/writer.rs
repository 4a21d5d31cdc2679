//! Bundle archive writer

use serde::Serialize;
use std::collections::BTreeMap;
use std::io::{Cursor, Write};
use tar::{Builder, Header};

use crate::bundle::types::{
    paths, sha256_digest, validate_resource_id, BundleHeader, BundleResource, ContainerError,
    ContainerResult, ResourceDescriptor, BUNDLE_FORMAT_VERSION,
};

/// Builder for a bundle archive.
///
/// Entries are written with fixed metadata (mode, mtime, owner) so the same
/// manifest and resources always produce the same bytes.
#[derive(Debug)]
pub struct WritableBundle {
    bundle_type: String,
    manifest: serde_json::Value,
    labels: BTreeMap<String, String>,
    resources: Vec<BundleResource>,
}

impl WritableBundle {
    pub fn new<M: Serialize>(bundle_type: impl Into<String>, manifest: &M) -> ContainerResult<Self> {
        Ok(Self {
            bundle_type: bundle_type.into(),
            manifest: serde_json::to_value(manifest)?,
            labels: BTreeMap::new(),
            resources: Vec::new(),
        })
    }

    pub fn label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Add a resource. Adding the same id again with the same bytes is a
    /// no-op, so content-addressed ids can be added once per reference.
    pub fn add_resource(&mut self, resource: BundleResource) -> ContainerResult<()> {
        validate_resource_id(&resource.id)?;
        if let Some(existing) = self.resources.iter().find(|r| r.id == resource.id) {
            if existing.data != resource.data {
                return Err(ContainerError::DuplicateResource(resource.id));
            }
            return Ok(());
        }
        self.resources.push(resource);
        Ok(())
    }

    /// Write the archive into `writer`
    pub fn write_to<W: Write>(self, writer: W) -> ContainerResult<W> {
        let descriptors = self
            .resources
            .iter()
            .map(|r| ResourceDescriptor {
                id: r.id.clone(),
                media_type: r.media_type.clone(),
                size: r.data.len() as u64,
                digest: sha256_digest(&r.data),
            })
            .collect();

        let header = BundleHeader {
            version: BUNDLE_FORMAT_VERSION,
            bundle_type: self.bundle_type,
            labels: self.labels,
            manifest: self.manifest,
            resources: descriptors,
        };
        let contents = serde_json::to_vec_pretty(&header)?;

        let mut builder = Builder::new(writer);
        append(&mut builder, paths::CONTENTS, &contents)?;
        for resource in &self.resources {
            let path = format!("{}/{}", paths::RESOURCES, resource.id);
            append(&mut builder, &path, &resource.data)?;
        }
        Ok(builder.into_inner()?)
    }

    /// Finish the bundle and hand it back as a readable stream
    pub fn finalize(self) -> ContainerResult<Cursor<Vec<u8>>> {
        let bytes = self.write_to(Vec::new())?;
        Ok(Cursor::new(bytes))
    }
}

fn append<W: Write>(builder: &mut Builder<W>, path: &str, data: &[u8]) -> ContainerResult<()> {
    let mut header = Header::new_gnu();
    header.set_size(data.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header.set_cksum();
    builder.append_data(&mut header, path, data)?;
    Ok(())
}
