//! Conversion between release manifests and the generic bundle container

use serde::Serialize;
use std::io::{Cursor, Read};

use crate::bundle::reader::read_bundle;
use crate::bundle::types::{BundleResource, ContainerResult, ResourceDescriptor};
use crate::bundle::writer::WritableBundle;
use crate::manifest::{ReleaseManifest, SchemaVersion, SCHEMA_LABEL};

/// Type tag of release bundles
pub const RELEASE_BUNDLE_TYPE: &str = "io.release-bundle.release";

/// Release bundle as read from an archive
#[derive(Debug, Clone)]
pub struct ReleaseBundle {
    pub manifest: ReleaseManifest,
    /// Schema label the bundle was written with, if any
    pub schema_label: Option<String>,
    pub resources: Vec<(ResourceDescriptor, Vec<u8>)>,
}

pub fn read_release_bundle<R: Read>(reader: R) -> ContainerResult<ReleaseBundle> {
    let bundle = read_bundle::<ReleaseManifest, _>(reader, RELEASE_BUNDLE_TYPE)?;
    Ok(ReleaseBundle {
        manifest: bundle.manifest,
        schema_label: bundle.labels.get(SCHEMA_LABEL).cloned(),
        resources: bundle.resources,
    })
}

pub fn write_release_bundle<M: Serialize>(
    manifest: &M,
    schema: SchemaVersion,
    resources: Vec<BundleResource>,
) -> ContainerResult<Cursor<Vec<u8>>> {
    let mut bundle =
        WritableBundle::new(RELEASE_BUNDLE_TYPE, manifest)?.label(SCHEMA_LABEL, schema.as_str());
    for resource in resources {
        bundle.add_resource(resource)?;
    }
    bundle.finalize()
}
