//! Bundle archive reader
//!
//! Reads a bundle archive, checks its type and verifies every resource
//! against the digest recorded in `contents.json`.

use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::Read;
use tar::Archive;
use tracing::debug;

use crate::bundle::types::{
    paths, sha256_digest, BundleHeader, ContainerError, ContainerResult, ReadableBundle,
    BUNDLE_FORMAT_VERSION,
};

/// Read a bundle of `expected_type` from `reader`
pub fn read_bundle<M, R>(reader: R, expected_type: &str) -> ContainerResult<ReadableBundle<M>>
where
    M: DeserializeOwned,
    R: Read,
{
    let mut files = extract_all_files(reader)?;

    let contents = files
        .remove(paths::CONTENTS)
        .ok_or_else(|| ContainerError::MissingEntry(paths::CONTENTS.to_string()))?;
    let header: BundleHeader = serde_json::from_slice(&contents)?;

    if header.version != BUNDLE_FORMAT_VERSION {
        return Err(ContainerError::UnsupportedVersion(header.version));
    }
    if header.bundle_type != expected_type {
        return Err(ContainerError::TypeMismatch {
            expected: expected_type.to_string(),
            found: header.bundle_type,
        });
    }

    let mut resources = Vec::with_capacity(header.resources.len());
    for descriptor in header.resources {
        let path = format!("{}/{}", paths::RESOURCES, descriptor.id);
        let data = files
            .remove(&path)
            .ok_or_else(|| ContainerError::MissingEntry(path.clone()))?;
        let actual = sha256_digest(&data);
        if actual != descriptor.digest {
            return Err(ContainerError::DigestMismatch {
                id: descriptor.id,
                expected: descriptor.digest,
                actual,
            });
        }
        resources.push((descriptor, data));
    }

    debug!(
        bundle_type = %header.bundle_type,
        resources = resources.len(),
        "Read bundle"
    );

    Ok(ReadableBundle {
        bundle_type: header.bundle_type,
        labels: header.labels,
        manifest: serde_json::from_value(header.manifest)?,
        resources,
    })
}

fn extract_all_files<R: Read>(reader: R) -> ContainerResult<HashMap<String, Vec<u8>>> {
    let mut archive = Archive::new(reader);
    let mut files = HashMap::new();
    for entry in archive.entries()? {
        let mut entry = entry?;
        if !entry.header().entry_type().is_file() {
            continue;
        }
        let path = entry.path()?.to_string_lossy().to_string();
        let mut data = Vec::new();
        entry.read_to_end(&mut data)?;
        files.insert(path, data);
    }
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::types::BundleResource;
    use crate::bundle::writer::WritableBundle;
    use serde_json::{json, Value};
    use tar::{Builder, Header};

    #[test]
    fn test_written_bundle_reads_back() {
        let manifest = json!({ "commit": "abc", "status": "success" });
        let mut bundle = WritableBundle::new("io.test", &manifest)
            .unwrap()
            .label("k", "v");
        bundle
            .add_resource(BundleResource::new("blob-1", "application/octet-stream", b"hello".to_vec()))
            .unwrap();
        let stream = bundle.finalize().unwrap();

        let read: ReadableBundle<Value> = read_bundle(stream, "io.test").unwrap();
        assert_eq!(read.manifest, manifest);
        assert_eq!(read.labels.get("k").map(String::as_str), Some("v"));
        assert_eq!(read.resources.len(), 1);
        assert_eq!(read.resources[0].0.id, "blob-1");
        assert_eq!(read.resources[0].1, b"hello");
    }

    #[test]
    fn test_identical_input_gives_identical_bytes() {
        let manifest = json!({ "commit": "abc" });
        let a = WritableBundle::new("io.test", &manifest).unwrap().finalize().unwrap();
        let b = WritableBundle::new("io.test", &manifest).unwrap().finalize().unwrap();
        assert_eq!(a.into_inner(), b.into_inner());
    }

    #[test]
    fn test_type_mismatch_is_rejected() {
        let stream = WritableBundle::new("io.other", &json!({}))
            .unwrap()
            .finalize()
            .unwrap();
        let err = read_bundle::<Value, _>(stream, "io.test").unwrap_err();
        assert!(matches!(err, ContainerError::TypeMismatch { .. }));
    }

    #[test]
    fn test_missing_contents_is_rejected() {
        let mut builder = Builder::new(Vec::new());
        let mut header = Header::new_gnu();
        header.set_size(2);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, "other.json", &b"{}"[..]).unwrap();
        let bytes = builder.into_inner().unwrap();

        let err = read_bundle::<Value, _>(&bytes[..], "io.test").unwrap_err();
        assert!(matches!(err, ContainerError::MissingEntry(ref p) if p == "contents.json"));
    }

    #[test]
    fn test_tampered_resource_fails_digest_check() {
        let header = BundleHeader {
            version: BUNDLE_FORMAT_VERSION,
            bundle_type: "io.test".to_string(),
            labels: Default::default(),
            manifest: json!({}),
            resources: vec![crate::bundle::types::ResourceDescriptor {
                id: "blob".to_string(),
                media_type: "application/octet-stream".to_string(),
                size: 5,
                digest: sha256_digest(b"hello"),
            }],
        };
        let contents = serde_json::to_vec(&header).unwrap();

        let mut builder = Builder::new(Vec::new());
        for (path, data) in [("contents.json", contents.as_slice()), ("resources/blob", &b"world"[..])] {
            let mut h = Header::new_gnu();
            h.set_size(data.len() as u64);
            h.set_mode(0o644);
            h.set_cksum();
            builder.append_data(&mut h, path, data).unwrap();
        }
        let bytes = builder.into_inner().unwrap();

        let err = read_bundle::<Value, _>(&bytes[..], "io.test").unwrap_err();
        assert!(matches!(err, ContainerError::DigestMismatch { ref id, .. } if id == "blob"));
    }
}
