//! Shared builders for integration tests

#![allow(dead_code)]

use release_bundle::manifest::SchemaVersion;
use release_bundle::store::{InMemoryStore, Resource};
use release_bundle::write_release_bundle;
use serde_json::{json, Value};
use std::io::Cursor;

/// A manifest as `create` would export it: one image per service
pub fn release_manifest(commit: &str, semver: &str, services: &[&str]) -> Value {
    let version = semver::Version::parse(semver).unwrap();
    let images: Vec<Value> = services
        .iter()
        .enumerate()
        .map(|(i, service)| {
            json!({
                "created_at": "2024-03-01T10:00:00.000Z",
                "image": [{
                    "created_at": "2024-03-01T10:00:00.000Z",
                    "content_hash": format!("sha256:{:064x}", i + 1),
                    "status": "success",
                    "is_stored_at__image_location": format!("registry.example.com/v2/{service}"),
                    "is_a_build_of__service": [{ "id": 100 + i, "service_name": service }],
                }],
            })
        })
        .collect();

    json!({
        "id": 3023927,
        "commit": commit,
        "status": "success",
        "source": "cloud",
        "semver": semver,
        "semver_major": version.major,
        "semver_minor": version.minor,
        "semver_patch": version.patch,
        "is_invalidated": false,
        "is_final": true,
        "composition": { "version": "2.1", "services": {} },
        "created_at": "2024-03-01T10:00:00.000Z",
        "release_image": images,
        "release_tag": [
            { "tag_key": "channel", "value": "stable" },
            { "tag_key": "owner", "value": "platform" },
        ],
    })
}

pub fn bundle(manifest: &Value, schema: SchemaVersion) -> Cursor<Vec<u8>> {
    write_release_bundle(manifest, schema, vec![]).unwrap()
}

pub fn seed_application(store: &InMemoryStore, name: &str) -> u64 {
    store.seed(Resource::Application, json!({ "app_name": name }))
}

/// Successful release already present at the destination, with one linked image
pub fn seed_release(store: &InMemoryStore, application: u64, commit: &str, semver: &str) -> u64 {
    let version = semver::Version::parse(semver).unwrap();
    let release = store.seed(
        Resource::Release,
        json!({
            "belongs_to__application": application,
            "commit": commit,
            "status": "success",
            "semver": semver,
            "semver_major": version.major,
            "semver_minor": version.minor,
            "semver_patch": version.patch,
            "revision": 0,
        }),
    );
    let service = store.seed(
        Resource::Service,
        json!({ "application": application, "service_name": "main" }),
    );
    let image = store.seed(
        Resource::Image,
        json!({ "content_hash": "sha256:stale", "status": "success", "is_a_build_of__service": service }),
    );
    store.seed(
        Resource::ImageIsPartOfRelease,
        json!({ "image": image, "is_part_of__release": release }),
    );
    store.seed(
        Resource::ReleaseTag,
        json!({ "release": release, "tag_key": "stale", "value": "yes" }),
    );
    release
}

pub fn rows_where(store: &InMemoryStore, resource: Resource, field: &str, value: &Value) -> Vec<Value> {
    store
        .rows(resource)
        .into_iter()
        .filter(|row| row.get(field) == Some(value))
        .collect()
}
