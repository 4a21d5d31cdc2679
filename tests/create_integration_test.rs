//! Export scenarios and the export -> apply round trip

mod fixtures;

use fixtures::{rows_where, seed_application};
use release_bundle::apply::{ApplyOptions, NoBackfill, ReleaseApplier};
use release_bundle::cli::commands::apply::ApplyCommand;
use release_bundle::cli::commands::create::CreateCommand;
use release_bundle::cli::commands::inspect::InspectCommand;
use release_bundle::cli::commands::Command;
use release_bundle::export::ReleaseExporter;
use release_bundle::manifest::SchemaVersion;
use release_bundle::store::{InMemoryStore, Resource};
use release_bundle::{read_release_bundle, BundleError, ReleaseBundleConfig};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

/// Source release with two services, two images and one tag
fn seed_source(store: &InMemoryStore, status: &str) -> u64 {
    let app = seed_application(store, "source");
    let release = store.seed(
        Resource::Release,
        json!({
            "belongs_to__application": app,
            "commit": "7f3e2c1",
            "status": status,
            "semver": "3.1.4",
            "semver_major": 3,
            "semver_minor": 1,
            "semver_patch": 4,
            "source": "cloud",
            "note": "exported",
            "created_at": "2024-01-01T00:00:00.000Z",
        }),
    );
    for (name, hash) in [("api", "sha256:01"), ("db", "sha256:02")] {
        let service = store.seed(Resource::Service, json!({ "application": app, "service_name": name }));
        let image = store.seed(
            Resource::Image,
            json!({
                "content_hash": hash,
                "status": "success",
                "is_a_build_of__service": service,
                "is_stored_at__image_location": format!("registry.example.com/v2/{name}"),
                "created_at": "2024-01-01T00:00:00.000Z",
            }),
        );
        store.seed(
            Resource::ImageIsPartOfRelease,
            json!({ "image": image, "is_part_of__release": release, "created_at": "2024-01-01T00:00:00.000Z" }),
        );
    }
    store.seed(Resource::ReleaseTag, json!({ "release": release, "tag_key": "channel", "value": "beta" }));
    release
}

#[tokio::test]
async fn test_create_from_failed_release_is_rejected() {
    let store = Arc::new(InMemoryStore::new());
    let release = seed_source(&store, "failed");

    let err = ReleaseExporter::new(store).create(release, None).await.unwrap_err();

    assert!(matches!(err, BundleError::InvalidRelease(_)));
    assert!(err.to_string().contains("can only be created from successful releases"));
}

#[tokio::test]
async fn test_create_missing_release() {
    let store = Arc::new(InMemoryStore::new());
    let err = ReleaseExporter::new(store).create(999, None).await.unwrap_err();
    assert_eq!(err.to_string(), "Release not found.");
}

#[tokio::test]
async fn test_create_is_read_only() {
    let store = Arc::new(InMemoryStore::new());
    let release = seed_source(&store, "success");

    ReleaseExporter::new(store.clone()).create(release, None).await.unwrap();
    assert!(store.mutations().is_empty());
}

#[tokio::test]
async fn test_bundle_holds_expanded_manifest() {
    let store = Arc::new(InMemoryStore::new());
    let release = seed_source(&store, "success");

    let stream = ReleaseExporter::new(store)
        .with_schema(SchemaVersion::Revisioned)
        .create(release, None)
        .await
        .unwrap();
    let bundle = read_release_bundle(stream).unwrap();

    assert_eq!(bundle.schema_label.as_deref(), Some("v3"));
    let manifest = bundle.manifest;
    assert_eq!(manifest.note.as_deref(), Some("exported"));
    assert_eq!(manifest.release_tag, json!([{ "tag_key": "channel", "value": "beta" }]));
    let images = manifest.release_image.as_array().unwrap();
    assert_eq!(images.len(), 2);
    assert_eq!(
        images[0]["image"][0]["is_a_build_of__service"][0]["service_name"],
        "api"
    );
}

#[tokio::test]
async fn test_export_then_apply_round_trip() {
    let source = Arc::new(InMemoryStore::new());
    let release = seed_source(&source, "success");
    let stream = ReleaseExporter::new(source).create(release, None).await.unwrap();

    let destination = Arc::new(InMemoryStore::new());
    let app = seed_application(&destination, "destination");
    let new_id = ReleaseApplier::new(destination.clone())
        .with_backfill(Arc::new(NoBackfill))
        .apply(app, stream, &ApplyOptions::default())
        .await
        .unwrap();

    let created = destination.row(Resource::Release, new_id).unwrap();
    assert_eq!(created["commit"], "7f3e2c1");
    assert_eq!(created["semver"], "3.1.4");
    assert_eq!(created["note"], "exported");
    assert_eq!(created["status"], "success");

    let mut names: Vec<String> = destination
        .rows(Resource::Service)
        .iter()
        .map(|s| s["service_name"].as_str().unwrap().to_string())
        .collect();
    names.sort();
    assert_eq!(names, vec!["api", "db"]);

    let hashes: Vec<_> = destination
        .rows(Resource::Image)
        .iter()
        .map(|i| i["content_hash"].clone())
        .collect();
    assert_eq!(hashes, vec![json!("sha256:01"), json!("sha256:02")]);
    assert_eq!(
        rows_where(&destination, Resource::ImageIsPartOfRelease, "is_part_of__release", &json!(new_id)).len(),
        2
    );
}

#[tokio::test]
async fn test_cli_commands_share_bundle_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("release.tar");
    let config = ReleaseBundleConfig::default();

    let source = Arc::new(InMemoryStore::new());
    let release = seed_source(&source, "success");
    CreateCommand::new(release, config.clone())
        .with_output(Some(path.clone()))
        .with_store(source)
        .execute()
        .await
        .unwrap();
    assert!(path.exists());

    let inspected = InspectCommand::new(path.clone()).load().unwrap();
    assert_eq!(inspected.version.to_string(), "3.1.4");
    assert_eq!(inspected.release_images.len(), 2);

    let mut config = config;
    config.apply.backfill_delay_ms = 0;
    let destination = Arc::new(InMemoryStore::new());
    let app = seed_application(&destination, "destination");
    ApplyCommand::new(app, path.clone(), config.clone())
        .with_store(destination.clone())
        .execute()
        .await
        .unwrap();

    let err = ApplyCommand::new(app, path, config)
        .with_store(destination.clone())
        .execute()
        .await
        .unwrap_err();
    assert!(err.to_string().contains("already exists"));
    assert_eq!(rows_where(&destination, Resource::Release, "status", &json!("success")).len(), 1);
}

#[test]
fn test_inspect_rejects_garbage_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("not-a-bundle.tar");
    std::fs::write(&path, b"definitely not a tar archive").unwrap();

    let err = InspectCommand::new(path).load().unwrap_err();
    assert!(err.to_string().starts_with("Manifest is malformed"));
}

#[tokio::test]
async fn test_apply_reports_unreadable_bundle_path() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(InMemoryStore::new());
    let app = seed_application(&store, "destination");

    let err = ApplyCommand::new(app, dir.path().join("missing.tar"), ReleaseBundleConfig::default())
        .with_store(store.clone())
        .execute()
        .await
        .unwrap_err();

    assert!(err.to_string().starts_with("Failed to read bundle"));
    assert!(store.mutations().is_empty());
}
