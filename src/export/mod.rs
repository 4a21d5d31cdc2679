//! Assembly of a release bundle from a release in the remote store.
//!
//! Read-only against the store; the only other traffic is registry token
//! negotiation when image blobs are pulled.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Cursor;
use std::sync::Arc;
use tracing::{debug, info};

use crate::bundle::{sha256_digest, write_release_bundle, BundleResource};
use crate::error::{BundleError, BundleResult};
use crate::manifest::SchemaVersion;
use crate::registry::{parse_image_name, ImageDescriptor, RegistryClient, RegistryCredentials};
use crate::store::{Expand, Query, RemoteStore, Resource};

/// How strictly `create` treats a release's image association
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageRequirement {
    /// `release_image` must be present; an empty list is accepted
    #[default]
    Present,
    /// `release_image` must hold at least one entry
    NonEmpty,
}

const NOT_SUCCESSFUL: &str = "Could not create bundle from release; release bundles can only be created from successful releases.";
const NO_IMAGES: &str = "Could not create bundle from release; bundles can only be created from releases with successfully built images.";

/// The expanded release query `create` sends
pub fn release_query() -> Query {
    Query::new()
        .expand(Expand::new(
            "release_tag",
            Query::new().select(&["tag_key", "value"]),
        ))
        .expand(Expand::new(
            "release_image",
            Query::new().select(&["created_at", "image"]).expand(Expand::new(
                "image",
                Query::new()
                    .select(&[
                        "created_at",
                        "content_hash",
                        "end_timestamp",
                        "is_a_build_of__service",
                        "is_stored_at__image_location",
                        "push_timestamp",
                        "status",
                    ])
                    .expand(Expand::new(
                        "is_a_build_of__service",
                        Query::new().select(&["id", "service_name"]),
                    )),
            )),
        ))
}

pub struct ReleaseExporter {
    store: Arc<dyn RemoteStore>,
    registry: Option<Arc<dyn RegistryClient>>,
    image_requirement: ImageRequirement,
    schema: SchemaVersion,
}

impl ReleaseExporter {
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            registry: None,
            image_requirement: ImageRequirement::default(),
            schema: SchemaVersion::default(),
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn RegistryClient>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_image_requirement(mut self, requirement: ImageRequirement) -> Self {
        self.image_requirement = requirement;
        self
    }

    /// Schema label written into the bundle
    pub fn with_schema(mut self, schema: SchemaVersion) -> Self {
        self.schema = schema;
        self
    }

    /// Build a bundle for `release_id`.
    ///
    /// Image blobs are pulled only when a registry client is configured and
    /// `credentials` are given.
    pub async fn create(
        &self,
        release_id: u64,
        credentials: Option<&RegistryCredentials>,
    ) -> BundleResult<Cursor<Vec<u8>>> {
        let record = self
            .store
            .get_by_id(Resource::Release, release_id, &release_query())
            .await?
            .ok_or_else(|| BundleError::not_found(Resource::Release, "Release not found."))?;

        self.validate(&record)?;

        let resources = match (&self.registry, credentials) {
            (Some(registry), Some(credentials)) => {
                self.fetch_images(registry.as_ref(), &record, credentials)
                    .await?
            }
            _ => Vec::new(),
        };

        info!(
            release_id,
            schema = %self.schema,
            resources = resources.len(),
            "Writing release bundle"
        );
        write_release_bundle(&record, self.schema, resources).map_err(BundleError::Container)
    }

    fn validate(&self, record: &Value) -> BundleResult<()> {
        if record.get("status").and_then(Value::as_str) != Some("success") {
            return Err(BundleError::InvalidRelease(NOT_SUCCESSFUL.to_string()));
        }
        match record.get("release_image") {
            Some(Value::Array(images))
                if !images.is_empty() || self.image_requirement == ImageRequirement::Present =>
            {
                Ok(())
            }
            _ => Err(BundleError::InvalidRelease(NO_IMAGES.to_string())),
        }
    }

    async fn fetch_images(
        &self,
        registry: &dyn RegistryClient,
        record: &Value,
        credentials: &RegistryCredentials,
    ) -> BundleResult<Vec<BundleResource>> {
        let images = image_locations(record)
            .into_iter()
            .map(parse_image_name)
            .collect::<Result<Vec<ImageDescriptor>, _>>()?;
        if images.is_empty() {
            debug!("Release has no stored images to pull");
            return Ok(Vec::new());
        }

        let challenge = registry.discover_authenticate(&images).await?;
        let token = registry.authenticate(&challenge, credentials).await?;
        let blobs = registry.fetch_images(&images, &token).await?;

        Ok(blobs
            .into_iter()
            .map(|blob| {
                debug!(image = %blob.image, size = blob.data.len(), "Pulled image");
                BundleResource::new(sha256_digest(&blob.data), blob.media_type, blob.data)
            })
            .collect())
    }
}

/// `is_stored_at__image_location` of every expanded image
fn image_locations(record: &Value) -> Vec<&str> {
    record
        .get("release_image")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.get("image")?.as_array()?.first())
        .filter_map(|image| image.get("is_stored_at__image_location")?.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::read_release_bundle;
    use crate::registry::{AuthChallenge, ImageBlob, MockRegistryClient, RegistryToken};
    use crate::store::{InMemoryStore, MockRemoteStore};
    use serde_json::json;

    fn seeded_release(store: &InMemoryStore, status: &str, location: &str) -> u64 {
        let service = store.seed(Resource::Service, json!({ "service_name": "main" }));
        let image = store.seed(
            Resource::Image,
            json!({
                "content_hash": "sha256:aa",
                "status": "success",
                "is_a_build_of__service": service,
                "is_stored_at__image_location": location,
            }),
        );
        let release = store.seed(
            Resource::Release,
            json!({ "status": status, "commit": "abc", "semver": "1.0.0" }),
        );
        store.seed(
            Resource::ImageIsPartOfRelease,
            json!({ "image": image, "is_part_of__release": release }),
        );
        release
    }

    #[test]
    fn test_release_query_rendering() {
        let params = release_query().to_odata_params();
        assert_eq!(params[0].0, "$expand");
        assert!(params[0].1.starts_with("release_tag($select=tag_key,value),release_image("));
        assert!(params[0].1.contains("$expand=is_a_build_of__service($select=id,service_name)"));
    }

    #[tokio::test]
    async fn test_missing_release() {
        let mut store = MockRemoteStore::new();
        store.expect_get_by_id().returning(|_, _, _| Ok(None));
        let err = ReleaseExporter::new(Arc::new(store))
            .create(5, None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Release not found.");
    }

    #[tokio::test]
    async fn test_empty_images_follow_requirement() {
        let mut store = MockRemoteStore::new();
        store.expect_get_by_id().returning(|_, _, _| {
            Ok(Some(json!({ "id": 1, "status": "success", "release_image": [], "release_tag": [] })))
        });
        let store: Arc<dyn RemoteStore> = Arc::new(store);

        assert!(ReleaseExporter::new(store.clone()).create(1, None).await.is_ok());

        let err = ReleaseExporter::new(store)
            .with_image_requirement(ImageRequirement::NonEmpty)
            .create(1, None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("releases with successfully built images"));
    }

    #[tokio::test]
    async fn test_pulls_images_through_registry() {
        let store = Arc::new(InMemoryStore::new());
        let release = seeded_release(&store, "success", "registry.example.com/v2/abc@sha256:aa");

        let mut registry = MockRegistryClient::new();
        registry.expect_discover_authenticate().times(1).returning(|images| {
            Ok(AuthChallenge {
                realm: "https://auth.example.com".to_string(),
                service: "registry.example.com".to_string(),
                scopes: images.iter().map(ImageDescriptor::pull_scope).collect(),
            })
        });
        registry
            .expect_authenticate()
            .times(1)
            .returning(|_, _| Ok(RegistryToken("t0k3n".to_string())));
        registry.expect_fetch_images().times(1).returning(|images, token| {
            assert_eq!(token.0, "t0k3n");
            Ok(images
                .iter()
                .map(|image| ImageBlob {
                    image: image.clone(),
                    media_type: "application/x-tar".to_string(),
                    data: b"layer".to_vec(),
                })
                .collect())
        });

        let credentials = RegistryCredentials {
            username: "u".to_string(),
            password: "p".to_string(),
        };
        let stream = ReleaseExporter::new(store)
            .with_registry(Arc::new(registry))
            .create(release, Some(&credentials))
            .await
            .unwrap();

        let bundle = read_release_bundle(stream).unwrap();
        assert_eq!(bundle.resources.len(), 1);
        assert_eq!(bundle.resources[0].1, b"layer".to_vec());
        assert_eq!(bundle.resources[0].0.id, sha256_digest(b"layer"));
    }

    #[tokio::test]
    async fn test_identical_blobs_produce_readable_bundle() {
        let store = Arc::new(InMemoryStore::new());
        let release = seeded_release(&store, "success", "registry.example.com/v2/api");
        let service = store.seed(Resource::Service, json!({ "service_name": "worker" }));
        let image = store.seed(
            Resource::Image,
            json!({
                "content_hash": "sha256:aa",
                "status": "success",
                "is_a_build_of__service": service,
                "is_stored_at__image_location": "registry.example.com/v2/worker",
            }),
        );
        store.seed(
            Resource::ImageIsPartOfRelease,
            json!({ "image": image, "is_part_of__release": release }),
        );

        let mut registry = MockRegistryClient::new();
        registry.expect_discover_authenticate().returning(|_| {
            Ok(AuthChallenge {
                realm: "https://auth.example.com".to_string(),
                service: "registry.example.com".to_string(),
                scopes: Vec::new(),
            })
        });
        registry
            .expect_authenticate()
            .returning(|_, _| Ok(RegistryToken("t0k3n".to_string())));
        registry.expect_fetch_images().returning(|images, _| {
            assert_eq!(images.len(), 2);
            Ok(images
                .iter()
                .map(|image| ImageBlob {
                    image: image.clone(),
                    media_type: "application/x-tar".to_string(),
                    data: b"same".to_vec(),
                })
                .collect())
        });

        let credentials = RegistryCredentials {
            username: "u".to_string(),
            password: "p".to_string(),
        };
        let stream = ReleaseExporter::new(store)
            .with_registry(Arc::new(registry))
            .create(release, Some(&credentials))
            .await
            .unwrap();

        let bundle = read_release_bundle(stream).unwrap();
        assert_eq!(bundle.resources.len(), 1);
        assert_eq!(bundle.resources[0].0.id, sha256_digest(b"same"));
        assert_eq!(bundle.manifest.release_image.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_registry_ignored_without_credentials() {
        let store = Arc::new(InMemoryStore::new());
        let release = seeded_release(&store, "success", "registry.example.com/v2/abc");

        let mut registry = MockRegistryClient::new();
        registry.expect_discover_authenticate().never();

        let stream = ReleaseExporter::new(store)
            .with_registry(Arc::new(registry))
            .create(release, None)
            .await
            .unwrap();
        assert!(read_release_bundle(stream).unwrap().resources.is_empty());
    }
}
