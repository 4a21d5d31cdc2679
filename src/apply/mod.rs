//! Reconciliation of a release bundle onto a destination application.
//!
//! `apply` walks a fixed, fail-fast sequence of phases (see [`ApplyPhase`]).
//! Nothing is retried and nothing is rolled back: a failure part way through
//! leaves whatever was already written at the destination.

pub mod backfill;
pub mod cleanup;
pub mod duplicates;
pub mod pacing;

use chrono::{SecondsFormat, Utc};
use futures::future::try_join_all;
use serde_json::{json, Map, Value};
use std::fmt;
use std::io::Read;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bundle::{read_release_bundle, ReleaseBundle};
use crate::config::ApplyConfig;
use crate::error::{BundleError, BundleResult};
use crate::manifest::{normalize, Release, ReleaseImage, ReleaseManifest, SchemaVersion};
use crate::store::{record_id, Query, RemoteStore, Resource};

pub use backfill::{NoBackfill, PlaceholderBackfill, RevisionBackfill};
pub use cleanup::{CleanupPolicy, CleanupReport};
pub use duplicates::{duplicate_filter, find_duplicates};
pub use pacing::{backfill_pacer, FixedDelay, GovernorPacer, NoDelay, WritePacer};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Overwrite an existing successful release with the same identity
    pub force: bool,
    /// Replace the manifest's semantic version
    pub version_override: Option<String>,
    /// Schema to read the manifest with, ahead of the bundle's own label
    pub schema: Option<SchemaVersion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyPhase {
    Load,
    ValidateTarget,
    DetectDuplicates,
    BackfillRevisions,
    CreateRelease,
    CreateTags,
    CreateImages,
    Finalize,
}

impl ApplyPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApplyPhase::Load => "load",
            ApplyPhase::ValidateTarget => "validate-target",
            ApplyPhase::DetectDuplicates => "detect-duplicates",
            ApplyPhase::BackfillRevisions => "backfill-revisions",
            ApplyPhase::CreateRelease => "create-release",
            ApplyPhase::CreateTags => "create-tags",
            ApplyPhase::CreateImages => "create-images",
            ApplyPhase::Finalize => "finalize",
        }
    }
}

impl fmt::Display for ApplyPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Applies release bundles through an already authenticated store handle
pub struct ReleaseApplier {
    store: Arc<dyn RemoteStore>,
    backfill: Arc<dyn RevisionBackfill>,
    cleanup: CleanupPolicy,
    default_schema: SchemaVersion,
}

impl ReleaseApplier {
    /// Applier with placeholder backfill paced at one write per second
    pub fn new(store: Arc<dyn RemoteStore>) -> Self {
        Self {
            store,
            backfill: Arc::new(PlaceholderBackfill::new(Arc::new(FixedDelay::from_millis(1000)))),
            cleanup: CleanupPolicy::default(),
            default_schema: SchemaVersion::default(),
        }
    }

    pub fn from_config(store: Arc<dyn RemoteStore>, config: &ApplyConfig) -> Self {
        Self::new(store)
            .with_backfill(Arc::new(PlaceholderBackfill::new(backfill_pacer(config))))
            .with_cleanup_policy(config.cleanup_policy)
            .with_default_schema(config.schema)
    }

    pub fn with_backfill(mut self, backfill: Arc<dyn RevisionBackfill>) -> Self {
        self.backfill = backfill;
        self
    }

    pub fn with_cleanup_policy(mut self, policy: CleanupPolicy) -> Self {
        self.cleanup = policy;
        self
    }

    pub fn with_default_schema(mut self, schema: SchemaVersion) -> Self {
        self.default_schema = schema;
        self
    }

    /// Read a bundle and create its release in `application_id`.
    ///
    /// Returns the id of the new release.
    pub async fn apply<R: Read>(
        &self,
        application_id: u64,
        bundle: R,
        options: &ApplyOptions,
    ) -> BundleResult<u64> {
        debug!(phase = %ApplyPhase::Load, "Reading release bundle");
        let bundle = read_release_bundle(bundle).map_err(BundleError::malformed)?;
        self.apply_bundle(application_id, &bundle, options).await
    }

    pub async fn apply_bundle(
        &self,
        application_id: u64,
        bundle: &ReleaseBundle,
        options: &ApplyOptions,
    ) -> BundleResult<u64> {
        let schema = SchemaVersion::resolve(
            options.schema,
            bundle.schema_label.as_deref(),
            self.default_schema,
        )
        .map_err(BundleError::malformed)?;
        let release = normalize(&bundle.manifest, schema, options.version_override.as_deref())
            .map_err(BundleError::malformed)?;

        info!(
            application_id,
            schema = %schema,
            version = %release.version,
            images = release.release_images.len(),
            tags = release.release_tags.len(),
            "Applying release bundle"
        );

        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let store = self.store.as_ref();

        debug!(phase = %ApplyPhase::ValidateTarget, application_id);
        store
            .get_by_id(Resource::Application, application_id, &Query::new().select(&["id"]))
            .await?
            .ok_or_else(|| {
                BundleError::not_found(
                    Resource::Application,
                    format!("Application not found: {application_id}"),
                )
            })?;

        debug!(phase = %ApplyPhase::DetectDuplicates);
        self.resolve_duplicates(application_id, &release, options.force)
            .await?;

        debug!(phase = %ApplyPhase::BackfillRevisions);
        let placeholders = self
            .backfill
            .ensure_prior_revisions_exist(store, application_id, &release, &now)
            .await?;
        if !placeholders.is_empty() {
            info!(count = placeholders.len(), "Created placeholder revisions");
        }

        debug!(phase = %ApplyPhase::CreateRelease);
        let body = release_body(application_id, &bundle.manifest, &release, options, &now);
        let release_id = record_id(&store.post(Resource::Release, &body).await?)?;
        info!(release_id, "Created release");

        debug!(phase = %ApplyPhase::CreateTags, release_id);
        let tags: Vec<Value> = release
            .release_tags
            .iter()
            .map(|tag| {
                json!({
                    "release": release_id,
                    "tag_key": tag.tag_key,
                    "value": tag.value,
                })
            })
            .collect();
        try_join_all(tags.iter().map(|tag| store.post(Resource::ReleaseTag, tag))).await?;

        debug!(phase = %ApplyPhase::CreateImages, release_id);
        for image in &release.release_images {
            self.create_image(application_id, release_id, image, &now)
                .await?;
        }

        debug!(phase = %ApplyPhase::Finalize, release_id);
        store
            .patch(
                Resource::Release,
                release_id,
                &json!({
                    "status": release.status.as_str(),
                    "end_timestamp": now,
                    "update_timestamp": now,
                }),
            )
            .await?;

        info!(release_id, status = %release.status, "Release applied");
        Ok(release_id)
    }

    async fn resolve_duplicates(
        &self,
        application_id: u64,
        release: &Release,
        force: bool,
    ) -> BundleResult<()> {
        let store = self.store.as_ref();
        let duplicates = find_duplicates(store, application_id, release).await?;
        let Some(first) = duplicates.first() else {
            return Ok(());
        };

        if !force {
            return Err(BundleError::Conflict {
                version: first.version_label(),
                commit: first.commit.clone().unwrap_or_else(|| "unknown".to_string()),
            });
        }

        let mut report = CleanupReport::default();
        for stale in &duplicates {
            warn!(
                release_id = stale.id,
                version = %stale.version_label(),
                policy = %self.cleanup,
                "Overwriting existing release"
            );
            report.merge(self.cleanup.clean(store, stale.id).await?);
        }
        debug!(?report, "Stale releases cleaned up");
        Ok(())
    }

    async fn create_image(
        &self,
        application_id: u64,
        release_id: u64,
        entry: &ReleaseImage,
        now: &str,
    ) -> BundleResult<()> {
        let store = self.store.as_ref();

        let mut service_key = Map::new();
        service_key.insert("application".to_string(), Value::from(application_id));
        service_key.insert("service_name".to_string(), Value::from(entry.service.as_str()));
        let service = store
            .get_or_create(Resource::Service, &service_key, &Value::Object(service_key.clone()))
            .await?;
        let service_id = record_id(&service)?;

        let image = &entry.image;
        let mut body = Map::new();
        body.insert("content_hash".to_string(), Value::from(image.content_hash.as_str()));
        body.insert("is_a_build_of__service".to_string(), Value::from(service_id));
        body.insert("status".to_string(), Value::from("running"));
        body.insert("start_timestamp".to_string(), Value::from(now));
        body.insert("push_timestamp".to_string(), Value::from(now));
        insert_some(&mut body, "image_size", image.image_size.map(Value::from));
        insert_some(&mut body, "project_type", image.project_type.as_deref().map(Value::from));
        insert_some(&mut body, "dockerfile", image.dockerfile.as_deref().map(Value::from));
        insert_some(&mut body, "contract", image.contract.clone());
        insert_some(&mut body, "build_log", image.build_log.as_deref().map(Value::from));

        let image_id = record_id(&store.post(Resource::Image, &Value::Object(body)).await?)?;
        store
            .post(
                Resource::ImageIsPartOfRelease,
                &json!({ "is_part_of__release": release_id, "image": image_id }),
            )
            .await?;
        store
            .patch(
                Resource::Image,
                image_id,
                &json!({ "status": image.status.as_str(), "end_timestamp": now }),
            )
            .await?;

        debug!(image_id, service = %entry.service, "Created image");
        Ok(())
    }
}

fn insert_some(body: &mut Map<String, Value>, key: &str, value: Option<Value>) {
    if let Some(value) = value.filter(|v| !v.is_null()) {
        body.insert(key.to_string(), value);
    }
}

/// Body of the new release record. Descriptive fields come from the
/// manifest, identity from the normalized release. `created_at` is left to
/// the destination.
fn release_body(
    application_id: u64,
    manifest: &ReleaseManifest,
    release: &Release,
    options: &ApplyOptions,
    now: &str,
) -> Value {
    let version = &release.version;
    let (prerelease, build) = if options.version_override.is_some() {
        (
            Some(version.pre.as_str().to_string()).filter(|s| !s.is_empty()),
            Some(version.build.as_str().to_string()).filter(|s| !s.is_empty()),
        )
    } else {
        (manifest.semver_prerelease.clone(), manifest.semver_build.clone())
    };

    let mut body = Map::new();
    body.insert("belongs_to__application".to_string(), Value::from(application_id));
    insert_some(&mut body, "commit", release.commit.as_deref().map(Value::from));
    insert_some(&mut body, "composition", manifest.composition.clone());
    insert_some(&mut body, "contract", manifest.contract.clone());
    body.insert("status".to_string(), Value::from("running"));
    insert_some(&mut body, "source", manifest.source.as_deref().map(Value::from));
    insert_some(&mut body, "build_log", manifest.build_log.as_deref().map(Value::from));
    insert_some(&mut body, "is_invalidated", manifest.is_invalidated.map(Value::from));
    body.insert("start_timestamp".to_string(), Value::from(now));
    body.insert("end_timestamp".to_string(), Value::from(now));
    body.insert("update_timestamp".to_string(), Value::from(now));
    insert_some(
        &mut body,
        "phase",
        manifest.phase.and_then(|p| serde_json::to_value(p).ok()),
    );
    body.insert("semver".to_string(), Value::from(release.semver()));
    body.insert("semver_major".to_string(), Value::from(version.major));
    body.insert("semver_minor".to_string(), Value::from(version.minor));
    body.insert("semver_patch".to_string(), Value::from(version.patch));
    insert_some(&mut body, "semver_prerelease", prerelease.map(Value::from));
    insert_some(&mut body, "semver_build", build.map(Value::from));
    insert_some(&mut body, "revision", release.revision.map(Value::from));
    insert_some(&mut body, "variant", manifest.variant.as_deref().map(Value::from));
    insert_some(
        &mut body,
        "known_issue_list",
        manifest.known_issue_list.as_deref().map(Value::from),
    );
    insert_some(&mut body, "raw_version", manifest.raw_version.as_deref().map(Value::from));
    insert_some(&mut body, "is_final", manifest.is_final.map(Value::from));
    insert_some(
        &mut body,
        "is_finalized_at__date",
        manifest.is_finalized_at_date.as_deref().map(Value::from),
    );
    insert_some(&mut body, "note", manifest.note.as_deref().map(Value::from));
    insert_some(
        &mut body,
        "invalidation_reason",
        manifest.invalidation_reason.as_deref().map(Value::from),
    );
    Value::Object(body)
}
