//! Revision backfill.
//!
//! The destination only accepts revision N of a version once revisions
//! 0..N-1 of the same major/minor/patch exist. Placeholder releases with
//! status `failed` fill the gap.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::apply::pacing::WritePacer;
use crate::manifest::{Release, ReleaseStatus};
use crate::store::{record_id, Filter, Query, RemoteStore, Resource, StoreResult};

#[async_trait]
pub trait RevisionBackfill: Send + Sync {
    /// Make sure every revision below `release.revision` exists for the
    /// release's version in `application_id`. Returns the ids of the
    /// releases it created.
    async fn ensure_prior_revisions_exist(
        &self,
        store: &dyn RemoteStore,
        application_id: u64,
        release: &Release,
        timestamp: &str,
    ) -> StoreResult<Vec<u64>>;
}

/// Skip backfill entirely
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackfill;

#[async_trait]
impl RevisionBackfill for NoBackfill {
    async fn ensure_prior_revisions_exist(
        &self,
        _store: &dyn RemoteStore,
        _application_id: u64,
        _release: &Release,
        _timestamp: &str,
    ) -> StoreResult<Vec<u64>> {
        Ok(Vec::new())
    }
}

/// Create `failed` placeholder releases for missing revisions
pub struct PlaceholderBackfill {
    pacer: Arc<dyn WritePacer>,
}

impl PlaceholderBackfill {
    pub fn new(pacer: Arc<dyn WritePacer>) -> Self {
        Self { pacer }
    }
}

fn version_filter(application_id: u64, release: &Release) -> Filter {
    Filter::and([
        Filter::eq("belongs_to__application", application_id),
        Filter::eq("semver_major", release.version.major),
        Filter::eq("semver_minor", release.version.minor),
        Filter::eq("semver_patch", release.version.patch),
        Filter::ne("revision", Value::Null),
    ])
}

async fn highest_revision(
    store: &dyn RemoteStore,
    application_id: u64,
    release: &Release,
) -> StoreResult<Option<u64>> {
    let query = Query::new()
        .filter(version_filter(application_id, release))
        .select(&["revision"])
        .order_by_desc("revision")
        .top(1);
    let rows = store.get(Resource::Release, &query).await?;
    Ok(rows
        .first()
        .and_then(|row| row.get("revision"))
        .and_then(Value::as_u64))
}

fn placeholder_body(application_id: u64, release: &Release, revision: u64, timestamp: &str) -> Value {
    let version = &release.version;
    json!({
        "belongs_to__application": application_id,
        "commit": Uuid::new_v4().simple().to_string(),
        "status": ReleaseStatus::Failed.as_str(),
        "composition": {},
        "source": "cloud",
        "start_timestamp": timestamp,
        "end_timestamp": timestamp,
        "semver": format!("{}.{}.{}", version.major, version.minor, version.patch),
        "semver_major": version.major,
        "semver_minor": version.minor,
        "semver_patch": version.patch,
        "revision": revision,
    })
}

#[async_trait]
impl RevisionBackfill for PlaceholderBackfill {
    async fn ensure_prior_revisions_exist(
        &self,
        store: &dyn RemoteStore,
        application_id: u64,
        release: &Release,
        timestamp: &str,
    ) -> StoreResult<Vec<u64>> {
        let target = match release.revision {
            Some(revision) if revision > 0 => u64::from(revision),
            _ => return Ok(Vec::new()),
        };

        let first_missing = highest_revision(store, application_id, release)
            .await?
            .map_or(0, |highest| highest + 1);
        if first_missing >= target {
            debug!(target, "No revisions missing");
            return Ok(Vec::new());
        }

        info!(
            application_id,
            from = first_missing,
            to = target - 1,
            "Creating placeholder releases for missing revisions"
        );

        let mut created = Vec::new();
        for revision in first_missing..target {
            if !created.is_empty() {
                self.pacer.pace().await;
            }
            let body = placeholder_body(application_id, release, revision, timestamp);
            let record = store.post(Resource::Release, &body).await?;
            created.push(record_id(&record)?);
        }
        Ok(created)
    }
}
