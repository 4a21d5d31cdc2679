//! Removal of stale state when a duplicate release is overwritten.
//!
//! The stale release record itself is never deleted; only what hangs off it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

use crate::store::{record_id, reference_id, Filter, Query, RemoteStore, Resource, StoreResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupPolicy {
    /// Delete the release's `image__is_part_of__release` rows
    #[default]
    JoinRowsOnly,
    /// Also delete the release's tags and the images it linked
    Cascade,
}

impl CleanupPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupPolicy::JoinRowsOnly => "join_rows_only",
            CleanupPolicy::Cascade => "cascade",
        }
    }

    pub async fn clean(&self, store: &dyn RemoteStore, release_id: u64) -> StoreResult<CleanupReport> {
        let mut report = CleanupReport::default();

        let join_rows = store
            .get(
                Resource::ImageIsPartOfRelease,
                &Query::new()
                    .filter(Filter::eq("is_part_of__release", release_id))
                    .select(&["id", "image"]),
            )
            .await?;

        let mut image_ids = Vec::new();
        for row in &join_rows {
            store.delete(Resource::ImageIsPartOfRelease, record_id(row)?).await?;
            report.join_rows += 1;
            if let Some(image) = row.get("image").and_then(reference_id) {
                image_ids.push(image);
            }
        }

        if *self == CleanupPolicy::Cascade {
            let tags = store
                .get(
                    Resource::ReleaseTag,
                    &Query::new()
                        .filter(Filter::eq("release", release_id))
                        .select(&["id"]),
                )
                .await?;
            for tag in &tags {
                store.delete(Resource::ReleaseTag, record_id(tag)?).await?;
                report.tags += 1;
            }
            for image in image_ids {
                store.delete(Resource::Image, image).await?;
                report.images += 1;
            }
        }

        info!(
            release_id,
            policy = self.as_str(),
            join_rows = report.join_rows,
            tags = report.tags,
            images = report.images,
            "Cleaned up stale release"
        );
        Ok(report)
    }
}

impl fmt::Display for CleanupPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CleanupPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "join_rows_only" | "join_rows" => Ok(CleanupPolicy::JoinRowsOnly),
            "cascade" => Ok(CleanupPolicy::Cascade),
            other => Err(format!(
                "unknown cleanup policy '{other}' (expected join_rows_only or cascade)"
            )),
        }
    }
}

/// Number of records removed from one stale release
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub join_rows: usize,
    pub tags: usize,
    pub images: usize,
}

impl CleanupReport {
    pub fn merge(&mut self, other: CleanupReport) {
        self.join_rows += other.join_rows;
        self.tags += other.tags;
        self.images += other.images;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use serde_json::json;

    fn stale_release(store: &InMemoryStore) -> (u64, u64) {
        let release = store.seed(Resource::Release, json!({ "status": "success" }));
        let image = store.seed(Resource::Image, json!({ "content_hash": "sha256:aa" }));
        store.seed(
            Resource::ImageIsPartOfRelease,
            json!({ "image": image, "is_part_of__release": release }),
        );
        store.seed(Resource::ReleaseTag, json!({ "release": release, "tag_key": "k", "value": "v" }));
        (release, image)
    }

    #[tokio::test]
    async fn test_join_rows_only_keeps_tags_and_images() {
        let store = InMemoryStore::new();
        let (release, image) = stale_release(&store);

        let report = CleanupPolicy::JoinRowsOnly.clean(&store, release).await.unwrap();

        assert_eq!(report, CleanupReport { join_rows: 1, tags: 0, images: 0 });
        assert_eq!(store.count(Resource::ImageIsPartOfRelease), 0);
        assert_eq!(store.count(Resource::ReleaseTag), 1);
        assert!(store.row(Resource::Image, image).is_some());
        assert!(store.row(Resource::Release, release).is_some());
    }

    #[tokio::test]
    async fn test_cascade_removes_tags_and_images() {
        let store = InMemoryStore::new();
        let (release, image) = stale_release(&store);

        let report = CleanupPolicy::Cascade.clean(&store, release).await.unwrap();

        assert_eq!(report, CleanupReport { join_rows: 1, tags: 1, images: 1 });
        assert!(store.row(Resource::Image, image).is_none());
        assert!(store.row(Resource::Release, release).is_some());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("cascade".parse::<CleanupPolicy>().unwrap(), CleanupPolicy::Cascade);
        assert_eq!(
            "join-rows-only".parse::<CleanupPolicy>().unwrap(),
            CleanupPolicy::JoinRowsOnly
        );
        assert!("everything".parse::<CleanupPolicy>().is_err());
    }
}
