use serde_json::Value;

use crate::manifest::{Release, ReleaseStatus, SchemaVersion};
use crate::store::models::decode;
use crate::store::{Filter, Query, ReleaseRecord, RemoteStore, Resource, StoreResult};

/// Filter selecting successful releases of `application_id` that the
/// release's schema considers the same release
pub fn duplicate_filter(application_id: u64, release: &Release) -> Filter {
    let version = &release.version;
    let triple = || {
        vec![
            Filter::eq("semver_major", version.major),
            Filter::eq("semver_minor", version.minor),
            Filter::eq("semver_patch", version.patch),
        ]
    };

    let identity = match release.schema {
        SchemaVersion::Triple => Filter::and(triple()),
        SchemaVersion::Semver => Filter::eq("semver", release.semver()),
        SchemaVersion::Revisioned => {
            let revision = release.revision.map_or(Value::Null, Value::from);
            let mut fields = triple();
            fields.push(Filter::eq("revision", revision));
            Filter::and(fields)
        }
    };
    let identity = match (&release.commit, release.schema.matches_on_commit()) {
        (Some(commit), true) => Filter::or([Filter::eq("commit", commit.as_str()), identity]),
        _ => identity,
    };

    Filter::and([
        Filter::eq("belongs_to__application", application_id),
        Filter::eq("status", ReleaseStatus::Success.as_str()),
        identity,
    ])
}

pub async fn find_duplicates(
    store: &dyn RemoteStore,
    application_id: u64,
    release: &Release,
) -> StoreResult<Vec<ReleaseRecord>> {
    let query = Query::new()
        .filter(duplicate_filter(application_id, release))
        .select(&[
            "id",
            "commit",
            "semver",
            "semver_major",
            "semver_minor",
            "semver_patch",
            "revision",
        ]);
    store
        .get(Resource::Release, &query)
        .await?
        .into_iter()
        .map(decode)
        .collect()
}
