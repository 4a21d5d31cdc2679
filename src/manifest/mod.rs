//! Release manifests: wire shape, schema variants and normalization.

pub mod normalize;
pub mod release;
pub mod schema;
pub mod types;

pub use normalize::{normalize, ValidationError};
pub use release::{Release, ReleaseImage, ReleaseTagEntry};
pub use schema::{SchemaVersion, UnknownSchema, SCHEMA_LABEL};
pub use types::{ManifestImage, ReleaseManifest, ReleasePhase, ReleaseStatus};
