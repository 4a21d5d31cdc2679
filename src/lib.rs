// release-bundle library - portable release bundles
// Exposes the bundle format, the manifest normalizer, the apply and create
// pipelines and the remote store boundary for the binary and for tests.

pub mod apply;
pub mod bundle;
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod manifest;
pub mod observability;
pub mod registry;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use apply::{ApplyOptions, ApplyPhase, CleanupPolicy, ReleaseApplier};
pub use bundle::{read_release_bundle, write_release_bundle, ReleaseBundle, RELEASE_BUNDLE_TYPE};
pub use config::{config, init_config, ReleaseBundleConfig};
pub use error::{BundleError, BundleResult};
pub use export::{ImageRequirement, ReleaseExporter};
pub use manifest::{normalize, Release, ReleaseManifest, SchemaVersion, ValidationError};
pub use observability::{store_metrics, OperationTimer, StoreApiMetrics};
pub use store::{HttpStore, RemoteStore, StoreError};
#[cfg(any(test, feature = "testing"))]
pub use store::InMemoryStore;
pub use telemetry::{create_bundle_span, generate_correlation_id, init_telemetry};
