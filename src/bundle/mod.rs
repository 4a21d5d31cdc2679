//! Release bundles
//!
//! A bundle is an uncompressed tar archive:
//!
//! ```text
//! <name>.tar
//! ├── contents.json      # format version, type tag, labels, manifest, resource descriptors
//! └── resources/
//!     └── <id>           # one file per binary resource, sha256-verified on read
//! ```

pub mod reader;
pub mod release;
pub mod types;
pub mod writer;

pub use reader::read_bundle;
pub use release::{read_release_bundle, write_release_bundle, ReleaseBundle, RELEASE_BUNDLE_TYPE};
pub use types::{
    sha256_digest, BundleHeader, BundleResource, ContainerError, ContainerResult, ReadableBundle,
    ResourceDescriptor, BUNDLE_FORMAT_VERSION,
};
pub use writer::WritableBundle;
