//! Container registry collaborator used by the export path to pull image
//! blobs into a bundle.

pub mod name;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

pub use name::{parse_image_name, ImageDescriptor, ImageReference};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Invalid image name '{0}'")]
    InvalidImageName(String),

    #[error("Registry authentication failed: {0}")]
    Authentication(String),

    #[error("Failed to fetch {image}: {message}")]
    Fetch { image: String, message: String },
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Credentials presented to the registry's token service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryCredentials {
    pub username: String,
    pub password: String,
}

/// What a registry asks for before it serves an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthChallenge {
    pub realm: String,
    pub service: String,
    pub scopes: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryToken(pub String);

/// One pulled image, as a single archive blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageBlob {
    pub image: ImageDescriptor,
    pub media_type: String,
    pub data: Vec<u8>,
}

#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Ask the registry which token service guards `images`
    async fn discover_authenticate(
        &self,
        images: &[ImageDescriptor],
    ) -> RegistryResult<AuthChallenge>;

    async fn authenticate(
        &self,
        challenge: &AuthChallenge,
        credentials: &RegistryCredentials,
    ) -> RegistryResult<RegistryToken>;

    async fn fetch_images(
        &self,
        images: &[ImageDescriptor],
        token: &RegistryToken,
    ) -> RegistryResult<Vec<ImageBlob>>;
}
