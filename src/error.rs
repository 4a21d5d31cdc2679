use thiserror::Error;

use crate::bundle::ContainerError;
use crate::manifest::{UnknownSchema, ValidationError};
use crate::registry::RegistryError;
use crate::store::{Resource, StoreError};

/// Why a bundle could not be read, normalized or validated
#[derive(Debug, Error)]
pub enum MalformedReason {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error(transparent)]
    Schema(#[from] UnknownSchema),
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("Manifest is malformed: {0}")]
    Malformed(#[from] MalformedReason),

    #[error(
        "A successful release with the version {version} (commit {commit}) already exists and duplicates are not allowed."
    )]
    Conflict { version: String, commit: String },

    #[error("{message}")]
    NotFound { resource: Resource, message: String },

    #[error("{0}")]
    InvalidRelease(String),

    #[error(transparent)]
    Remote(#[from] StoreError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Failed to write bundle: {0}")]
    Container(ContainerError),
}

impl BundleError {
    pub fn malformed(reason: impl Into<MalformedReason>) -> Self {
        BundleError::Malformed(reason.into())
    }

    pub fn not_found(resource: Resource, message: impl Into<String>) -> Self {
        BundleError::NotFound {
            resource,
            message: message.into(),
        }
    }

    /// Whether retrying the same call could succeed without changing input
    pub fn is_transient(&self) -> bool {
        match self {
            BundleError::Remote(StoreError::Transport(_)) => true,
            BundleError::Remote(e) => matches!(e.status_code(), Some(429) | Some(500..=599)),
            _ => false,
        }
    }
}

pub type BundleResult<T> = Result<T, BundleError>;
