use thiserror::Error;

use crate::store::query::Resource;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{method} {resource} failed with HTTP {status}: {message}")]
    Http {
        method: &'static str,
        resource: Resource,
        status: u16,
        message: String,
    },

    #[error("Request to remote store failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Unexpected response from remote store: {0}")]
    Decode(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("{resource} with id {id} does not exist")]
    Missing { resource: Resource, id: u64 },

    #[error("Remote store rejected {operation} on {resource}")]
    Rejected {
        operation: &'static str,
        resource: Resource,
    },
}

impl StoreError {
    pub fn status_code(&self) -> Option<u16> {
        match self {
            StoreError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
