//! Remote data store boundary
//!
//! The reconciliation engine and the export assembler only talk to the
//! remote system through [`RemoteStore`]. Callers hand in an already
//! authenticated handle; nothing in the core builds sessions itself.

pub mod error;
pub mod http;
#[cfg(any(test, feature = "testing"))]
pub mod memory;
pub mod models;
pub mod query;

use async_trait::async_trait;
use serde_json::{Map, Value};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

pub use error::{StoreError, StoreResult};
pub use http::HttpStore;
#[cfg(any(test, feature = "testing"))]
pub use memory::{InMemoryStore, Mutation, Operation};
pub use models::{record_id, reference_id, ReleaseRecord};
pub use query::{Expand, Filter, OrderBy, Query, Resource};

/// Typed CRUD primitives of the remote store
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Query a collection
    async fn get(&self, resource: Resource, query: &Query) -> StoreResult<Vec<Value>>;

    /// Fetch one record; `Ok(None)` when it does not exist
    async fn get_by_id(&self, resource: Resource, id: u64, query: &Query)
        -> StoreResult<Option<Value>>;

    /// Create a record and return it, including its new `id`
    async fn post(&self, resource: Resource, body: &Value) -> StoreResult<Value>;

    async fn patch(&self, resource: Resource, id: u64, body: &Value) -> StoreResult<()>;

    async fn delete(&self, resource: Resource, id: u64) -> StoreResult<()>;

    /// Return the record matching every field of `natural_key`, creating it
    /// from `body` when none exists
    async fn get_or_create(
        &self,
        resource: Resource,
        natural_key: &Map<String, Value>,
        body: &Value,
    ) -> StoreResult<Value>;
}
