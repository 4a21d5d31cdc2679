//! In-memory remote store.
//!
//! Evaluates filters, ordering, projection and navigation expansion locally,
//! records every mutation and can be told to reject operations. Used by the
//! test suites to drive the applier and exporter without a backend.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::store::error::{StoreError, StoreResult};
use crate::store::query::{compare_values, values_equal, Filter, Query, Resource};
use crate::store::RemoteStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Get,
    Post,
    Patch,
    Delete,
}

impl Operation {
    fn as_str(&self) -> &'static str {
        match self {
            Operation::Get => "GET",
            Operation::Post => "POST",
            Operation::Patch => "PATCH",
            Operation::Delete => "DELETE",
        }
    }
}

/// One write performed against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub operation: Operation,
    pub resource: Resource,
    pub id: u64,
}

/// How a navigation property resolves to records of another resource
#[derive(Debug, Clone, Copy)]
enum Navigation {
    /// The current record holds the foreign key
    Forward {
        target: Resource,
        foreign_key: &'static str,
    },
    /// Records of `target` point back at the current record
    Reverse {
        target: Resource,
        foreign_key: &'static str,
    },
}

fn navigation(resource: Resource, name: &str) -> Option<Navigation> {
    use Navigation::{Forward, Reverse};
    use Resource::*;

    let nav = match (resource, name) {
        (Release, "release_tag") => Reverse { target: ReleaseTag, foreign_key: "release" },
        (Release, "release_image") => Reverse {
            target: ImageIsPartOfRelease,
            foreign_key: "is_part_of__release",
        },
        (Release, "belongs_to__application") => Forward {
            target: Application,
            foreign_key: "belongs_to__application",
        },
        (ImageIsPartOfRelease, "image") => Forward { target: Image, foreign_key: "image" },
        (ImageIsPartOfRelease, "is_part_of__release") => Forward {
            target: Release,
            foreign_key: "is_part_of__release",
        },
        (Image, "is_a_build_of__service") => Forward {
            target: Service,
            foreign_key: "is_a_build_of__service",
        },
        (Image, "release_image") => Reverse {
            target: ImageIsPartOfRelease,
            foreign_key: "image",
        },
        (Service, "application") => Forward { target: Application, foreign_key: "application" },
        (ReleaseTag, "release") => Forward { target: Release, foreign_key: "release" },
        _ => return None,
    };
    Some(nav)
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<Resource, BTreeMap<u64, Map<String, Value>>>,
    next_id: u64,
    mutations: Vec<Mutation>,
    rejected: HashSet<(Resource, Operation)>,
}

impl MemoryState {
    fn check(&self, resource: Resource, operation: Operation) -> StoreResult<()> {
        if self.rejected.contains(&(resource, operation)) {
            return Err(StoreError::Rejected {
                operation: operation.as_str(),
                resource,
            });
        }
        Ok(())
    }

    fn table(&self, resource: Resource) -> impl Iterator<Item = &Map<String, Value>> {
        self.tables.get(&resource).into_iter().flat_map(|t| t.values())
    }

    fn insert(&mut self, resource: Resource, body: &Value) -> StoreResult<Value> {
        let mut row = body
            .as_object()
            .cloned()
            .ok_or_else(|| StoreError::InvalidQuery(format!("{resource} body must be an object")))?;
        self.next_id += 1;
        let id = self.next_id;
        row.insert("id".to_string(), Value::from(id));
        self.tables.entry(resource).or_default().insert(id, row.clone());
        Ok(Value::Object(row))
    }

    fn select(&self, resource: Resource, query: &Query) -> StoreResult<Vec<Value>> {
        let mut rows: Vec<&Map<String, Value>> = self
            .table(resource)
            .filter(|row| query.filter.as_ref().map_or(true, |f| f.matches(row)))
            .collect();

        if let Some(order) = &query.order_by {
            rows.sort_by(|a, b| {
                let ordering = compare_values(
                    a.get(&order.field).unwrap_or(&Value::Null),
                    b.get(&order.field).unwrap_or(&Value::Null),
                );
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }
        if let Some(top) = query.top {
            rows.truncate(top);
        }

        rows.into_iter()
            .map(|row| self.project(resource, row, query))
            .collect()
    }

    fn project(
        &self,
        resource: Resource,
        row: &Map<String, Value>,
        query: &Query,
    ) -> StoreResult<Value> {
        let mut out = if query.select.is_empty() {
            row.clone()
        } else {
            query
                .select
                .iter()
                .map(|field| (field.clone(), row.get(field).cloned().unwrap_or(Value::Null)))
                .collect()
        };

        for expand in &query.expand {
            let nav = navigation(resource, &expand.navigation).ok_or_else(|| {
                StoreError::InvalidQuery(format!(
                    "{resource} has no navigation property '{}'",
                    expand.navigation
                ))
            })?;
            let related = match nav {
                Navigation::Forward { target, foreign_key } => {
                    let key = row.get(foreign_key).and_then(Value::as_u64);
                    let related = key
                        .and_then(|id| self.tables.get(&target).and_then(|t| t.get(&id)))
                        .filter(|r| expand.query.filter.as_ref().map_or(true, |f| f.matches(r)));
                    match related {
                        Some(r) => vec![self.project(target, r, &expand.query)?],
                        None => Vec::new(),
                    }
                }
                Navigation::Reverse { target, foreign_key } => {
                    let id = row.get("id").cloned().unwrap_or(Value::Null);
                    let back_reference = Filter::eq(foreign_key, id);
                    let nested = Query {
                        filter: Some(match &expand.query.filter {
                            Some(f) => Filter::and([back_reference, f.clone()]),
                            None => back_reference,
                        }),
                        ..expand.query.clone()
                    };
                    self.select(target, &nested)?
                }
            };
            out.insert(expand.navigation.clone(), Value::Array(related));
        }

        Ok(Value::Object(out))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<MemoryState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a record without recording a mutation, returning its id
    pub fn seed(&self, resource: Resource, body: Value) -> u64 {
        let mut state = self.state();
        match state.insert(resource, &body) {
            Ok(row) => row.get("id").and_then(Value::as_u64).unwrap_or_default(),
            Err(_) => 0,
        }
    }

    /// Make every future `operation` on `resource` fail
    pub fn reject(&self, resource: Resource, operation: Operation) {
        self.state().rejected.insert((resource, operation));
    }

    pub fn rows(&self, resource: Resource) -> Vec<Value> {
        self.state()
            .table(resource)
            .cloned()
            .map(Value::Object)
            .collect()
    }

    pub fn row(&self, resource: Resource, id: u64) -> Option<Value> {
        self.state()
            .tables
            .get(&resource)
            .and_then(|t| t.get(&id))
            .cloned()
            .map(Value::Object)
    }

    pub fn count(&self, resource: Resource) -> usize {
        self.state().tables.get(&resource).map_or(0, BTreeMap::len)
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state().mutations.clone()
    }

    pub fn clear_mutations(&self) {
        self.state().mutations.clear();
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn get(&self, resource: Resource, query: &Query) -> StoreResult<Vec<Value>> {
        let state = self.state();
        state.check(resource, Operation::Get)?;
        state.select(resource, query)
    }

    async fn get_by_id(
        &self,
        resource: Resource,
        id: u64,
        query: &Query,
    ) -> StoreResult<Option<Value>> {
        let state = self.state();
        state.check(resource, Operation::Get)?;
        match state.tables.get(&resource).and_then(|t| t.get(&id)) {
            Some(row) => Ok(Some(state.project(resource, row, query)?)),
            None => Ok(None),
        }
    }

    async fn post(&self, resource: Resource, body: &Value) -> StoreResult<Value> {
        let mut state = self.state();
        state.check(resource, Operation::Post)?;
        let row = state.insert(resource, body)?;
        let id = row.get("id").and_then(Value::as_u64).unwrap_or_default();
        state.mutations.push(Mutation {
            operation: Operation::Post,
            resource,
            id,
        });
        Ok(row)
    }

    async fn patch(&self, resource: Resource, id: u64, body: &Value) -> StoreResult<()> {
        let mut state = self.state();
        state.check(resource, Operation::Patch)?;
        let row = state
            .tables
            .get_mut(&resource)
            .and_then(|t| t.get_mut(&id))
            .ok_or(StoreError::Missing { resource, id })?;
        if let Some(fields) = body.as_object() {
            for (key, value) in fields {
                row.insert(key.clone(), value.clone());
            }
        }
        state.mutations.push(Mutation {
            operation: Operation::Patch,
            resource,
            id,
        });
        Ok(())
    }

    async fn delete(&self, resource: Resource, id: u64) -> StoreResult<()> {
        let mut state = self.state();
        state.check(resource, Operation::Delete)?;
        state
            .tables
            .get_mut(&resource)
            .and_then(|t| t.remove(&id))
            .ok_or(StoreError::Missing { resource, id })?;
        state.mutations.push(Mutation {
            operation: Operation::Delete,
            resource,
            id,
        });
        Ok(())
    }

    async fn get_or_create(
        &self,
        resource: Resource,
        natural_key: &Map<String, Value>,
        body: &Value,
    ) -> StoreResult<Value> {
        {
            let state = self.state();
            state.check(resource, Operation::Get)?;
            let existing = state.table(resource).find(|row| {
                natural_key
                    .iter()
                    .all(|(k, v)| values_equal(row.get(k).unwrap_or(&Value::Null), v))
            });
            if let Some(row) = existing {
                return Ok(Value::Object(row.clone()));
            }
        }
        self.post(resource, body).await
    }
}
