use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::{Client, RequestBuilder, Response};
use serde_json::{Map, Value};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{ApiConfig, RateLimitConfig};
use crate::observability::store_metrics;
use crate::store::error::{StoreError, StoreResult};
use crate::store::query::{Filter, Query, Resource};
use crate::store::RemoteStore;

/// Rate-limited REST client for an OData-style remote store.
///
/// Collections live at `{api_url}/{api_version}/{resource}` and single
/// records at `{resource}({id})`. Collection reads answer with a
/// `{ "d": [...] }` envelope.
#[derive(Debug)]
pub struct HttpStore {
    client: Client,
    base_url: String,
    token: Option<String>,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

impl HttpStore {
    pub fn new(
        api_url: &str,
        api_version: &str,
        token: Option<String>,
        rate_limit: &RateLimitConfig,
    ) -> StoreResult<Self> {
        let per_second = NonZeroU32::new(rate_limit.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(rate_limit.burst_capacity).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        let client = Client::builder()
            .user_agent(concat!("release-bundle/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: format!(
                "{}/{}",
                api_url.trim_end_matches('/'),
                api_version.trim_matches('/')
            ),
            token,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        })
    }

    pub fn from_config(config: &ApiConfig) -> StoreResult<Self> {
        Self::new(
            &config.url,
            &config.api_version,
            config.token.clone(),
            &config.rate_limit,
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, resource: Resource) -> String {
        format!("{}/{}", self.base_url, resource)
    }

    fn entity_url(&self, resource: Resource, id: u64) -> String {
        format!("{}/{}({})", self.base_url, resource, id)
    }

    async fn send(
        &self,
        method: &'static str,
        resource: Resource,
        request: RequestBuilder,
    ) -> StoreResult<Response> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(100)))
            .await;

        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let metrics = store_metrics();
        metrics.record_request();
        debug!(method, resource = %resource, "Sending remote store request");

        let response = request.send().await.inspect_err(|_| metrics.record_error())?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        metrics.record_error();
        if status.as_u16() == 429 {
            metrics.record_rate_limit_hit();
        }
        let message = response.text().await.unwrap_or_default();
        Err(StoreError::Http {
            method,
            resource,
            status: status.as_u16(),
            message,
        })
    }

    async fn read_collection(response: Response) -> StoreResult<Vec<Value>> {
        let body: Value = response.json().await?;
        match body.get("d") {
            Some(Value::Array(items)) => Ok(items.clone()),
            _ => Err(StoreError::Decode(format!(
                "expected a {{\"d\": [...]}} envelope, got {body}"
            ))),
        }
    }
}

#[async_trait]
impl RemoteStore for HttpStore {
    async fn get(&self, resource: Resource, query: &Query) -> StoreResult<Vec<Value>> {
        let request = self
            .client
            .get(self.collection_url(resource))
            .query(&query.to_odata_params());
        let response = self.send("GET", resource, request).await?;
        Self::read_collection(response).await
    }

    async fn get_by_id(
        &self,
        resource: Resource,
        id: u64,
        query: &Query,
    ) -> StoreResult<Option<Value>> {
        let request = self
            .client
            .get(self.entity_url(resource, id))
            .query(&query.to_odata_params());
        match self.send("GET", resource, request).await {
            Ok(response) => Ok(Self::read_collection(response).await?.into_iter().next()),
            Err(StoreError::Http { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn post(&self, resource: Resource, body: &Value) -> StoreResult<Value> {
        let request = self.client.post(self.collection_url(resource)).json(body);
        let response = self.send("POST", resource, request).await?;
        Ok(response.json().await?)
    }

    async fn patch(&self, resource: Resource, id: u64, body: &Value) -> StoreResult<()> {
        let request = self.client.patch(self.entity_url(resource, id)).json(body);
        self.send("PATCH", resource, request).await?;
        Ok(())
    }

    async fn delete(&self, resource: Resource, id: u64) -> StoreResult<()> {
        let request = self.client.delete(self.entity_url(resource, id));
        self.send("DELETE", resource, request).await?;
        Ok(())
    }

    async fn get_or_create(
        &self,
        resource: Resource,
        natural_key: &Map<String, Value>,
        body: &Value,
    ) -> StoreResult<Value> {
        let query = Query::new()
            .filter(Filter::from_natural_key(natural_key))
            .top(1);
        if let Some(existing) = self.get(resource, &query).await?.into_iter().next() {
            return Ok(existing);
        }
        self.post(resource, body).await
    }
}
