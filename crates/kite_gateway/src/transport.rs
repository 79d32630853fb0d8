//! Provider transport.
//!
//! The gateway reaches providers only through [`Transport`]. The in-process
//! [`LocalTransport`] routes to [`ApiEndpoint`] implementations directly;
//! remote transports implement the same trait.

use crate::error::TransportError;
use async_trait::async_trait;
use kite_schema::{ApiDescription, ApiEndpoint, ApiRequest, RequestContext};
use rustc_hash::FxHashMap;
use serde_json::Value;
use std::sync::Arc;

/// A way to reach providers.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Descriptions of every reachable provider.
    async fn descriptions(&self) -> Result<Vec<ApiDescription>, TransportError>;

    /// Sends root field requests to one provider.
    async fn send_query(
        &self,
        api: &str,
        requests: &[ApiRequest],
        context: &RequestContext,
    ) -> Result<Value, TransportError>;

    /// Sends one mutation request to one provider.
    async fn send_mutation(
        &self,
        api: &str,
        request: &ApiRequest,
        context: &RequestContext,
    ) -> Result<Value, TransportError>;
}

/// Routes calls to in-process endpoints by API name.
#[derive(Default, Clone)]
pub struct LocalTransport {
    endpoints: FxHashMap<String, Arc<dyn ApiEndpoint>>,
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.endpoints.keys().collect();
        names.sort();
        f.debug_struct("LocalTransport").field("endpoints", &names).finish()
    }
}

impl LocalTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an endpoint under its published API name.
    #[must_use]
    pub fn with_endpoint(mut self, endpoint: Arc<dyn ApiEndpoint>) -> Self {
        self.insert(endpoint);
        self
    }

    /// Registers or replaces an endpoint.
    pub fn insert(&mut self, endpoint: Arc<dyn ApiEndpoint>) -> Option<Arc<dyn ApiEndpoint>> {
        let name = endpoint.description().api_name.clone();
        self.endpoints.insert(name, endpoint)
    }

    pub fn remove(&mut self, api: &str) -> Option<Arc<dyn ApiEndpoint>> {
        self.endpoints.remove(api)
    }

    fn endpoint(&self, api: &str) -> Result<&Arc<dyn ApiEndpoint>, TransportError> {
        self.endpoints
            .get(api)
            .ok_or_else(|| TransportError::UnknownProvider(api.to_string()))
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn descriptions(&self) -> Result<Vec<ApiDescription>, TransportError> {
        Ok(self
            .endpoints
            .values()
            .map(|endpoint| endpoint.description().clone())
            .collect())
    }

    async fn send_query(
        &self,
        api: &str,
        requests: &[ApiRequest],
        context: &RequestContext,
    ) -> Result<Value, TransportError> {
        self.endpoint(api)?
            .query(requests, context)
            .await
            .map_err(|source| TransportError::Endpoint {
                api: api.to_string(),
                source,
            })
    }

    async fn send_mutation(
        &self,
        api: &str,
        request: &ApiRequest,
        context: &RequestContext,
    ) -> Result<Value, TransportError> {
        self.endpoint(api)?
            .mutate(request, context)
            .await
            .map_err(|source| TransportError::Endpoint {
                api: api.to_string(),
                source,
            })
    }
}
