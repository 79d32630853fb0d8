//! The provider endpoint boundary.
//!
//! A provider endpoint publishes its [`ApiDescription`] and answers
//! sub-requests with JSON mirroring the requested alias tree. The gateway's
//! in-process transport talks to anything implementing [`ApiEndpoint`].

use crate::context::RequestContext;
use crate::description::ApiDescription;
use crate::request::ApiRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Key under which an answer object carries its [`ResolutionError`]s.
pub const ERRORS_KEY: &str = "__errors";

/// A field that resolved to null because resolving it failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionError {
    pub message: String,
    /// Response keys from the answer root to the failed field. List
    /// positions are not recorded.
    #[serde(default)]
    pub path: Vec<String>,
}

impl ResolutionError {
    pub fn new(message: impl Into<String>, path: Vec<String>) -> Self {
        Self {
            message: message.into(),
            path,
        }
    }

    /// Stores `errors` in an answer object. Non-object answers are left alone.
    pub fn attach(answer: &mut Value, errors: Vec<ResolutionError>) {
        if errors.is_empty() {
            return;
        }
        if let Some(object) = answer.as_object_mut() {
            if let Ok(errors) = serde_json::to_value(errors) {
                object.insert(ERRORS_KEY.to_string(), errors);
            }
        }
    }

    /// Removes the errors carried by an answer object.
    ///
    /// Malformed entries are dropped.
    pub fn take_from(answer: &mut Value) -> Vec<ResolutionError> {
        let Some(carried) = answer.as_object_mut().and_then(|object| object.remove(ERRORS_KEY)) else {
            return Vec::new();
        };
        match carried {
            Value::Array(entries) => entries
                .into_iter()
                .filter_map(|entry| serde_json::from_value(entry).ok())
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A failure answering a sub-request as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EndpointError {
    /// The mutation name is not published by this provider.
    #[error("unknown mutation `{0}`")]
    UnknownMutation(String),

    /// The request could not be processed.
    #[error("request failed: {0}")]
    Failed(String),
}

/// A provider that can be queried.
#[async_trait]
pub trait ApiEndpoint: Send + Sync {
    /// The published schema.
    fn description(&self) -> &ApiDescription;

    /// Resolves root field requests into one JSON object.
    async fn query(
        &self,
        requests: &[ApiRequest],
        context: &RequestContext,
    ) -> Result<Value, EndpointError>;

    /// Executes one mutation request.
    async fn mutate(
        &self,
        request: &ApiRequest,
        context: &RequestContext,
    ) -> Result<Value, EndpointError>;
}
