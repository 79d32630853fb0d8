//! Gateway error types.

use kite_core::DiagnosticBag;
use kite_schema::EndpointError;
use std::time::Duration;
use thiserror::Error;

/// The provider descriptions could not be merged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("schema merge failed with {} error(s)\n{diagnostics}", diagnostics.error_count())]
pub struct MergeError {
    pub diagnostics: DiagnosticBag,
}

/// A provider call failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("provider `{0}` is not registered")]
    UnknownProvider(String),

    #[error("provider `{api}` failed: {source}")]
    Endpoint {
        api: String,
        #[source]
        source: EndpointError,
    },

    #[error("provider `{api}` did not answer within {after:?}")]
    Timeout { api: String, after: Duration },
}

/// A global id could not be decoded.
#[derive(Debug, Error)]
pub enum GlobalIdError {
    #[error("global id is not valid base64")]
    Base64(#[from] base64::DecodeError),

    #[error("global id is not a compressed payload")]
    Compression(#[from] std::io::Error),

    #[error("global id payload is malformed: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("global id has an empty path")]
    EmptyPath,

    #[error("global id expands beyond {limit} bytes")]
    TooLarge { limit: u64 },
}

/// A query could not be planned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("unknown field `{field}` on `{type_name}`")]
    UnknownField { type_name: String, field: String },

    #[error("unknown type `{0}`")]
    UnknownType(String),

    #[error("selection depth {depth} exceeds the limit of {limit}")]
    MaxDepthExceeded { depth: usize, limit: usize },
}

/// The gateway could not publish a schema.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Merge(#[from] MergeError),
}
