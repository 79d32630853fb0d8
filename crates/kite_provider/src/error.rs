//! Resolution errors.

use kite_schema::{ConnectionAction, EndpointError};
use thiserror::Error;

/// An error raised while resolving a request on the provider.
///
/// Resolvers report these through [`crate::ResolveContext::report`] and
/// resolve the affected field to null.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolverError {
    /// A collection field was handed something that is not a sequence.
    #[error("Source is not a node connection (field `{field}`)")]
    NotACollection { field: String },

    /// A resolver was handed a value of the wrong type.
    #[error("unexpected source for `{field}`, expected {expected}")]
    UnexpectedSource { field: String, expected: String },

    /// An argument could not be interpreted.
    #[error("invalid argument `{name}`: {reason}")]
    InvalidArgument { name: String, reason: String },

    /// The caller may not perform the action.
    #[error("not authorized to {action} `{field}`")]
    Unauthorized {
        field: String,
        action: ConnectionAction,
    },

    /// The mutation path does not lead to a node connection.
    #[error("unknown mutation `{0}`")]
    UnknownMutation(String),

    /// The node connection does not implement the mutation.
    #[error("mutation `{0}` is not supported")]
    UnsupportedMutation(String),

    /// The data source failed.
    #[error("{0}")]
    Failed(String),
}

impl ResolverError {
    pub fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        ResolverError::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

impl From<ResolverError> for EndpointError {
    fn from(error: ResolverError) -> Self {
        match error {
            ResolverError::UnknownMutation(name) => EndpointError::UnknownMutation(name),
            other => EndpointError::Failed(other.to_string()),
        }
    }
}
