//! Schema declaration model for Kite.
//!
//! This crate holds the vocabulary shared by providers and the gateway:
//! - `scalar`: Scalar kinds and typed scalar values
//! - `flags`: Field flag set
//! - `field`: `ApiField` declarations
//! - `types`: Object and enum declarations
//! - `auth`: Authorization and access-log rules
//! - `context`: The caller's request context
//! - `request`: `ApiRequest`, the sub-request wire unit
//! - `description`: A provider's published `ApiDescription`
//! - `security`: Security log records and sinks
//! - `endpoint`: The provider endpoint boundary

pub mod auth;
pub mod context;
pub mod description;
pub mod endpoint;
pub mod field;
pub mod flags;
pub mod request;
pub mod scalar;
pub mod security;
pub mod types;

pub use auth::{
    AuthorizationRule, ConnectionAction, ConnectionActions, LogAccessRule, PrivilegeScope,
    SecurityLogType, Severity,
};
pub use context::{AccessTicket, RequestContext, UserDescription};
pub use description::{ApiDescription, ApiMutation, MutationKind};
pub use endpoint::{ApiEndpoint, EndpointError, ResolutionError, ERRORS_KEY};
pub use field::{ApiField, DeclarationError};
pub use flags::FieldFlags;
pub use request::ApiRequest;
pub use scalar::{ScalarType, ScalarValue};
pub use security::{RecordingSecurityLogger, SecurityLogger, SecurityRecord, TracingSecurityLogger};
pub use types::{ApiEnumType, ApiObjectType, ApiType};
