//! Federated responses and their errors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Error codes carried in `extensions.code`.
pub mod codes {
    pub const PROVIDER_UNAVAILABLE: &str = "PROVIDER_UNAVAILABLE";
    pub const INVALID_GLOBAL_ID: &str = "INVALID_GLOBAL_ID";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const MUTATION_FAILED: &str = "MUTATION_FAILED";
    pub const CANCELLED: &str = "CANCELLED";
    pub const UNKNOWN_FIELD: &str = "UNKNOWN_FIELD";
    pub const MAX_DEPTH_EXCEEDED: &str = "MAX_DEPTH_EXCEEDED";
    pub const SCHEMA_UNAVAILABLE: &str = "SCHEMA_UNAVAILABLE";
    pub const RESOLUTION_FAILED: &str = "RESOLUTION_FAILED";
}

/// A federated response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// The data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    /// The errors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<FieldError>,
}

impl Response {
    /// Creates a successful response with data.
    pub fn data(data: Value) -> Self {
        Self {
            data: Some(data),
            errors: Vec::new(),
        }
    }

    /// Creates a response without data.
    pub fn error(error: FieldError) -> Self {
        Self {
            data: None,
            errors: vec![error],
        }
    }

    #[must_use]
    pub fn with_errors(mut self, errors: Vec<FieldError>) -> Self {
        self.errors.extend(errors);
        self
    }

    /// Returns true if the response has errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn has_data(&self) -> bool {
        self.data.is_some()
    }

    /// Codes of every error, in order.
    pub fn error_codes(&self) -> Vec<&str> {
        self.errors.iter().filter_map(FieldError::code).collect()
    }
}

/// An error attached to one field of the response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldError {
    /// The error message.
    pub message: String,
    /// The path to the field.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<PathSegment>,
    /// Error extensions.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

/// A path segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Field(String),
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(field: &str) -> Self {
        PathSegment::Field(field.to_string())
    }
}

impl FieldError {
    /// Creates a new field error.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: Vec::new(),
            extensions: Map::new(),
        }
    }

    /// Adds a path to the error.
    #[must_use]
    pub fn with_path(mut self, path: Vec<PathSegment>) -> Self {
        self.path = path;
        self
    }

    /// Adds an extension.
    #[must_use]
    pub fn with_extension(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extensions.insert(key.into(), value);
        self
    }

    /// Sets the error code extension.
    #[must_use]
    pub fn with_code(self, code: &str) -> Self {
        self.with_extension("code", Value::String(code.to_string()))
    }

    /// Names the provider the error came from.
    #[must_use]
    pub fn with_provider(self, api: &str) -> Self {
        self.with_extension("provider", Value::String(api.to_string()))
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions.get("code").and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_field_error() {
        let error = FieldError::new("provider billing is unavailable")
            .with_path(vec!["api".into(), "invoices".into(), PathSegment::Index(2)])
            .with_code(codes::PROVIDER_UNAVAILABLE)
            .with_provider("billing");

        assert_eq!(error.code(), Some("PROVIDER_UNAVAILABLE"));
        assert_eq!(
            serde_json::to_value(&error).unwrap(),
            json!({
                "message": "provider billing is unavailable",
                "path": ["api", "invoices", 2],
                "extensions": { "code": "PROVIDER_UNAVAILABLE", "provider": "billing" }
            })
        );
    }

    #[test]
    fn test_response() {
        let data_response = Response::data(json!({ "api": null }));
        assert!(data_response.has_data());
        assert!(!data_response.has_errors());
        assert_eq!(serde_json::to_value(&data_response).unwrap(), json!({ "data": { "api": null } }));

        let error_response = Response::error(FieldError::new("no schema").with_code(codes::SCHEMA_UNAVAILABLE));
        assert!(!error_response.has_data());
        assert_eq!(error_response.error_codes(), vec!["SCHEMA_UNAVAILABLE"]);
    }
}
