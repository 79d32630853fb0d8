//! The sub-request wire unit.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One requested field, its arguments and nested fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiRequest {
    pub field_name: String,
    /// Response key; defaults to `field_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<ApiRequest>>,
}

impl ApiRequest {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            alias: None,
            arguments: None,
            fields: None,
        }
    }

    #[must_use]
    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = Some(arguments);
        self
    }

    /// Sets nested fields; an empty list means no nested fields.
    #[must_use]
    pub fn with_fields(mut self, fields: Vec<ApiRequest>) -> Self {
        self.fields = if fields.is_empty() { None } else { Some(fields) };
        self
    }

    /// The key this field's value is stored under in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.field_name)
    }

    /// Nested fields, empty for leaf requests.
    pub fn sub_fields(&self) -> &[ApiRequest] {
        self.fields.as_deref().unwrap_or_default()
    }

    /// The argument object, if the arguments are an object.
    pub fn argument_map(&self) -> Option<&Map<String, Value>> {
        self.arguments.as_ref().and_then(Value::as_object)
    }

    /// A single argument by name.
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.argument_map().and_then(|args| args.get(name))
    }
}
