//! Object and enum declarations.

use crate::field::ApiField;
use serde::{Deserialize, Serialize};

/// A type declared by a provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ApiType {
    Object(ApiObjectType),
    Enum(ApiEnumType),
}

impl ApiType {
    /// The type name, unique within one provider.
    pub fn type_name(&self) -> &str {
        match self {
            ApiType::Object(o) => &o.type_name,
            ApiType::Enum(e) => &e.type_name,
        }
    }

    pub fn description(&self) -> Option<&str> {
        match self {
            ApiType::Object(o) => o.description.as_deref(),
            ApiType::Enum(e) => e.description.as_deref(),
        }
    }

    pub fn as_object(&self) -> Option<&ApiObjectType> {
        match self {
            ApiType::Object(o) => Some(o),
            ApiType::Enum(_) => None,
        }
    }
}

/// An object type with fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiObjectType {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub fields: Vec<ApiField>,
}

impl ApiObjectType {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            description: None,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_field(mut self, field: ApiField) -> Self {
        self.fields.push(field);
        self
    }

    /// Looks up a field by name.
    pub fn field(&self, name: &str) -> Option<&ApiField> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// The first field flagged as key.
    pub fn key_field(&self) -> Option<&ApiField> {
        self.fields.iter().find(|f| f.is_key())
    }
}

/// An enumeration with string values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiEnumType {
    pub type_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub values: Vec<String>,
}

impl ApiEnumType {
    pub fn new<I, S>(type_name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            type_name: type_name.into(),
            description: None,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}
