//! A provider's published schema.

use crate::field::ApiField;
use crate::types::{ApiObjectType, ApiType};
use serde::{Deserialize, Serialize};

/// What a connection mutation does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    /// The last path segment of mutations of this kind.
    pub fn method_name(self) -> &'static str {
        match self {
            MutationKind::Create => "create",
            MutationKind::Update => "update",
            MutationKind::Delete => "delete",
        }
    }

    pub fn from_method_name(name: &str) -> Option<Self> {
        match name {
            "create" => Some(MutationKind::Create),
            "update" => Some(MutationKind::Update),
            "delete" => Some(MutationKind::Delete),
            _ => None,
        }
    }
}

/// A mutation of a node connection.
///
/// `field.name` is the dotted path of the connection followed by the method
/// name, for example `orders.create`. `field.type_name` is the element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiMutation {
    #[serde(flatten)]
    pub field: ApiField,
    pub kind: MutationKind,
}

impl ApiMutation {
    /// The connection path segments without the method name.
    pub fn container_path(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.field.name.split('.').collect();
        segments.pop();
        segments
    }
}

/// Everything a provider publishes about its data surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiDescription {
    /// Provider identity; qualifies every published type name.
    pub api_name: String,
    /// Name of the provider's root type.
    pub type_name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Fields of the provider's `api` subtree.
    #[serde(default)]
    pub fields: Vec<ApiField>,
    #[serde(default)]
    pub types: Vec<ApiType>,
    #[serde(default)]
    pub mutations: Vec<ApiMutation>,
}

impl ApiDescription {
    pub fn new(api_name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            type_name: type_name.into(),
            version: String::new(),
            description: None,
            fields: Vec::new(),
            types: Vec::new(),
            mutations: Vec::new(),
        }
    }

    /// Looks up a declared type by name.
    pub fn find_type(&self, name: &str) -> Option<&ApiType> {
        self.types.iter().find(|t| t.type_name() == name)
    }

    /// Looks up a declared object type by name.
    pub fn find_object(&self, name: &str) -> Option<&ApiObjectType> {
        self.find_type(name).and_then(ApiType::as_object)
    }

    /// The root fields as an object type.
    pub fn root_type(&self) -> ApiObjectType {
        ApiObjectType {
            type_name: self.type_name.clone(),
            description: self.description.clone(),
            fields: self.fields.clone(),
        }
    }
}
