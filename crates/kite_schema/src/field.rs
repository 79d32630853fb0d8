//! Field declarations.

use crate::auth::{AuthorizationRule, LogAccessRule};
use crate::flags::FieldFlags;
use crate::scalar::ScalarType;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A rejected field declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeclarationError {
    /// Object-typed fields cannot be keys.
    #[error("object field `{0}` cannot be a key")]
    ObjectKey(String),

    /// Scalar fields cannot be connections.
    #[error("scalar field `{0}` cannot be a connection")]
    ScalarConnection(String),

    /// A scalar field needs a scalar kind.
    #[error("scalar field `{0}` has no scalar type")]
    MissingScalarType(String),

    /// Field names are unique within a type.
    #[error("field `{0}` is declared more than once")]
    DuplicateField(String),
}

/// One field or method of an object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiField {
    pub name: String,
    /// Target type for object fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_name: Option<String>,
    /// Scalar kind for scalar fields, [`ScalarType::None`] otherwise.
    #[serde(default)]
    pub scalar_type: ScalarType,
    #[serde(default)]
    pub flags: FieldFlags,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub arguments: Vec<ApiField>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authorization_rules: Vec<AuthorizationRule>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub log_access_rules: Vec<LogAccessRule>,
    #[serde(default)]
    pub require_authenticated_session: bool,
    #[serde(default)]
    pub require_authenticated_user_session: bool,
}

impl ApiField {
    /// Declares a field pointing at an object or enum type.
    pub fn object(
        name: impl Into<String>,
        type_name: impl Into<String>,
        flags: FieldFlags,
    ) -> Result<Self, DeclarationError> {
        let field = Self {
            type_name: Some(type_name.into()),
            ..Self::bare(name.into(), ScalarType::None, flags)
        };
        field.validate()?;
        Ok(field)
    }

    /// Declares a scalar field.
    pub fn scalar(
        name: impl Into<String>,
        scalar_type: ScalarType,
        flags: FieldFlags,
    ) -> Result<Self, DeclarationError> {
        let field = Self::bare(name.into(), scalar_type, flags);
        field.validate()?;
        Ok(field)
    }

    fn bare(name: String, scalar_type: ScalarType, flags: FieldFlags) -> Self {
        Self {
            name,
            type_name: None,
            scalar_type,
            flags,
            arguments: Vec::new(),
            description: None,
            authorization_rules: Vec::new(),
            log_access_rules: Vec::new(),
            require_authenticated_session: false,
            require_authenticated_user_session: false,
        }
    }

    /// Checks the flag invariants.
    ///
    /// Constructors call this; declarations that arrive deserialized must be
    /// checked explicitly.
    pub fn validate(&self) -> Result<(), DeclarationError> {
        match &self.type_name {
            Some(_) if self.flags.contains(FieldFlags::IS_KEY) => {
                Err(DeclarationError::ObjectKey(self.name.clone()))
            }
            Some(_) => Ok(()),
            None if self.scalar_type == ScalarType::None => {
                Err(DeclarationError::MissingScalarType(self.name.clone()))
            }
            None if self.flags.contains(FieldFlags::IS_CONNECTION) => {
                Err(DeclarationError::ScalarConnection(self.name.clone()))
            }
            None => Ok(()),
        }
    }

    /// Returns true for scalar fields.
    pub fn is_scalar(&self) -> bool {
        self.type_name.is_none()
    }

    pub fn is_connection(&self) -> bool {
        self.flags.contains(FieldFlags::IS_CONNECTION)
    }

    pub fn is_array(&self) -> bool {
        self.flags.contains(FieldFlags::IS_ARRAY)
    }

    pub fn is_key(&self) -> bool {
        self.flags.contains(FieldFlags::IS_KEY)
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn with_arguments(mut self, arguments: Vec<ApiField>) -> Self {
        self.arguments = arguments;
        self
    }

    #[must_use]
    pub fn with_argument(mut self, argument: ApiField) -> Self {
        self.arguments.push(argument);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: FieldFlags) -> Self {
        self.flags.insert(flags);
        self
    }

    #[must_use]
    pub fn with_authorization_rule(mut self, rule: AuthorizationRule) -> Self {
        self.authorization_rules.push(rule);
        self
    }

    #[must_use]
    pub fn with_log_rule(mut self, rule: LogAccessRule) -> Self {
        self.log_access_rules.push(rule);
        self
    }

    /// Requires an authenticated session.
    #[must_use]
    pub fn require_session(mut self) -> Self {
        self.require_authenticated_session = true;
        self
    }

    /// Requires an authenticated user.
    #[must_use]
    pub fn require_user(mut self) -> Self {
        self.require_authenticated_user_session = true;
        self
    }
}
