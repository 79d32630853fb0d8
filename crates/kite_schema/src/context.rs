//! The caller's request context.
//!
//! The context is produced by the authentication collaborator and is only
//! read here: by authorization checks and by security records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The authenticated user behind a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDescription {
    pub login: String,
    pub user_id: String,
}

impl UserDescription {
    pub fn new(login: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            user_id: user_id.into(),
        }
    }
}

/// An authenticated session: a client, optionally acting for a user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTicket {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<UserDescription>,
    #[serde(default)]
    pub user_scope: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_scope: BTreeSet<String>,
}

impl AccessTicket {
    /// Creates a ticket for a client without a user.
    pub fn for_client(client_id: impl Into<String>) -> Self {
        Self {
            client_id: Some(client_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_user(mut self, user: UserDescription) -> Self {
        self.user = Some(user);
        self
    }

    #[must_use]
    pub fn with_user_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.user_scope.extend(scope.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn with_client_scope<I, S>(mut self, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.client_scope.extend(scope.into_iter().map(Into::into));
        self
    }
}

/// Request-scoped security context.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authentication: Option<AccessTicket>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl RequestContext {
    /// A context without any session.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// A context for an authenticated session.
    pub fn with_ticket(ticket: AccessTicket) -> Self {
        Self {
            authentication: Some(ticket),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_remote_address(mut self, address: impl Into<String>) -> Self {
        self.remote_address = Some(address.into());
        self
    }

    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// The authenticated user, if any.
    pub fn user(&self) -> Option<&UserDescription> {
        self.authentication.as_ref().and_then(|t| t.user.as_ref())
    }

    /// The authenticated client id, if any.
    pub fn client_id(&self) -> Option<&str> {
        self.authentication
            .as_ref()
            .and_then(|t| t.client_id.as_deref())
    }
}
