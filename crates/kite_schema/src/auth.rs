//! Authorization and access-log rules.
//!
//! [`ApiField::check_authorization`] is a pure function of the field and the
//! request context. Recording what happened is up to the caller, which picks
//! the record severity with [`ApiField::matching_log_rule`].

use crate::context::RequestContext;
use crate::field::ApiField;
use crate::flags::FieldFlags;
use serde::de::Deserializer;
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An action performed against a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionAction {
    Query,
    Create,
    Update,
    Delete,
}

impl ConnectionAction {
    const ALL: [ConnectionAction; 4] = [
        ConnectionAction::Query,
        ConnectionAction::Create,
        ConnectionAction::Update,
        ConnectionAction::Delete,
    ];

    fn bit(self) -> u8 {
        match self {
            ConnectionAction::Query => 1,
            ConnectionAction::Create => 1 << 1,
            ConnectionAction::Update => 1 << 2,
            ConnectionAction::Delete => 1 << 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionAction::Query => "Query",
            ConnectionAction::Create => "Create",
            ConnectionAction::Update => "Update",
            ConnectionAction::Delete => "Delete",
        }
    }
}

impl fmt::Display for ConnectionAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of connection actions a rule applies to.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionActions(u8);

impl ConnectionActions {
    pub const NONE: ConnectionActions = ConnectionActions(0);
    pub const ALL: ConnectionActions = ConnectionActions(0b1111);

    /// Builds a set from individual actions.
    pub fn of(actions: &[ConnectionAction]) -> Self {
        ConnectionActions(actions.iter().fold(0, |bits, action| bits | action.bit()))
    }

    pub fn contains(self, action: ConnectionAction) -> bool {
        self.0 & action.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = ConnectionAction> {
        ConnectionAction::ALL
            .into_iter()
            .filter(move |action| self.contains(*action))
    }
}

impl Default for ConnectionActions {
    fn default() -> Self {
        ConnectionActions::ALL
    }
}

impl From<ConnectionAction> for ConnectionActions {
    fn from(action: ConnectionAction) -> Self {
        ConnectionActions(action.bit())
    }
}

impl fmt::Debug for ConnectionActions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for ConnectionActions {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(None)?;
        for action in self.iter() {
            seq.serialize_element(&action)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for ConnectionActions {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let actions = Vec::<ConnectionAction>::deserialize(deserializer)?;
        Ok(ConnectionActions::of(&actions))
    }
}

/// Where a required privilege has to be found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PrivilegeScope {
    /// The user scope must contain the privilege.
    #[default]
    User,
    /// The client scope must contain the privilege.
    Client,
    /// Either scope is enough.
    Any,
    /// Both scopes must contain the privilege.
    Both,
}

/// One privilege requirement of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationRule {
    pub privilege: String,
    #[serde(default)]
    pub scope: PrivilegeScope,
    /// Appends `.{Action}` to the privilege before checking it.
    #[serde(default)]
    pub add_action_name: bool,
    #[serde(default)]
    pub ignore_on_user_present: bool,
    #[serde(default)]
    pub ignore_on_user_not_present: bool,
    /// Actions the rule applies to. Only consulted on connection fields.
    #[serde(default)]
    pub connection_actions: ConnectionActions,
}

impl AuthorizationRule {
    /// Creates a rule requiring a privilege in the user scope.
    pub fn new(privilege: impl Into<String>) -> Self {
        Self {
            privilege: privilege.into(),
            scope: PrivilegeScope::User,
            add_action_name: false,
            ignore_on_user_present: false,
            ignore_on_user_not_present: false,
            connection_actions: ConnectionActions::ALL,
        }
    }

    #[must_use]
    pub fn with_scope(mut self, scope: PrivilegeScope) -> Self {
        self.scope = scope;
        self
    }

    #[must_use]
    pub fn with_action_name(mut self) -> Self {
        self.add_action_name = true;
        self
    }

    #[must_use]
    pub fn ignore_on_user_present(mut self) -> Self {
        self.ignore_on_user_present = true;
        self
    }

    #[must_use]
    pub fn ignore_on_user_not_present(mut self) -> Self {
        self.ignore_on_user_not_present = true;
        self
    }

    #[must_use]
    pub fn for_actions(mut self, actions: ConnectionActions) -> Self {
        self.connection_actions = actions;
        self
    }

    /// The privilege string checked for `action`.
    pub fn effective_privilege(&self, action: ConnectionAction) -> String {
        if self.add_action_name {
            format!("{}.{}", self.privilege, action)
        } else {
            self.privilege.clone()
        }
    }
}

/// Security record severity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub enum Severity {
    #[default]
    Trivial,
    Minor,
    Major,
    Crucial,
}

/// Security record kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SecurityLogType {
    #[default]
    OperationGranted,
    OperationDenied,
    DataCreateGranted,
    DataUpdateGranted,
    DataDeleteGranted,
}

impl SecurityLogType {
    /// The granted record kind for a successful action.
    pub fn granted(action: ConnectionAction) -> Self {
        match action {
            ConnectionAction::Query => SecurityLogType::OperationGranted,
            ConnectionAction::Create => SecurityLogType::DataCreateGranted,
            ConnectionAction::Update => SecurityLogType::DataUpdateGranted,
            ConnectionAction::Delete => SecurityLogType::DataDeleteGranted,
        }
    }
}

/// Requests a security record whenever the field is accessed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogAccessRule {
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub log_type: SecurityLogType,
    /// Message template; `{Name}` placeholders are filled positionally.
    pub message: String,
    #[serde(default)]
    pub connection_actions: ConnectionActions,
}

impl LogAccessRule {
    pub fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            log_type: SecurityLogType::OperationGranted,
            message: message.into(),
            connection_actions: ConnectionActions::ALL,
        }
    }

    #[must_use]
    pub fn with_log_type(mut self, log_type: SecurityLogType) -> Self {
        self.log_type = log_type;
        self
    }

    #[must_use]
    pub fn for_actions(mut self, actions: ConnectionActions) -> Self {
        self.connection_actions = actions;
        self
    }
}

impl ApiField {
    /// Checks whether the caller may perform `action` on this field.
    pub fn check_authorization(&self, context: &RequestContext, action: ConnectionAction) -> bool {
        let ticket = context.authentication.as_ref();
        if ticket.is_none() && self.require_authenticated_session {
            return false;
        }

        let user = ticket.and_then(|t| t.user.as_ref());
        if user.is_none() && self.require_authenticated_user_session {
            return false;
        }

        let is_connection = self.flags.contains(FieldFlags::IS_CONNECTION);
        for rule in &self.authorization_rules {
            if (user.is_some() && rule.ignore_on_user_present)
                || (user.is_none() && rule.ignore_on_user_not_present)
            {
                continue;
            }

            if is_connection && !rule.connection_actions.contains(action) {
                continue;
            }

            let privilege = rule.effective_privilege(action);
            if rule.scope != PrivilegeScope::User {
                let client_has_privilege =
                    ticket.is_some_and(|t| t.client_scope.contains(&privilege));
                if !client_has_privilege
                    && matches!(rule.scope, PrivilegeScope::Both | PrivilegeScope::Client)
                {
                    return false;
                }

                if client_has_privilege
                    && matches!(rule.scope, PrivilegeScope::Any | PrivilegeScope::Client)
                {
                    continue;
                }
            }

            if !ticket.is_some_and(|t| t.user_scope.contains(&privilege)) {
                return false;
            }
        }

        true
    }

    /// The most severe log rule that applies to `action`.
    pub fn matching_log_rule(&self, action: ConnectionAction) -> Option<&LogAccessRule> {
        let is_connection = self.flags.contains(FieldFlags::IS_CONNECTION);
        self.log_access_rules
            .iter()
            .filter(|rule| !is_connection || rule.connection_actions.contains(action))
            .max_by_key(|rule| rule.severity)
    }

    /// Severity of the most severe log rule for `action`, if any applies.
    pub fn max_log_severity(&self, action: ConnectionAction) -> Option<Severity> {
        self.matching_log_rule(action).map(|rule| rule.severity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AccessTicket, UserDescription};
    use crate::scalar::ScalarType;

    fn field() -> ApiField {
        ApiField::scalar("secret", ScalarType::String, FieldFlags::QUERYABLE).unwrap()
    }

    fn user_context(user_scope: &[&str], client_scope: &[&str]) -> RequestContext {
        RequestContext::with_ticket(
            AccessTicket::for_client("web")
                .with_user(UserDescription::new("alice", "1"))
                .with_user_scope(user_scope.iter().copied())
                .with_client_scope(client_scope.iter().copied()),
        )
    }

    fn client_context(client_scope: &[&str]) -> RequestContext {
        RequestContext::with_ticket(
            AccessTicket::for_client("svc").with_client_scope(client_scope.iter().copied()),
        )
    }

    #[test]
    fn test_session_requirements() {
        let anonymous = RequestContext::anonymous();
        assert!(field().check_authorization(&anonymous, ConnectionAction::Query));

        let session = field().require_session();
        assert!(!session.check_authorization(&anonymous, ConnectionAction::Query));
        assert!(session.check_authorization(&client_context(&[]), ConnectionAction::Query));

        let user = field().require_user();
        assert!(!user.check_authorization(&anonymous, ConnectionAction::Query));
        assert!(!user.check_authorization(&client_context(&[]), ConnectionAction::Query));
        assert!(user.check_authorization(&user_context(&[], &[]), ConnectionAction::Query));
    }

    #[test]
    fn test_user_scope_rule() {
        let field = field().with_authorization_rule(AuthorizationRule::new("orders.read"));
        assert!(field.check_authorization(&user_context(&["orders.read"], &[]), ConnectionAction::Query));
        assert!(!field.check_authorization(&user_context(&[], &["orders.read"]), ConnectionAction::Query));
    }

    #[test]
    fn test_client_and_any_scopes() {
        let client = field().with_authorization_rule(
            AuthorizationRule::new("p").with_scope(PrivilegeScope::Client),
        );
        assert!(client.check_authorization(&client_context(&["p"]), ConnectionAction::Query));
        assert!(!client.check_authorization(&user_context(&["p"], &[]), ConnectionAction::Query));

        let any = field().with_authorization_rule(
            AuthorizationRule::new("p").with_scope(PrivilegeScope::Any),
        );
        assert!(any.check_authorization(&client_context(&["p"]), ConnectionAction::Query));
        assert!(any.check_authorization(&user_context(&["p"], &[]), ConnectionAction::Query));
        assert!(!any.check_authorization(&user_context(&[], &[]), ConnectionAction::Query));

        let both = field().with_authorization_rule(
            AuthorizationRule::new("p").with_scope(PrivilegeScope::Both),
        );
        assert!(!both.check_authorization(&client_context(&["p"]), ConnectionAction::Query));
        assert!(both.check_authorization(&user_context(&["p"], &["p"]), ConnectionAction::Query));
    }

    #[test]
    fn test_ignored_rules_and_connection_actions() {
        let field = ApiField::object("orders", "Order", FieldFlags::IS_CONNECTION | FieldFlags::QUERYABLE)
            .unwrap()
            .with_authorization_rule(
                AuthorizationRule::new("orders")
                    .with_action_name()
                    .for_actions(ConnectionActions::of(&[ConnectionAction::Delete])),
            )
            .with_authorization_rule(AuthorizationRule::new("staff").ignore_on_user_not_present());

        let service = client_context(&[]);
        assert!(field.check_authorization(&service, ConnectionAction::Query));
        assert!(!field.check_authorization(&service, ConnectionAction::Delete));

        let admin = user_context(&["orders.Delete", "staff"], &[]);
        assert!(field.check_authorization(&admin, ConnectionAction::Delete));
        assert!(!field.check_authorization(&user_context(&["orders.Delete"], &[]), ConnectionAction::Query));
    }

    #[test]
    fn test_matching_log_rule_picks_highest_severity() {
        let field = ApiField::object("orders", "Order", FieldFlags::IS_CONNECTION | FieldFlags::QUERYABLE)
            .unwrap()
            .with_log_rule(LogAccessRule::new(Severity::Minor, "read {ApiPath}"))
            .with_log_rule(
                LogAccessRule::new(Severity::Crucial, "delete {ApiPath}")
                    .for_actions(ConnectionAction::Delete.into()),
            );

        assert_eq!(field.max_log_severity(ConnectionAction::Query), Some(Severity::Minor));
        assert_eq!(field.max_log_severity(ConnectionAction::Delete), Some(Severity::Crucial));
        assert_eq!(Severity::default(), Severity::Trivial);
    }
}
