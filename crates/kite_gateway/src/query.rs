//! The federated query model.
//!
//! Callers do not send query text. A query is a tree of field selections
//! against the merged root, optionally grouped by inline fragments with a
//! type condition.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A selection tree against the merged root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub selections: Vec<Selection>,
}

impl Query {
    pub fn new(selections: Vec<Selection>) -> Self {
        Self { selections }
    }

    /// Depth of the deepest field selection.
    pub fn depth(&self) -> usize {
        selection_depth(&self.selections)
    }
}

fn selection_depth(selections: &[Selection]) -> usize {
    selections
        .iter()
        .map(|selection| match selection {
            Selection::Field(field) => 1 + selection_depth(&field.selections),
            Selection::InlineFragment(fragment) => selection_depth(&fragment.selections),
        })
        .max()
        .unwrap_or(0)
}

/// One entry of a selection set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Selection {
    Field(FieldSelection),
    InlineFragment(InlineFragment),
}

impl Selection {
    /// Selects a field by name.
    pub fn field(name: impl Into<String>) -> FieldSelection {
        FieldSelection::new(name)
    }

    /// An inline fragment applying to `type_condition`.
    pub fn on(type_condition: impl Into<String>, selections: Vec<Selection>) -> Self {
        Selection::InlineFragment(InlineFragment {
            type_condition: Some(type_condition.into()),
            selections,
        })
    }
}

impl From<FieldSelection> for Selection {
    fn from(field: FieldSelection) -> Self {
        Selection::Field(field)
    }
}

/// A selected field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSelection {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub selections: Vec<Selection>,
}

impl FieldSelection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            arguments: None,
            selections: Vec::new(),
        }
    }

    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    #[must_use]
    pub fn arguments(mut self, arguments: Value) -> Self {
        self.arguments = Some(arguments);
        self
    }

    /// Sets the nested selections.
    #[must_use]
    pub fn select(mut self, selections: Vec<Selection>) -> Self {
        self.selections = selections;
        self
    }

    /// The key this field's value is stored under in the response.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// A group of selections that applies only to matching types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InlineFragment {
    /// A type name, a provider interface name or `Node`; `None` always applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub type_condition: Option<String>,
    pub selections: Vec<Selection>,
}

/// Builds a field selection list from plain names.
///
/// ```
/// use kite_gateway::query::{fields, Selection};
///
/// let selections = fields(["id", "name"]);
/// assert!(matches!(&selections[0], Selection::Field(f) if f.name == "id"));
/// ```
pub fn fields<I, S>(names: I) -> Vec<Selection>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names
        .into_iter()
        .map(|name| Selection::Field(FieldSelection::new(name)))
        .collect()
}
