//! Filter expressions over provider objects.

use crate::object::ScalarGetter;
use kite_schema::{ScalarType, ScalarValue};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt;

/// A comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    Contains,
    StartsWith,
    EndsWith,
    /// The field value is a substring of the literal.
    In,
}

impl CompareOp {
    fn apply(self, actual: &ScalarValue, literal: &ScalarValue) -> bool {
        let ordering = actual.compare(literal);
        let strings = || actual.as_str().zip(literal.as_str());
        match self {
            CompareOp::Eq => ordering == Some(Ordering::Equal),
            CompareOp::Ne => ordering != Some(Ordering::Equal),
            CompareOp::Lt => ordering == Some(Ordering::Less),
            CompareOp::Lte => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
            CompareOp::Gt => ordering == Some(Ordering::Greater),
            CompareOp::Gte => matches!(ordering, Some(Ordering::Greater | Ordering::Equal)),
            CompareOp::Contains => strings().is_some_and(|(a, l)| a.contains(l)),
            CompareOp::StartsWith => strings().is_some_and(|(a, l)| a.starts_with(l)),
            CompareOp::EndsWith => strings().is_some_and(|(a, l)| a.ends_with(l)),
            CompareOp::In => strings().is_some_and(|(a, l)| l.contains(a)),
        }
    }

    fn is_textual(self) -> bool {
        matches!(
            self,
            CompareOp::Contains | CompareOp::StartsWith | CompareOp::EndsWith | CompareOp::In
        )
    }
}

/// A compiled filter over `T`.
pub enum Filter<T> {
    Always(bool),
    Compare {
        field: String,
        accessor: ScalarGetter<T>,
        op: CompareOp,
        literal: ScalarValue,
        lowercase: bool,
    },
    Not(Box<Filter<T>>),
    And(Vec<Filter<T>>),
    Or(Vec<Filter<T>>),
}

impl<T> Filter<T> {
    /// Evaluates the filter for one item.
    pub fn matches(&self, item: &T) -> bool {
        match self {
            Filter::Always(value) => *value,
            Filter::Compare {
                accessor,
                op,
                literal,
                lowercase,
                ..
            } => {
                let actual = accessor(item);
                let actual = match actual {
                    ScalarValue::String(s) if *lowercase => ScalarValue::String(s.to_lowercase()),
                    other => other,
                };
                op.apply(&actual, literal)
            }
            Filter::Not(inner) => !inner.matches(item),
            Filter::And(filters) => filters.iter().all(|f| f.matches(item)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(item)),
        }
    }

    /// Conjunction of two filters.
    pub fn and(self, other: Filter<T>) -> Filter<T> {
        match (self, other) {
            (Filter::Always(true), f) | (f, Filter::Always(true)) => f,
            (a, b) => Filter::And(vec![a, b]),
        }
    }
}

impl<T> fmt::Debug for Filter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::Always(value) => write!(f, "{value}"),
            Filter::Compare {
                field,
                op,
                literal,
                lowercase,
                ..
            } => {
                let field = if *lowercase {
                    format!("lower({field})")
                } else {
                    field.clone()
                };
                write!(f, "{field} {op:?} {literal:?}")
            }
            Filter::Not(inner) => write!(f, "!({inner:?})"),
            Filter::And(filters) => f.debug_tuple("And").field(filters).finish(),
            Filter::Or(filters) => f.debug_tuple("Or").field(filters).finish(),
        }
    }
}

/// One key of the filter input type, e.g. `name_l_not_contains`.
pub(crate) struct FilterCheck<T> {
    pub(crate) field: String,
    pub(crate) accessor: ScalarGetter<T>,
    pub(crate) scalar_type: ScalarType,
    pub(crate) op: CompareOp,
    pub(crate) negate: bool,
    pub(crate) lowercase: bool,
}

impl<T> FilterCheck<T> {
    /// The literal type the check accepts.
    pub(crate) fn literal_type(&self) -> ScalarType {
        if self.op.is_textual() || self.lowercase {
            ScalarType::String
        } else {
            self.scalar_type
        }
    }

    /// Compiles the check against one literal.
    ///
    /// A literal that cannot be coerced yields a false condition.
    pub(crate) fn compile(&self, literal: &Value) -> Filter<T> {
        let Some(literal) = ScalarValue::from_json(self.literal_type(), literal) else {
            return Filter::Always(false);
        };

        let compare = Filter::Compare {
            field: self.field.clone(),
            accessor: self.accessor.clone(),
            op: self.op,
            literal,
            lowercase: self.lowercase,
        };
        if self.negate {
            Filter::Not(Box::new(compare))
        } else {
            compare
        }
    }
}

const ORDERED_SUFFIXES: [(&str, CompareOp); 4] = [
    ("lt", CompareOp::Lt),
    ("lte", CompareOp::Lte),
    ("gt", CompareOp::Gt),
    ("gte", CompareOp::Gte),
];

const TEXT_SUFFIXES: [(&str, CompareOp); 4] = [
    ("in", CompareOp::In),
    ("contains", CompareOp::Contains),
    ("starts_with", CompareOp::StartsWith),
    ("ends_with", CompareOp::EndsWith),
];

/// Builds every filter key for one filterable field, in publishing order.
pub(crate) fn checks_for<T>(
    field: &str,
    scalar_type: ScalarType,
    accessor: &ScalarGetter<T>,
) -> Vec<(String, FilterCheck<T>)> {
    let check = |op, negate, lowercase| FilterCheck {
        field: field.to_string(),
        accessor: accessor.clone(),
        scalar_type,
        op,
        negate,
        lowercase,
    };

    let mut checks = vec![
        (field.to_string(), check(CompareOp::Eq, false, false)),
        (format!("{field}_not"), check(CompareOp::Ne, false, false)),
    ];

    if scalar_type.is_ordered() {
        for (suffix, op) in ORDERED_SUFFIXES {
            checks.push((format!("{field}_{suffix}"), check(op, false, false)));
        }
    }

    if scalar_type == ScalarType::String {
        for (suffix, op) in TEXT_SUFFIXES {
            checks.push((format!("{field}_{suffix}"), check(op, false, false)));
            checks.push((format!("{field}_not_{suffix}"), check(op, true, false)));
        }
        checks.push((format!("{field}_l"), check(CompareOp::Eq, false, true)));
        checks.push((format!("{field}_l_not"), check(CompareOp::Ne, false, true)));
        for (suffix, op) in TEXT_SUFFIXES {
            checks.push((format!("{field}_l_{suffix}"), check(op, false, true)));
            checks.push((format!("{field}_l_not_{suffix}"), check(op, true, true)));
        }
    }

    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    struct Person {
        name: String,
        age: Option<i64>,
    }

    fn name() -> ScalarGetter<Person> {
        Arc::new(|p: &Person| ScalarValue::from(p.name.clone()))
    }

    fn age() -> ScalarGetter<Person> {
        Arc::new(|p: &Person| ScalarValue::from(p.age))
    }

    fn check(checks: &[(String, FilterCheck<Person>)], key: &str, literal: Value) -> Filter<Person> {
        checks
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, check)| check.compile(&literal))
            .unwrap()
    }

    #[test]
    fn test_check_names() {
        let names: Vec<_> = checks_for("age", ScalarType::Integer, &age())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["age", "age_not", "age_lt", "age_lte", "age_gt", "age_gte"]);

        let names: Vec<_> = checks_for("name", ScalarType::String, &name())
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names.len(), 20);
        assert!(names.contains(&"name_l_not_starts_with".to_string()));
        assert!(names.contains(&"name_not_in".to_string()));
    }

    #[test]
    fn test_text_and_lowercase_operators() {
        let checks = checks_for("name", ScalarType::String, &name());
        let ada = Person {
            name: "Ada Lovelace".to_string(),
            age: Some(36),
        };

        assert!(check(&checks, "name_contains", json!("Love")).matches(&ada));
        assert!(!check(&checks, "name_contains", json!("love")).matches(&ada));
        assert!(check(&checks, "name_l_contains", json!("love")).matches(&ada));
        assert!(check(&checks, "name_not_starts_with", json!("Bob")).matches(&ada));
        assert!(check(&checks, "name_in", json!("Ada Lovelace, Grace Hopper")).matches(&ada));
        assert!(check(&checks, "name_l", json!("ada lovelace")).matches(&ada));
    }

    #[test]
    fn test_null_and_coercion() {
        let checks = checks_for("age", ScalarType::Integer, &age());
        let unknown = Person {
            name: "Anon".to_string(),
            age: None,
        };

        assert!(check(&checks, "age", json!(null)).matches(&unknown));
        assert!(check(&checks, "age_not", json!(3)).matches(&unknown));
        assert!(!check(&checks, "age_gt", json!(3)).matches(&unknown));
        assert!(!check(&checks, "age_lt", json!(3)).matches(&unknown));
        assert!(matches!(
            check(&checks, "age_gt", json!("three")),
            Filter::Always(false)
        ));
    }
}
