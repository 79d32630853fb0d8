//! Naming rules for published type names.

use regex::Regex;
use std::borrow::Cow;
use std::sync::OnceLock;

fn non_alphanumeric() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("[^a-zA-Z0-9]").expect("static pattern"))
}

/// Replaces every character outside `[a-zA-Z0-9]` with `_`.
pub fn escape_name(name: &str) -> Cow<'_, str> {
    non_alphanumeric().replace_all(name, "_")
}

/// Builds the provider-qualified name `{api}_{type}` with both parts escaped.
pub fn qualified_name(api: &str, type_name: &str) -> String {
    format!("{}_{}", escape_name(api), escape_name(type_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_name() {
        assert_eq!(escape_name("orders.create"), "orders_create");
        assert_eq!(escape_name("Kite.Web-Api v2"), "Kite_Web_Api_v2");
        assert_eq!(escape_name("Plain42"), "Plain42");
    }

    #[test]
    fn test_qualified_name() {
        assert_eq!(qualified_name("billing-api", "Order"), "billing_api_Order");
    }
}
