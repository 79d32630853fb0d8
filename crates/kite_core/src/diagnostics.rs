//! Diagnostic reporting for Kite.
//!
//! Schema declaration and merge problems are collected into a [`DiagnosticBag`]
//! instead of failing on the first one, so a gateway operator sees every
//! conflicting provider declaration at once.

use std::fmt;

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DiagnosticSeverity {
    /// An error that prevents the schema from being published.
    Error,
    /// A warning that doesn't prevent publishing.
    Warning,
}

/// A label attached to a diagnostic.
///
/// Locations are schema paths such as `orders.Order.status` rather than
/// source spans: declarations arrive as data, not as text.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Label {
    /// The schema path this label points to.
    pub location: String,
    /// The label message.
    pub message: String,
}

impl Label {
    /// Creates a new label.
    pub fn new(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            message: message.into(),
        }
    }
}

/// A diagnostic message.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Diagnostic {
    /// Severity level.
    pub severity: DiagnosticSeverity,
    /// Error code.
    pub code: String,
    /// Short title.
    pub title: String,
    /// Detailed message.
    pub message: Option<String>,
    /// Labels pointing to schema locations.
    pub labels: Vec<Label>,
}

impl Diagnostic {
    /// Creates a new error diagnostic.
    pub fn error(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            code: code.into(),
            title: title.into(),
            message: None,
            labels: Vec::new(),
        }
    }

    /// Creates a new warning diagnostic.
    pub fn warning(code: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            code: code.into(),
            title: title.into(),
            message: None,
            labels: Vec::new(),
        }
    }

    /// Adds a message to the diagnostic.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Adds a label to the diagnostic.
    #[must_use]
    pub fn with_label(mut self, label: Label) -> Self {
        self.labels.push(label);
        self
    }

    /// Adds a label at a schema location.
    #[must_use]
    pub fn at(mut self, location: impl Into<String>, message: impl Into<String>) -> Self {
        self.labels.push(Label::new(location, message));
        self
    }

    /// Returns the primary location, if any.
    pub fn primary_location(&self) -> Option<&str> {
        self.labels.first().map(|l| l.location.as_str())
    }

    /// Returns true for error diagnostics.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            DiagnosticSeverity::Error => "error",
            DiagnosticSeverity::Warning => "warning",
        };
        write!(f, "{level}[{}]: {}", self.code, self.title)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        for label in &self.labels {
            write!(f, "\n  --> {}: {}", label.location, label.message)?;
        }
        Ok(())
    }
}

/// A collection of diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticBag {
    /// Creates a new empty diagnostic bag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a diagnostic.
    pub fn add(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// Adds an error diagnostic.
    pub fn error(
        &mut self,
        code: impl Into<String>,
        title: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.add(Diagnostic::error(code, title).at(location, message));
    }

    /// Adds a warning diagnostic.
    pub fn warning(
        &mut self,
        code: impl Into<String>,
        title: impl Into<String>,
        location: impl Into<String>,
        message: impl Into<String>,
    ) {
        self.add(Diagnostic::warning(code, title).at(location, message));
    }

    /// Returns true if there are any errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    /// Returns the number of errors.
    #[must_use]
    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// Returns an iterator over all diagnostics.
    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    /// Returns an iterator over errors.
    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Returns an iterator over warnings.
    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == DiagnosticSeverity::Warning)
    }

    /// Returns true if there are no diagnostics.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// Returns the number of diagnostics.
    #[must_use]
    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }
}

impl fmt::Display for DiagnosticBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, diagnostic) in self.diagnostics.iter().enumerate() {
            if index > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

/// Diagnostic codes.
pub mod codes {
    /// A field was declared with flags its kind does not allow.
    pub const INVALID_FIELD_FLAGS: &str = "E0001";
    /// A scalar field was declared without a scalar type.
    pub const MISSING_SCALAR_TYPE: &str = "E0002";
    /// A provider could not describe one of its registered types.
    pub const GENERATION_FAILED: &str = "E0003";
    pub const UNDEFINED_TYPE: &str = "E0101";
    pub const DUPLICATE_TYPE: &str = "E0102";
    pub const INCOMPATIBLE_FIELD: &str = "E0103";
    pub const DUPLICATE_PROVIDER: &str = "E0104";
    pub const INVALID_MUTATION: &str = "E0105";
    pub const EMPTY_SCHEMA: &str = "W0101";
    /// Providers key the same merged type with different scalar types.
    pub const KEY_TYPE_MISMATCH: &str = "W0102";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bag_counts_errors_only() {
        let mut bag = DiagnosticBag::new();
        bag.error(codes::UNDEFINED_TYPE, "Undefined type", "orders.Order", "missing");
        bag.warning(codes::EMPTY_SCHEMA, "Empty schema", "billing", "no fields");

        assert!(bag.has_errors());
        assert_eq!(bag.error_count(), 1);
        assert_eq!(bag.len(), 2);
        assert_eq!(bag.warnings().count(), 1);
    }

    #[test]
    fn test_diagnostic_display() {
        let diagnostic = Diagnostic::error(codes::INCOMPATIBLE_FIELD, "Incompatible field")
            .with_message("providers disagree")
            .at("Api.orders", "declared by billing");

        assert_eq!(
            diagnostic.to_string(),
            "error[E0103]: Incompatible field: providers disagree\n  --> Api.orders: declared by billing"
        );
        assert_eq!(diagnostic.primary_location(), Some("Api.orders"));
    }
}
