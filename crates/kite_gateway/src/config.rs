//! Gateway configuration.

use std::time::Duration;

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// Maximum selection depth of a federated query.
    pub max_depth: Option<usize>,
    /// Upper bound for one provider call.
    pub dispatch_timeout: Option<Duration>,
    /// Name of the root global-id lookup field.
    pub node_field: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            dispatch_timeout: None,
            node_field: "node".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Creates a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets maximum query depth.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Bounds every provider call; expiry counts as a dispatch failure.
    #[must_use]
    pub fn with_dispatch_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn with_node_field(mut self, name: impl Into<String>) -> Self {
        self.node_field = name.into();
        self
    }
}
