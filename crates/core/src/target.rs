use std::fmt;

use serde::{Deserialize, Serialize};

/// A resolved delivery destination for one notification.
///
/// Targets are value types produced fresh by every routing resolution. The
/// pair `(platform, endpoint_key)` identifies the resilience resource that
/// guards deliveries to this endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingTarget {
    /// Platform identifier, e.g. `slack` or `discord`.
    pub platform: String,
    /// Logical endpoint name within the platform, e.g. `alerts`.
    pub endpoint_key: String,
    /// Fully resolved webhook URL.
    pub url: String,
}

impl RoutingTarget {
    /// Create a new routing target.
    pub fn new(
        platform: impl Into<String>,
        endpoint_key: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            platform: platform.into(),
            endpoint_key: endpoint_key.into(),
            url: url.into(),
        }
    }

    /// The `platform:endpointKey` resource key scoping circuit breaker, rate
    /// limiter, and bulkhead state.
    ///
    /// ```
    /// use herald_core::RoutingTarget;
    ///
    /// let target = RoutingTarget::new("slack", "alerts", "https://hooks.example/1");
    /// assert_eq!(target.resource_key(), "slack:alerts");
    /// ```
    pub fn resource_key(&self) -> String {
        resource_key(&self.platform, &self.endpoint_key)
    }
}

impl fmt::Display for RoutingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.platform, self.endpoint_key)
    }
}

/// Build a resource key from its parts.
pub fn resource_key(platform: &str, endpoint_key: &str) -> String {
    format!("{platform}:{endpoint_key}")
}
