use std::collections::HashMap;
use std::sync::Arc;

use herald_core::RoutingTarget;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// One routing rule: deliver to `endpoint_key` on `platform`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteMapping {
    pub platform: String,
    pub endpoint_key: String,
    /// Inline URL; when absent the endpoint table is consulted.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl RouteMapping {
    pub fn new(platform: impl Into<String>, endpoint_key: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            endpoint_key: endpoint_key.into(),
            url: None,
            enabled: true,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    #[must_use]
    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Supplies tiered routing data and endpoint URLs.
pub trait RoutingSource: Send + Sync {
    /// Mappings for an exact notification type.
    fn type_routes(&self, type_id: &str) -> &[RouteMapping];

    /// Mappings for a notification category.
    fn category_routes(&self, category: &str) -> &[RouteMapping];

    /// Mappings used when neither the type nor the category matched.
    fn default_routes(&self) -> &[RouteMapping];

    /// The URL registered for `platform` / `endpoint_key`.
    fn endpoint_url(&self, platform: &str, endpoint_key: &str) -> Option<&str>;
}

/// Routing data held in memory, deserialized from the `[routing]` config
/// section.
///
/// # Example
///
/// ```toml
/// [routing.endpoints.slack]
/// alerts = "https://hooks.slack.com/services/T000/B000/XXXX"
///
/// [[routing.types."build.failed"]]
/// platform = "slack"
/// endpoint_key = "alerts"
///
/// [[routing.default]]
/// platform = "discord"
/// endpoint_key = "general"
/// url = "https://discord.com/api/webhooks/1/abc"
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticRoutingTable {
    /// `platform -> endpoint_key -> url`.
    #[serde(default)]
    pub endpoints: HashMap<String, HashMap<String, String>>,
    #[serde(default)]
    pub types: HashMap<String, Vec<RouteMapping>>,
    #[serde(default)]
    pub categories: HashMap<String, Vec<RouteMapping>>,
    #[serde(default)]
    pub default: Vec<RouteMapping>,
}

impl StaticRoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn endpoint(
        mut self,
        platform: impl Into<String>,
        endpoint_key: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        self.endpoints
            .entry(platform.into())
            .or_default()
            .insert(endpoint_key.into(), url.into());
        self
    }

    #[must_use]
    pub fn route_type(mut self, type_id: impl Into<String>, mapping: RouteMapping) -> Self {
        self.types.entry(type_id.into()).or_default().push(mapping);
        self
    }

    #[must_use]
    pub fn route_category(mut self, category: impl Into<String>, mapping: RouteMapping) -> Self {
        self.categories
            .entry(category.into())
            .or_default()
            .push(mapping);
        self
    }

    #[must_use]
    pub fn route_default(mut self, mapping: RouteMapping) -> Self {
        self.default.push(mapping);
        self
    }
}

impl RoutingSource for StaticRoutingTable {
    fn type_routes(&self, type_id: &str) -> &[RouteMapping] {
        self.types.get(type_id).map_or(&[], Vec::as_slice)
    }

    fn category_routes(&self, category: &str) -> &[RouteMapping] {
        self.categories.get(category).map_or(&[], Vec::as_slice)
    }

    fn default_routes(&self) -> &[RouteMapping] {
        &self.default
    }

    fn endpoint_url(&self, platform: &str, endpoint_key: &str) -> Option<&str> {
        self.endpoints
            .get(platform)?
            .get(endpoint_key)
            .map(String::as_str)
    }
}

/// Resolves a notification's type and category to delivery targets.
///
/// Tiers are tried in order (exact type, category, default) and the first
/// tier that yields at least one usable target wins; tiers never merge.
#[derive(Clone)]
pub struct RoutingResolver {
    source: Arc<dyn RoutingSource>,
}

impl RoutingResolver {
    pub fn new(source: Arc<dyn RoutingSource>) -> Self {
        Self { source }
    }

    /// Ordered targets for the notification; empty if nothing is routable.
    pub fn resolve(&self, type_id: &str, category: &str) -> Vec<RoutingTarget> {
        let tiers = [
            ("type", self.source.type_routes(type_id)),
            ("category", self.source.category_routes(category)),
            ("default", self.source.default_routes()),
        ];

        for (tier, mappings) in tiers {
            let targets = self.usable(mappings);
            if !targets.is_empty() {
                debug!(type_id, category, tier, targets = targets.len(), "routes resolved");
                return targets;
            }
        }

        debug!(type_id, category, "no routes, dropping notification");
        Vec::new()
    }

    fn usable(&self, mappings: &[RouteMapping]) -> Vec<RoutingTarget> {
        mappings
            .iter()
            .filter(|m| m.enabled)
            .filter_map(|m| {
                let url = m
                    .url
                    .as_deref()
                    .filter(|u| !u.trim().is_empty())
                    .or_else(|| self.source.endpoint_url(&m.platform, &m.endpoint_key));
                match url {
                    Some(url) => Some(RoutingTarget::new(&m.platform, &m.endpoint_key, url)),
                    None => {
                        warn!(
                            platform = %m.platform,
                            endpoint_key = %m.endpoint_key,
                            "route has no resolvable url, skipping"
                        );
                        None
                    }
                }
            })
            .collect()
    }
}

impl std::fmt::Debug for RoutingResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoutingResolver").finish_non_exhaustive()
    }
}
