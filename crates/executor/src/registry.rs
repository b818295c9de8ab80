use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::debug;

use crate::circuit_breaker::CircuitState;
use crate::config::GateConfig;
use crate::feedback::AdaptiveRateLimitFeedback;
use crate::gate::ResilienceGate;
use crate::metrics::MetricsSink;

/// Owns the per-endpoint [`ResilienceGate`]s, keyed by resource key
/// (`platform:endpointKey`).
///
/// Gates are created lazily on first use from the default configuration or
/// the resource's override.
pub struct ResilienceRegistry {
    defaults: GateConfig,
    overrides: HashMap<String, GateConfig>,
    gates: DashMap<String, Arc<ResilienceGate>>,
    feedback: Arc<AdaptiveRateLimitFeedback>,
    metrics: Arc<dyn MetricsSink>,
}

impl ResilienceRegistry {
    pub fn new(
        defaults: GateConfig,
        feedback: Arc<AdaptiveRateLimitFeedback>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            defaults,
            overrides: HashMap::new(),
            gates: DashMap::new(),
            feedback,
            metrics,
        }
    }

    /// Use `config` instead of the defaults for one resource key.
    #[must_use]
    pub fn with_override(mut self, resource: impl Into<String>, config: GateConfig) -> Self {
        self.overrides.insert(resource.into(), config);
        self
    }

    /// The gate for `resource`, created on first use.
    pub fn gate(&self, resource: &str) -> Arc<ResilienceGate> {
        if let Some(gate) = self.gates.get(resource) {
            return Arc::clone(gate.value());
        }
        let gate = self
            .gates
            .entry(resource.to_owned())
            .or_insert_with(|| {
                let config = self
                    .overrides
                    .get(resource)
                    .unwrap_or(&self.defaults)
                    .clone();
                debug!(resource, "creating resilience gate");
                Arc::new(ResilienceGate::new(
                    resource,
                    config,
                    Arc::clone(&self.feedback),
                    Arc::clone(&self.metrics),
                ))
            });
        Arc::clone(gate.value())
    }

    /// Apply provider rate-limit feedback to a resource outside a gated call.
    pub fn on_rate_limited(&self, resource: &str, retry_after: Option<Duration>) -> Option<Duration> {
        let gate = self.gate(resource);
        self.feedback
            .on_rate_limited(resource, gate.rate_limiter(), retry_after)
    }

    /// Circuit state for a resource that has been used, else `None`.
    pub fn circuit_state(&self, resource: &str) -> Option<CircuitState> {
        self.gates.get(resource).map(|gate| gate.circuit_state())
    }

    /// Circuit state of every resource seen so far, ordered by key.
    pub fn circuit_states(&self) -> BTreeMap<String, CircuitState> {
        self.gates
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().circuit_state()))
            .collect()
    }

    /// Sorted resource keys with a gate.
    pub fn resources(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.gates.iter().map(|e| e.key().clone()).collect();
        keys.sort_unstable();
        keys
    }

    pub fn defaults(&self) -> &GateConfig {
        &self.defaults
    }
}

impl std::fmt::Debug for ResilienceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceRegistry")
            .field("resources", &self.resources())
            .field("overrides", &self.overrides.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::NoopMetrics;

    fn registry() -> ResilienceRegistry {
        ResilienceRegistry::new(
            GateConfig::default(),
            Arc::new(AdaptiveRateLimitFeedback::default()),
            Arc::new(NoopMetrics),
        )
    }

    #[test]
    fn gates_are_created_once_per_resource() {
        let reg = registry();
        let a = reg.gate("slack:alerts");
        let b = reg.gate("slack:alerts");
        assert!(Arc::ptr_eq(&a, &b));
        reg.gate("discord:ops");
        assert_eq!(reg.resources(), vec!["discord:ops", "slack:alerts"]);
    }

    #[test]
    fn overrides_apply_to_their_resource_only() {
        let strict = GateConfig {
            max_attempts: 7,
            ..GateConfig::default()
        };
        let reg = registry().with_override("slack:alerts", strict);
        assert_eq!(reg.gate("slack:alerts").config().max_attempts, 7);
        assert_eq!(reg.gate("slack:other").config().max_attempts, 3);
    }

    #[test]
    fn circuit_states_reported_for_known_resources() {
        let reg = registry();
        assert!(reg.circuit_state("slack:alerts").is_none());
        reg.gate("slack:alerts");
        assert_eq!(reg.circuit_state("slack:alerts"), Some(CircuitState::Closed));
        let states = reg.circuit_states();
        assert_eq!(states.len(), 1);
        assert_eq!(states["slack:alerts"], CircuitState::Closed);
    }

    #[test]
    fn external_feedback_throttles_the_gate() {
        let reg = registry();
        let cooldown = reg.on_rate_limited("slack:alerts", None);
        assert_eq!(cooldown, Some(crate::feedback::DEFAULT_COOLDOWN));
        assert_eq!(
            reg.gate("slack:alerts").rate_limiter().cooldown(),
            Some(crate::feedback::DEFAULT_COOLDOWN)
        );
    }
}
