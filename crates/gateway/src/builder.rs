use std::sync::Arc;

use herald_core::{NotificationTypeDefinition, NotificationTypeRegistry};
use herald_executor::{
    AdaptiveRateLimitFeedback, DeadLetterStore, InMemoryDeadLetterStore, MetricsSink,
    NoopMetrics, ResilienceRegistry,
};
use herald_provider::{DynFormatter, DynSender, FormatterKey, FormatterRegistry, SenderRegistry};
use tracing::info;

use crate::config::HeraldConfig;
use crate::dispatcher::Dispatcher;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::pool::ExecutionPool;
use crate::publisher::Publisher;
use crate::reprocess::DeadLetterReprocessor;
use crate::routing::{RoutingResolver, RoutingSource};

/// Fluent builder for constructing a [`Gateway`] instance.
///
/// Everything is optional. Without a routing source the `[routing]` section
/// of the configuration is used; without a dead-letter store an in-memory
/// one is created; without a metrics sink events are discarded.
/// Registrations are validated in [`build`](Self::build), so duplicates
/// surface there as [`GatewayError::Registry`].
pub struct GatewayBuilder {
    config: HeraldConfig,
    types: Option<Arc<NotificationTypeRegistry>>,
    type_definitions: Vec<NotificationTypeDefinition>,
    formatters: Vec<(FormatterKey, Arc<dyn DynFormatter>)>,
    senders: Vec<Arc<dyn DynSender>>,
    routing: Option<Arc<dyn RoutingSource>>,
    dead_letters: Option<Arc<dyn DeadLetterStore>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl GatewayBuilder {
    /// Create a new builder with default configuration and nothing
    /// registered.
    pub fn new() -> Self {
        Self {
            config: HeraldConfig::default(),
            types: None,
            type_definitions: Vec::new(),
            formatters: Vec::new(),
            senders: Vec::new(),
            routing: None,
            dead_letters: None,
            metrics: None,
        }
    }

    #[must_use]
    pub fn config(mut self, config: HeraldConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing type registry, e.g. one a formatter already holds.
    #[must_use]
    pub fn type_registry(mut self, types: Arc<NotificationTypeRegistry>) -> Self {
        self.types = Some(types);
        self
    }

    /// Register a notification type definition.
    #[must_use]
    pub fn notification_type(mut self, definition: NotificationTypeDefinition) -> Self {
        self.type_definitions.push(definition);
        self
    }

    /// Register a formatter for one type on one platform.
    #[must_use]
    pub fn formatter(
        mut self,
        platform: impl Into<String>,
        type_id: impl Into<String>,
        formatter: Arc<dyn DynFormatter>,
    ) -> Self {
        self.formatters
            .push((FormatterKey::specific(platform, type_id), formatter));
        self
    }

    /// Register a platform's fallback formatter.
    #[must_use]
    pub fn fallback_formatter(
        mut self,
        platform: impl Into<String>,
        formatter: Arc<dyn DynFormatter>,
    ) -> Self {
        self.formatters
            .push((FormatterKey::fallback(platform), formatter));
        self
    }

    /// Register a sender under its own platform identifier.
    #[must_use]
    pub fn sender(mut self, sender: Arc<dyn DynSender>) -> Self {
        self.senders.push(sender);
        self
    }

    /// Replace the configured routing table with another source.
    #[must_use]
    pub fn routing_source(mut self, source: Arc<dyn RoutingSource>) -> Self {
        self.routing = Some(source);
        self
    }

    #[must_use]
    pub fn dead_letter_store(mut self, store: Arc<dyn DeadLetterStore>) -> Self {
        self.dead_letters = Some(store);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Consume the builder and produce a configured [`Gateway`].
    ///
    /// Fails with [`GatewayError::Configuration`] for invalid configuration
    /// and [`GatewayError::Registry`] for duplicate registrations.
    pub fn build(self) -> Result<Gateway, GatewayError> {
        self.config.validate()?;
        let config = self.config;

        let types = self
            .types
            .unwrap_or_else(|| Arc::new(NotificationTypeRegistry::new()));
        for definition in self.type_definitions {
            types.register(definition)?;
        }

        let formatters = FormatterRegistry::new();
        for (key, formatter) in self.formatters {
            formatters.insert(key, formatter)?;
        }
        let formatters = Arc::new(formatters);

        let mut senders = SenderRegistry::new();
        for sender in self.senders {
            senders.register(sender)?;
        }
        let senders = Arc::new(senders);

        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(NoopMetrics) as Arc<dyn MetricsSink>);
        let dead_letters = self
            .dead_letters
            .unwrap_or_else(|| Arc::new(InMemoryDeadLetterStore::new()) as Arc<dyn DeadLetterStore>);
        let routing = self
            .routing
            .unwrap_or_else(|| Arc::new(config.routing.clone()) as Arc<dyn RoutingSource>);

        let feedback = Arc::new(AdaptiveRateLimitFeedback::new(
            config.adaptive.enabled,
            config.adaptive.default_cooldown(),
            Arc::clone(&metrics),
        ));
        let mut resilience = ResilienceRegistry::new(
            config.resilience.gate_config(),
            feedback,
            Arc::clone(&metrics),
        );
        for resource in config.resilience.overrides.keys() {
            resilience =
                resilience.with_override(resource, config.resilience.gate_config_for(resource));
        }
        let resilience = Arc::new(resilience);

        let dispatcher = Arc::new(Dispatcher::new(
            RoutingResolver::new(routing),
            Arc::clone(&formatters),
            Arc::clone(&senders),
            Arc::clone(&resilience),
            Arc::clone(&dead_letters),
            Arc::clone(&metrics),
        ));
        let reprocessor = DeadLetterReprocessor::new(
            Arc::clone(&formatters),
            Arc::clone(&senders),
            Arc::clone(&resilience),
            Arc::clone(&dead_letters),
            Arc::clone(&metrics),
        )
        .allow_abandoned(config.dead_letter.allow_reprocess_abandoned);
        let pool = Arc::new(ExecutionPool::new(config.pool.clone(), Arc::clone(&metrics)));
        let publisher = Publisher::new(Arc::clone(&pool), Arc::clone(&dispatcher));

        info!(
            types = types.len(),
            formatters = formatters.len(),
            senders = senders.len(),
            pool_mode = ?config.pool.mode,
            "gateway built"
        );

        Ok(Gateway {
            config,
            types,
            formatters,
            senders,
            resilience,
            dead_letters,
            dispatcher,
            publisher,
            reprocessor,
            pool,
            metrics,
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}
