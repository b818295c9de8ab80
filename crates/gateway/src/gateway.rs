use std::sync::Arc;

use herald_core::{Notification, NotificationTypeRegistry};
use herald_executor::{
    CircuitState, DeadLetterStore, MetricsSink, ResilienceRegistry,
};
use herald_provider::{FormatterRegistry, SenderRegistry};
use tokio_util::sync::CancellationToken;
use tracing::info;
use uuid::Uuid;

use crate::config::HeraldConfig;
use crate::dispatcher::{DeliveryReport, Dispatcher};
use crate::error::GatewayError;
use crate::health::HealthReport;
use crate::pool::ExecutionPool;
use crate::publisher::{BatchOptions, BatchResult, Publisher};
use crate::reprocess::{DeadLetterReprocessor, ReprocessOutcome, ReprocessSummary};

/// The notification router.
///
/// Owns every registry, the per-endpoint resilience gates, the dead-letter
/// store, and the execution pool. Build one with
/// [`GatewayBuilder`](crate::GatewayBuilder) and share it behind an `Arc`.
pub struct Gateway {
    pub(crate) config: HeraldConfig,
    pub(crate) types: Arc<NotificationTypeRegistry>,
    pub(crate) formatters: Arc<FormatterRegistry>,
    pub(crate) senders: Arc<SenderRegistry>,
    pub(crate) resilience: Arc<ResilienceRegistry>,
    pub(crate) dead_letters: Arc<dyn DeadLetterStore>,
    pub(crate) dispatcher: Arc<Dispatcher>,
    pub(crate) publisher: Publisher,
    pub(crate) reprocessor: DeadLetterReprocessor,
    pub(crate) pool: Arc<ExecutionPool>,
    pub(crate) metrics: Arc<dyn MetricsSink>,
}

impl Gateway {
    /// Hand a notification to the execution pool for delivery.
    ///
    /// Delivery outcomes are not reported here: failures end up in the
    /// dead-letter store. The only error is a pool that cannot accept work.
    pub async fn publish(&self, notification: Notification) -> Result<(), GatewayError> {
        self.publisher.publish(notification).await?;
        Ok(())
    }

    /// Publish a batch using the configured chunking defaults.
    pub async fn publish_all(
        &self,
        notifications: Vec<Notification>,
    ) -> Result<BatchResult, GatewayError> {
        let options = BatchOptions::from(&self.config.batch);
        self.publisher
            .publish_all(notifications, options, &CancellationToken::new())
            .await
    }

    /// Publish a batch with explicit options and a cancellation token.
    pub async fn publish_all_with(
        &self,
        notifications: Vec<Notification>,
        options: BatchOptions,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, GatewayError> {
        self.publisher
            .publish_all(notifications, options, cancel)
            .await
    }

    /// Deliver a notification on the caller's task and report per target.
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DeliveryReport> {
        self.dispatcher.dispatch(notification).await
    }

    /// Replay one dead-letter entry.
    pub async fn reprocess(&self, id: Uuid) -> Result<ReprocessOutcome, GatewayError> {
        Ok(self.reprocessor.reprocess_by_id(id).await?)
    }

    /// Replay every pending dead-letter entry.
    pub async fn reprocess_pending(&self) -> Result<ReprocessSummary, GatewayError> {
        Ok(self.reprocessor.reprocess_pending().await?)
    }

    /// Circuit state of every endpoint used so far, plus dead-letter counts.
    pub async fn health(&self) -> Result<HealthReport, GatewayError> {
        let dead_letters = self.dead_letters.counts().await?;
        Ok(HealthReport::new(
            self.resilience.circuit_states(),
            dead_letters,
        ))
    }

    /// Circuit state for a resource key (`platform:endpointKey`), or `None`
    /// if the endpoint has not been used yet.
    pub fn circuit_state(&self, resource: &str) -> Option<CircuitState> {
        self.resilience.circuit_state(resource)
    }

    /// Stop accepting notifications and drain the pool.
    ///
    /// Returns `false` if in-flight work outlived the drain timeout.
    pub async fn shutdown(&self) -> bool {
        let drained = self.pool.shutdown().await;
        info!(drained, "gateway shutdown complete");
        drained
    }

    pub fn dead_letters(&self) -> &Arc<dyn DeadLetterStore> {
        &self.dead_letters
    }

    pub fn type_registry(&self) -> &Arc<NotificationTypeRegistry> {
        &self.types
    }

    /// Formatter registry; formatters may still be added after build.
    pub fn formatters(&self) -> &Arc<FormatterRegistry> {
        &self.formatters
    }

    pub fn senders(&self) -> &Arc<SenderRegistry> {
        &self.senders
    }

    pub fn resilience(&self) -> &Arc<ResilienceRegistry> {
        &self.resilience
    }

    pub fn metrics(&self) -> &Arc<dyn MetricsSink> {
        &self.metrics
    }

    pub fn config(&self) -> &HeraldConfig {
        &self.config
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("types", &self.types.len())
            .field("formatters", &self.formatters.len())
            .field("senders", &self.senders.list())
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}
