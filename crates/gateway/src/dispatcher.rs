use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::join_all;
use herald_core::{DeliveryFailure, Notification, RoutingTarget};
use herald_executor::{
    DeadLetterEntry, DeadLetterStore, MetricsSink, PipelineEvent, ResilienceRegistry,
};
use herald_provider::{FormatterRegistry, SenderRegistry, is_empty_payload};
use tracing::{debug, error, instrument, warn};
use uuid::Uuid;

use crate::routing::RoutingResolver;

/// What happened to one routing target of a dispatched notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub target: RoutingTarget,
    /// Send attempts made; zero when the target failed before sending.
    pub attempts: u32,
    /// Terminal failure, or `None` if the payload was delivered.
    pub failure: Option<DeliveryFailure>,
    /// Dead-letter entry written for the failure, if the store accepted it.
    pub dead_letter_id: Option<Uuid>,
}

impl DeliveryReport {
    pub fn is_delivered(&self) -> bool {
        self.failure.is_none()
    }
}

/// Fans a notification out to every routed target.
///
/// Each target runs its own pipeline (format, sender lookup, resilience
/// gate) concurrently with its siblings. Any terminal failure, including a
/// panic, is dead-lettered and reported for that target alone.
pub struct Dispatcher {
    resolver: RoutingResolver,
    formatters: Arc<FormatterRegistry>,
    senders: Arc<SenderRegistry>,
    resilience: Arc<ResilienceRegistry>,
    dead_letters: Arc<dyn DeadLetterStore>,
    metrics: Arc<dyn MetricsSink>,
}

impl Dispatcher {
    pub fn new(
        resolver: RoutingResolver,
        formatters: Arc<FormatterRegistry>,
        senders: Arc<SenderRegistry>,
        resilience: Arc<ResilienceRegistry>,
        dead_letters: Arc<dyn DeadLetterStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            resolver,
            formatters,
            senders,
            resilience,
            dead_letters,
            metrics,
        }
    }

    /// Deliver `notification` to every routed target and report per target.
    ///
    /// An unroutable notification yields an empty report list.
    #[instrument(
        skip_all,
        fields(notification.type = %notification.type_id(), category = %notification.category())
    )]
    pub async fn dispatch(&self, notification: &Notification) -> Vec<DeliveryReport> {
        let targets = self
            .resolver
            .resolve(notification.type_id(), notification.category());
        if targets.is_empty() {
            return Vec::new();
        }
        debug!(targets = targets.len(), "dispatching");

        join_all(
            targets
                .into_iter()
                .map(|target| self.deliver_isolated(notification, target)),
        )
        .await
    }

    async fn deliver_isolated(
        &self,
        notification: &Notification,
        target: RoutingTarget,
    ) -> DeliveryReport {
        match AssertUnwindSafe(self.deliver(notification, &target))
            .catch_unwind()
            .await
        {
            Ok(report) => report,
            Err(panic) => {
                let failure = DeliveryFailure::Panicked(panic_message(panic.as_ref()));
                self.fail(notification, target, None, failure, 0).await
            }
        }
    }

    async fn deliver(&self, notification: &Notification, target: &RoutingTarget) -> DeliveryReport {
        let payload = match render_payload(&self.formatters, notification, &target.platform) {
            Ok(payload) => payload,
            Err(failure) => return self.fail(notification, target.clone(), None, failure, 0).await,
        };

        let Some(sender) = self.senders.get(&target.platform) else {
            return self
                .fail(
                    notification,
                    target.clone(),
                    Some(payload),
                    DeliveryFailure::NoSender,
                    0,
                )
                .await;
        };

        let gate = self.resilience.gate(&target.resource_key());
        let outcome = gate.execute(sender.as_ref(), &target.url, &payload).await;
        match outcome.failure() {
            None => DeliveryReport {
                target: target.clone(),
                attempts: outcome.attempts(),
                failure: None,
                dead_letter_id: None,
            },
            Some(failure) => {
                self.fail(
                    notification,
                    target.clone(),
                    Some(payload),
                    failure,
                    outcome.attempts(),
                )
                .await
            }
        }
    }

    async fn fail(
        &self,
        notification: &Notification,
        target: RoutingTarget,
        payload: Option<serde_json::Value>,
        failure: DeliveryFailure,
        attempts: u32,
    ) -> DeliveryReport {
        let resource = target.resource_key();
        self.metrics.record(&PipelineEvent::Failure {
            resource: &resource,
            reason: &failure,
        });
        warn!(
            resource = %resource,
            reason = %failure,
            kind = failure.kind(),
            attempts,
            "delivery failed, dead-lettering"
        );

        let entry = DeadLetterEntry::new(
            notification,
            target.clone(),
            payload,
            failure.to_string(),
            attempts,
        );
        let dead_letter_id = match self.dead_letters.store(entry).await {
            Ok(id) => {
                self.metrics.record(&PipelineEvent::DeadLetterCreated {
                    resource: &resource,
                });
                Some(id)
            }
            Err(e) => {
                self.metrics.record(&PipelineEvent::DeadLetterHandlerFailed {
                    resource: &resource,
                });
                error!(resource = %resource, error = %e, "failed to store dead letter");
                None
            }
        };

        DeliveryReport {
            target,
            attempts,
            failure: Some(failure),
            dead_letter_id,
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("senders", &self.senders.list())
            .finish_non_exhaustive()
    }
}

/// Format `notification` for `platform`, classifying every way it can fail.
pub(crate) fn render_payload(
    formatters: &FormatterRegistry,
    notification: &Notification,
    platform: &str,
) -> Result<serde_json::Value, DeliveryFailure> {
    let formatter = formatters
        .resolve(platform, notification.type_id())
        .ok_or(DeliveryFailure::NoFormatter)?;
    let payload = formatter.format(notification).map_err(|e| {
        if e.is_context_mismatch() {
            DeliveryFailure::ContextMismatch(e.to_string())
        } else {
            DeliveryFailure::FormatFailed(e.to_string())
        }
    })?;
    if is_empty_payload(&payload) {
        return Err(DeliveryFailure::EmptyPayload);
    }
    Ok(payload)
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_owned()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
