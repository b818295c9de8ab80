use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use herald_core::{DeliveryFailure, Notification};
use herald_executor::{
    DeadLetterEntry, DeadLetterError, DeadLetterStatus, DeadLetterStore, MetricsSink,
    PipelineEvent, ResilienceRegistry,
};
use herald_provider::{FormatterRegistry, SenderRegistry};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::dispatcher::{panic_message, render_payload};

/// Attempts at moving a claimed entry to its final status.
const SETTLE_ATTEMPTS: u32 = 3;
const SETTLE_BACKOFF: Duration = Duration::from_millis(100);

/// A reprocessing request that could not be carried out.
#[derive(Debug, Error)]
pub enum ReprocessError {
    /// The entry is missing, not claimable, or the store failed.
    #[error(transparent)]
    DeadLetter(#[from] DeadLetterError),
}

impl ReprocessError {
    /// Whether the entry was in a status that forbids reprocessing (for
    /// example another caller already claimed it).
    pub fn is_rejected(&self) -> bool {
        matches!(
            self,
            Self::DeadLetter(DeadLetterError::InvalidTransition { .. })
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::DeadLetter(DeadLetterError::NotFound(_)))
    }
}

/// Terminal result of replaying one dead-letter entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReprocessOutcome {
    /// The payload was delivered; the entry is now `RESOLVED`.
    Resolved { attempts: u32 },
    /// The replay failed; the entry is now `ABANDONED`.
    Abandoned { failure: DeliveryFailure },
}

/// Totals from [`DeadLetterReprocessor::reprocess_pending`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReprocessSummary {
    pub resolved: usize,
    pub abandoned: usize,
    /// Entries claimed by someone else between listing and claiming.
    pub rejected: usize,
}

/// Replays dead-letter entries through the same resilience gates used for
/// live delivery.
///
/// An entry is claimed with an atomic `PENDING -> PROCESSING` transition, so
/// two concurrent requests for the same id never both replay it.
pub struct DeadLetterReprocessor {
    formatters: Arc<FormatterRegistry>,
    senders: Arc<SenderRegistry>,
    resilience: Arc<ResilienceRegistry>,
    store: Arc<dyn DeadLetterStore>,
    metrics: Arc<dyn MetricsSink>,
    allow_abandoned: bool,
}

impl DeadLetterReprocessor {
    pub fn new(
        formatters: Arc<FormatterRegistry>,
        senders: Arc<SenderRegistry>,
        resilience: Arc<ResilienceRegistry>,
        store: Arc<dyn DeadLetterStore>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        Self {
            formatters,
            senders,
            resilience,
            store,
            metrics,
            allow_abandoned: false,
        }
    }

    /// Also accept `ABANDONED` entries for reprocessing.
    #[must_use]
    pub fn allow_abandoned(mut self, allow: bool) -> Self {
        self.allow_abandoned = allow;
        self
    }

    fn claimable(&self) -> &'static [DeadLetterStatus] {
        if self.allow_abandoned {
            &[DeadLetterStatus::Pending, DeadLetterStatus::Abandoned]
        } else {
            &[DeadLetterStatus::Pending]
        }
    }

    /// Claim and replay one entry.
    ///
    /// Errors mean nothing was replayed: the id is unknown, the entry is not
    /// in a claimable status, or the store failed. A replay that fails is
    /// not an error; it yields [`ReprocessOutcome::Abandoned`].
    #[instrument(skip(self), fields(resource))]
    pub async fn reprocess_by_id(&self, id: Uuid) -> Result<ReprocessOutcome, ReprocessError> {
        let entry = self
            .store
            .transition(id, self.claimable(), DeadLetterStatus::Processing)
            .await?;
        let resource = entry.target.resource_key();
        tracing::Span::current().record("resource", resource.as_str());
        info!(reason = %entry.reason, "reprocessing dead letter");

        let replayed = AssertUnwindSafe(self.replay(&entry))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(DeliveryFailure::Panicked(panic_message(panic.as_ref()))));

        match replayed {
            Ok(attempts) => {
                self.settle(id, DeadLetterStatus::Resolved).await?;
                info!(attempts, "dead letter resolved");
                Ok(ReprocessOutcome::Resolved { attempts })
            }
            Err(failure) => {
                self.metrics.record(&PipelineEvent::Failure {
                    resource: &resource,
                    reason: &failure,
                });
                self.settle(id, DeadLetterStatus::Abandoned).await?;
                warn!(reason = %failure, "dead letter abandoned");
                Ok(ReprocessOutcome::Abandoned { failure })
            }
        }
    }

    /// Reprocess every `PENDING` entry, oldest first.
    pub async fn reprocess_pending(&self) -> Result<ReprocessSummary, ReprocessError> {
        let pending = self.store.list_by_status(DeadLetterStatus::Pending).await?;
        let mut summary = ReprocessSummary::default();
        for entry in pending {
            match self.reprocess_by_id(entry.id).await {
                Ok(ReprocessOutcome::Resolved { .. }) => summary.resolved += 1,
                Ok(ReprocessOutcome::Abandoned { .. }) => summary.abandoned += 1,
                Err(e) if e.is_rejected() || e.is_not_found() => summary.rejected += 1,
                Err(e) => return Err(e),
            }
        }
        info!(
            resolved = summary.resolved,
            abandoned = summary.abandoned,
            rejected = summary.rejected,
            "pending dead letters reprocessed"
        );
        Ok(summary)
    }

    /// Move a claimed entry out of `PROCESSING`, retrying backend failures.
    ///
    /// An entry left in `PROCESSING` is never claimed again, so the final
    /// error is returned to the caller rather than swallowed.
    async fn settle(&self, id: Uuid, to: DeadLetterStatus) -> Result<(), ReprocessError> {
        let mut attempt = 1;
        loop {
            match self
                .store
                .transition(id, &[DeadLetterStatus::Processing], to)
                .await
            {
                Ok(_) => return Ok(()),
                Err(e @ DeadLetterError::Backend(_)) if attempt < SETTLE_ATTEMPTS => {
                    warn!(attempt, error = %e, status = %to, "dead letter status update failed, retrying");
                    tokio::time::sleep(SETTLE_BACKOFF * attempt).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(error = %e, status = %to, "dead letter left in PROCESSING");
                    return Err(e.into());
                }
            }
        }
    }

    /// One fresh gated delivery of the entry; returns the attempts used.
    async fn replay(&self, entry: &DeadLetterEntry) -> Result<u32, DeliveryFailure> {
        let target = &entry.target;
        let payload = match &entry.payload {
            Some(payload) => payload.clone(),
            None => {
                let notification = restore_notification(entry)?;
                render_payload(&self.formatters, &notification, &target.platform)?
            }
        };

        let sender = self
            .senders
            .get(&target.platform)
            .ok_or(DeliveryFailure::NoSender)?;
        let gate = self.resilience.gate(&target.resource_key());
        let outcome = gate.execute(sender.as_ref(), &target.url, &payload).await;
        match outcome.failure() {
            None => Ok(outcome.attempts()),
            Some(failure) => Err(failure),
        }
    }
}

impl std::fmt::Debug for DeadLetterReprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeadLetterReprocessor")
            .field("allow_abandoned", &self.allow_abandoned)
            .finish_non_exhaustive()
    }
}

/// Rebuild the notification an entry was created from.
fn restore_notification(entry: &DeadLetterEntry) -> Result<Notification, DeliveryFailure> {
    let context: serde_json::Value = serde_json::from_str(&entry.context)
        .map_err(|e| DeliveryFailure::FormatFailed(format!("unreadable context snapshot: {e}")))?;
    Notification::builder(&entry.type_id, &entry.category)
        .occurred_at(entry.created_at)
        .context(context)
        .build()
        .map_err(|e| DeliveryFailure::FormatFailed(e.to_string()))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use async_trait::async_trait;
    use herald_core::{RoutingTarget, SendResult};
    use herald_executor::{
        AdaptiveRateLimitFeedback, GateConfig, InMemoryDeadLetterStore, NoopMetrics,
    };
    use herald_provider::{DynFormatter, FormatError, Sender};
    use serde_json::json;

    use super::*;

    /// Fails until `healthy` is flipped.
    struct FlakySender {
        healthy: Arc<AtomicBool>,
    }

    impl Sender for FlakySender {
        fn platform(&self) -> &str {
            "slack"
        }

        async fn send(&self, _url: &str, _payload: &serde_json::Value) -> SendResult {
            if self.healthy.load(Ordering::SeqCst) {
                SendResult::success(200)
            } else {
                SendResult::failure(400, "HTTP 400: bad payload", false)
            }
        }
    }

    struct EchoFormatter;

    impl DynFormatter for EchoFormatter {
        fn context_type(&self) -> Option<&'static str> {
            None
        }

        fn format(&self, notification: &Notification) -> Result<serde_json::Value, FormatError> {
            Ok(json!({ "text": notification.context()["pipeline"] }))
        }
    }

    struct Fixture {
        reprocessor: DeadLetterReprocessor,
        store: Arc<InMemoryDeadLetterStore>,
        formatters: Arc<FormatterRegistry>,
        healthy: Arc<AtomicBool>,
    }

    fn fixture() -> Fixture {
        let healthy = Arc::new(AtomicBool::new(true));
        let mut senders = SenderRegistry::new();
        senders
            .register(Arc::new(FlakySender {
                healthy: Arc::clone(&healthy),
            }))
            .unwrap();
        let formatters = Arc::new(FormatterRegistry::new());
        let store = Arc::new(InMemoryDeadLetterStore::new());
        let resilience = Arc::new(ResilienceRegistry::new(
            GateConfig::default(),
            Arc::new(AdaptiveRateLimitFeedback::default()),
            Arc::new(NoopMetrics),
        ));
        let reprocessor = DeadLetterReprocessor::new(
            Arc::clone(&formatters),
            Arc::new(senders),
            resilience,
            Arc::clone(&store) as Arc<dyn DeadLetterStore>,
            Arc::new(NoopMetrics),
        );
        Fixture {
            reprocessor,
            store,
            formatters,
            healthy,
        }
    }

    async fn seed(store: &InMemoryDeadLetterStore, payload: Option<serde_json::Value>) -> Uuid {
        let notification = Notification::builder("build.failed", "ci")
            .context(json!({"pipeline": "main"}))
            .build()
            .unwrap();
        let entry = DeadLetterEntry::new(
            &notification,
            RoutingTarget::new("slack", "ci", "https://hooks.slack/ci"),
            payload,
            "send failed (503): HTTP 503: unavailable",
            3,
        );
        store.store(entry).await.unwrap()
    }

    async fn status(store: &InMemoryDeadLetterStore, id: Uuid) -> DeadLetterStatus {
        store.get(id).await.unwrap().unwrap().status
    }

    #[tokio::test]
    async fn replays_stored_payload_and_resolves() {
        let fx = fixture();
        let id = seed(&fx.store, Some(json!({"text": "main failed"}))).await;

        let outcome = fx.reprocessor.reprocess_by_id(id).await.unwrap();
        assert_eq!(outcome, ReprocessOutcome::Resolved { attempts: 1 });
        assert_eq!(status(&fx.store, id).await, DeadLetterStatus::Resolved);
    }

    #[tokio::test]
    async fn failed_replay_abandons() {
        let fx = fixture();
        fx.healthy.store(false, Ordering::SeqCst);
        let id = seed(&fx.store, Some(json!({"text": "main failed"}))).await;

        let outcome = fx.reprocessor.reprocess_by_id(id).await.unwrap();
        assert!(matches!(
            outcome,
            ReprocessOutcome::Abandoned {
                failure: DeliveryFailure::SendFailed {
                    status_code: 400,
                    ..
                }
            }
        ));
        assert_eq!(status(&fx.store, id).await, DeadLetterStatus::Abandoned);
    }

    #[tokio::test]
    async fn abandoned_entries_are_rejected_by_default() {
        let fx = fixture();
        fx.healthy.store(false, Ordering::SeqCst);
        let id = seed(&fx.store, Some(json!({"text": "x"}))).await;
        fx.reprocessor.reprocess_by_id(id).await.unwrap();

        fx.healthy.store(true, Ordering::SeqCst);
        let err = fx.reprocessor.reprocess_by_id(id).await.unwrap_err();
        assert!(err.is_rejected());
        assert_eq!(status(&fx.store, id).await, DeadLetterStatus::Abandoned);
    }

    #[tokio::test]
    async fn abandoned_entries_can_be_allowed() {
        let Fixture {
            reprocessor,
            store,
            healthy,
            ..
        } = fixture();
        let reprocessor = reprocessor.allow_abandoned(true);
        healthy.store(false, Ordering::SeqCst);
        let id = seed(&store, Some(json!({"text": "x"}))).await;
        reprocessor.reprocess_by_id(id).await.unwrap();

        healthy.store(true, Ordering::SeqCst);
        let outcome = reprocessor.reprocess_by_id(id).await.unwrap();
        assert!(matches!(outcome, ReprocessOutcome::Resolved { .. }));
        assert_eq!(status(&store, id).await, DeadLetterStatus::Resolved);
    }

    #[tokio::test]
    async fn resolved_entries_are_rejected() {
        let fx = fixture();
        let id = seed(&fx.store, Some(json!({"text": "x"}))).await;
        fx.reprocessor.reprocess_by_id(id).await.unwrap();
        let err = fx.reprocessor.reprocess_by_id(id).await.unwrap_err();
        assert!(err.is_rejected());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let fx = fixture();
        let err = fx
            .reprocessor
            .reprocess_by_id(Uuid::now_v7())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn missing_payload_is_rerendered_with_current_formatter() {
        let fx = fixture();
        let id = seed(&fx.store, None).await;

        // Still no formatter: the replay fails terminally.
        let outcome = fx.reprocessor.reprocess_by_id(id).await.unwrap();
        assert_eq!(
            outcome,
            ReprocessOutcome::Abandoned {
                failure: DeliveryFailure::NoFormatter
            }
        );

        let id = seed(&fx.store, None).await;
        fx.formatters
            .register_fallback("slack", Arc::new(EchoFormatter))
            .unwrap();
        let outcome = fx.reprocessor.reprocess_by_id(id).await.unwrap();
        assert_eq!(outcome, ReprocessOutcome::Resolved { attempts: 1 });
    }

    #[tokio::test]
    async fn reprocess_pending_summarizes() {
        let fx = fixture();
        seed(&fx.store, Some(json!({"text": "a"}))).await;
        seed(&fx.store, Some(json!({"text": "b"}))).await;
        seed(&fx.store, None).await;

        let summary = fx.reprocessor.reprocess_pending().await.unwrap();
        assert_eq!(
            summary,
            ReprocessSummary {
                resolved: 2,
                abandoned: 1,
                rejected: 0,
            }
        );
        assert_eq!(
            fx.store
                .count_by_status(DeadLetterStatus::Pending)
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn concurrent_reprocess_has_one_winner() {
        let fx = fixture();
        let id = seed(&fx.store, Some(json!({"text": "x"}))).await;
        let reprocessor = Arc::new(fx.reprocessor);

        let a = {
            let r = Arc::clone(&reprocessor);
            tokio::spawn(async move { r.reprocess_by_id(id).await })
        };
        let b = {
            let r = Arc::clone(&reprocessor);
            tokio::spawn(async move { r.reprocess_by_id(id).await })
        };
        let results = [a.await.unwrap(), b.await.unwrap()];
        let resolved = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(resolved, 1);
        assert!(results.iter().any(|r| r.as_ref().is_err_and(ReprocessError::is_rejected)));
        assert_eq!(status(&fx.store, id).await, DeadLetterStatus::Resolved);
    }

    /// Delegates to the in-memory store but fails the first `failures`
    /// transitions out of `PROCESSING`.
    struct SettleFailingStore {
        inner: InMemoryDeadLetterStore,
        failures: AtomicU32,
    }

    #[async_trait]
    impl DeadLetterStore for SettleFailingStore {
        async fn store(&self, entry: DeadLetterEntry) -> Result<Uuid, DeadLetterError> {
            self.inner.store(entry).await
        }

        async fn get(&self, id: Uuid) -> Result<Option<DeadLetterEntry>, DeadLetterError> {
            self.inner.get(id).await
        }

        async fn transition(
            &self,
            id: Uuid,
            from: &[DeadLetterStatus],
            to: DeadLetterStatus,
        ) -> Result<DeadLetterEntry, DeadLetterError> {
            let settling = to != DeadLetterStatus::Processing;
            if settling
                && self
                    .failures
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(DeadLetterError::Backend("connection reset".into()));
            }
            self.inner.transition(id, from, to).await
        }

        async fn list_by_status(
            &self,
            status: DeadLetterStatus,
        ) -> Result<Vec<DeadLetterEntry>, DeadLetterError> {
            self.inner.list_by_status(status).await
        }

        async fn count_by_status(&self, status: DeadLetterStatus) -> Result<usize, DeadLetterError> {
            self.inner.count_by_status(status).await
        }

        async fn len(&self) -> Result<usize, DeadLetterError> {
            self.inner.len().await
        }
    }

    fn reprocessor_over(store: &Arc<SettleFailingStore>) -> DeadLetterReprocessor {
        let mut senders = SenderRegistry::new();
        senders
            .register(Arc::new(FlakySender {
                healthy: Arc::new(AtomicBool::new(true)),
            }))
            .unwrap();
        DeadLetterReprocessor::new(
            Arc::new(FormatterRegistry::new()),
            Arc::new(senders),
            Arc::new(ResilienceRegistry::new(
                GateConfig::default(),
                Arc::new(AdaptiveRateLimitFeedback::default()),
                Arc::new(NoopMetrics),
            )),
            Arc::clone(store) as Arc<dyn DeadLetterStore>,
            Arc::new(NoopMetrics),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn transient_store_failure_on_settle_is_retried() {
        let store = Arc::new(SettleFailingStore {
            inner: InMemoryDeadLetterStore::new(),
            failures: AtomicU32::new(2),
        });
        let id = seed(&store.inner, Some(json!({"text": "x"}))).await;

        let outcome = reprocessor_over(&store).reprocess_by_id(id).await.unwrap();
        assert_eq!(outcome, ReprocessOutcome::Resolved { attempts: 1 });
        assert_eq!(status(&store.inner, id).await, DeadLetterStatus::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_store_failure_on_settle_is_returned() {
        let store = Arc::new(SettleFailingStore {
            inner: InMemoryDeadLetterStore::new(),
            failures: AtomicU32::new(u32::MAX),
        });
        let id = seed(&store.inner, Some(json!({"text": "x"}))).await;

        let err = reprocessor_over(&store)
            .reprocess_by_id(id)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReprocessError::DeadLetter(DeadLetterError::Backend(_))
        ));
        assert!(!err.is_rejected());
    }

    #[test]
    fn restores_notification_from_snapshot() {
        let notification = Notification::builder("build.failed", "ci")
            .context(json!({"pipeline": "main", "run": 7}))
            .build()
            .unwrap();
        let entry = DeadLetterEntry::new(
            &notification,
            RoutingTarget::new("slack", "ci", "https://x"),
            None,
            "no formatter",
            0,
        );
        let restored = restore_notification(&entry).unwrap();
        assert_eq!(restored.type_id(), "build.failed");
        assert_eq!(restored.category(), "ci");
        assert_eq!(restored.context(), notification.context());
    }
}
