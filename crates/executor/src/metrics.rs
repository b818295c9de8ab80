use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use herald_core::DeliveryFailure;

/// Something observable that happened in the delivery pipeline.
///
/// Events carry the endpoint resource key (`platform:endpointKey`) where one
/// applies.
#[derive(Debug, Clone, Copy)]
pub enum PipelineEvent<'a> {
    /// A send attempt is about to be made.
    Attempt { resource: &'a str },
    /// A target was delivered.
    Success { resource: &'a str },
    /// A target ended without success.
    Failure {
        resource: &'a str,
        reason: &'a DeliveryFailure,
    },
    /// The circuit breaker was open; no attempt was made.
    Skipped { resource: &'a str },
    /// The local rate limiter had no permit.
    RateLimited { resource: &'a str },
    /// The bulkhead was saturated.
    BulkheadFull { resource: &'a str },
    /// A failed attempt will be retried.
    Retry { resource: &'a str, attempt: u32 },
    /// A dead-letter entry was written.
    DeadLetterCreated { resource: &'a str },
    /// Writing a dead-letter entry failed.
    DeadLetterHandlerFailed { resource: &'a str },
    /// The provider signalled rate limiting and the limiter was throttled.
    ExternalRateLimit {
        resource: &'a str,
        retry_after: Option<Duration>,
    },
    /// The execution pool was saturated and the submitter ran the task.
    CallerRunsFallback,
}

/// Fire-and-forget consumer of pipeline events. Never influences control
/// flow.
pub trait MetricsSink: Send + Sync {
    fn record(&self, event: &PipelineEvent<'_>);
}

/// Sink that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn record(&self, _event: &PipelineEvent<'_>) {}
}

/// Atomic counters tracking pipeline outcomes.
///
/// All counters use relaxed ordering. For a consistent point-in-time view,
/// call [`snapshot`](Self::snapshot).
#[derive(Debug, Default)]
pub struct PipelineMetrics {
    pub attempts: AtomicU64,
    pub successes: AtomicU64,
    pub failures: AtomicU64,
    pub skipped: AtomicU64,
    pub rate_limited: AtomicU64,
    pub bulkhead_full: AtomicU64,
    pub retries: AtomicU64,
    pub dead_letters_created: AtomicU64,
    pub dead_letter_handler_failures: AtomicU64,
    pub external_rate_limits: AtomicU64,
    pub caller_runs_fallbacks: AtomicU64,
    /// Failures broken down by [`DeliveryFailure::kind`].
    failure_reasons: DashMap<&'static str, u64>,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            attempts: self.attempts.load(Ordering::Relaxed),
            successes: self.successes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            bulkhead_full: self.bulkhead_full.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            dead_letters_created: self.dead_letters_created.load(Ordering::Relaxed),
            dead_letter_handler_failures: self
                .dead_letter_handler_failures
                .load(Ordering::Relaxed),
            external_rate_limits: self.external_rate_limits.load(Ordering::Relaxed),
            caller_runs_fallbacks: self.caller_runs_fallbacks.load(Ordering::Relaxed),
            failure_reasons: self
                .failure_reasons
                .iter()
                .map(|entry| (*entry.key(), *entry.value()))
                .collect(),
        }
    }
}

impl MetricsSink for PipelineMetrics {
    fn record(&self, event: &PipelineEvent<'_>) {
        let counter = match event {
            PipelineEvent::Attempt { .. } => &self.attempts,
            PipelineEvent::Success { .. } => &self.successes,
            PipelineEvent::Failure { reason, .. } => {
                *self.failure_reasons.entry(reason.kind()).or_insert(0) += 1;
                &self.failures
            }
            PipelineEvent::Skipped { .. } => &self.skipped,
            PipelineEvent::RateLimited { .. } => &self.rate_limited,
            PipelineEvent::BulkheadFull { .. } => &self.bulkhead_full,
            PipelineEvent::Retry { .. } => &self.retries,
            PipelineEvent::DeadLetterCreated { .. } => &self.dead_letters_created,
            PipelineEvent::DeadLetterHandlerFailed { .. } => &self.dead_letter_handler_failures,
            PipelineEvent::ExternalRateLimit { .. } => &self.external_rate_limits,
            PipelineEvent::CallerRunsFallback => &self.caller_runs_fallbacks,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A plain data snapshot of [`PipelineMetrics`] at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct MetricsSnapshot {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub skipped: u64,
    pub rate_limited: u64,
    pub bulkhead_full: u64,
    pub retries: u64,
    pub dead_letters_created: u64,
    pub dead_letter_handler_failures: u64,
    pub external_rate_limits: u64,
    pub caller_runs_fallbacks: u64,
    pub failure_reasons: BTreeMap<&'static str, u64>,
}
