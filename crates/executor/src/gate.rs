use std::sync::Arc;

use herald_core::{DeliveryFailure, SendResult};
use herald_provider::DynSender;
use tracing::{debug, instrument, warn};

use crate::bulkhead::Bulkhead;
use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::GateConfig;
use crate::feedback::AdaptiveRateLimitFeedback;
use crate::metrics::{MetricsSink, PipelineEvent};
use crate::rate_limiter::EndpointRateLimiter;

/// Why the gate refused a call before any attempt was made.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    BulkheadFull,
    RateLimited,
    CircuitOpen,
}

impl From<Rejection> for DeliveryFailure {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::BulkheadFull => Self::BulkheadFull,
            Rejection::RateLimited => Self::RateLimited,
            Rejection::CircuitOpen => Self::CircuitOpen,
        }
    }
}

/// Result of one gated call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    /// The payload was accepted.
    Delivered { attempts: u32, result: SendResult },
    /// Every permitted attempt failed, or a failure was not retryable.
    Failed { attempts: u32, result: SendResult },
    /// Admission was refused; the sender was never called.
    Rejected(Rejection),
}

impl GateOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }

    /// Send attempts made; zero for rejections.
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Delivered { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
            Self::Rejected(_) => 0,
        }
    }

    /// The terminal failure, if the call did not deliver.
    pub fn failure(&self) -> Option<DeliveryFailure> {
        match self {
            Self::Delivered { .. } => None,
            Self::Failed { result, .. } => Some(DeliveryFailure::from(result)),
            Self::Rejected(rejection) => Some((*rejection).into()),
        }
    }
}

/// Per-endpoint resilience pipeline.
///
/// Admission runs in a fixed order: bulkhead, rate limiter, circuit breaker.
/// Only then does the retry loop call the sender, each attempt bounded by
/// the send timeout. The circuit breaker records one outcome per gated call,
/// not one per attempt.
pub struct ResilienceGate {
    resource: String,
    config: GateConfig,
    bulkhead: Bulkhead,
    limiter: EndpointRateLimiter,
    breaker: CircuitBreaker,
    feedback: Arc<AdaptiveRateLimitFeedback>,
    metrics: Arc<dyn MetricsSink>,
}

impl ResilienceGate {
    pub fn new(
        resource: impl Into<String>,
        config: GateConfig,
        feedback: Arc<AdaptiveRateLimitFeedback>,
        metrics: Arc<dyn MetricsSink>,
    ) -> Self {
        let resource = resource.into();
        Self {
            bulkhead: Bulkhead::new(&config.bulkhead),
            limiter: EndpointRateLimiter::new(resource.clone(), config.rate_limiter.clone()),
            breaker: CircuitBreaker::new(resource.clone(), config.circuit_breaker.clone()),
            resource,
            config,
            feedback,
            metrics,
        }
    }

    /// Deliver `payload` to `url` through `sender`.
    #[instrument(skip_all, fields(resource = %self.resource, attempt))]
    pub async fn execute(
        &self,
        sender: &dyn DynSender,
        url: &str,
        payload: &serde_json::Value,
    ) -> GateOutcome {
        let resource = self.resource.as_str();

        let Some(_slot) = self.bulkhead.acquire().await else {
            warn!(resource, "bulkhead full");
            self.metrics.record(&PipelineEvent::BulkheadFull { resource });
            return GateOutcome::Rejected(Rejection::BulkheadFull);
        };

        if !self.limiter.acquire().await {
            warn!(resource, "rate limited locally");
            self.metrics.record(&PipelineEvent::RateLimited { resource });
            return GateOutcome::Rejected(Rejection::RateLimited);
        }

        let Some(permit) = self.breaker.try_acquire() else {
            debug!(resource, "circuit open, skipping send");
            self.metrics.record(&PipelineEvent::Skipped { resource });
            return GateOutcome::Rejected(Rejection::CircuitOpen);
        };

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::Span::current().record("attempt", attempt);
            self.metrics.record(&PipelineEvent::Attempt { resource });

            let result = self.send_once(sender, url, payload).await;

            if result.success {
                debug!(resource, attempt, "delivered");
                permit.succeeded();
                self.metrics.record(&PipelineEvent::Success { resource });
                return GateOutcome::Delivered {
                    attempts: attempt,
                    result,
                };
            }

            if result.is_rate_limited() {
                self.feedback
                    .on_rate_limited(resource, &self.limiter, result.retry_after);
            }

            if result.retryable && attempt < self.config.max_attempts {
                let delay = self.config.retry.delay_for(attempt);
                warn!(
                    resource,
                    attempt,
                    status = result.status_code,
                    error = result.error_message(),
                    delay_ms = delay.as_millis(),
                    "retryable send failure, will retry"
                );
                self.metrics.record(&PipelineEvent::Retry { resource, attempt });
                tokio::time::sleep(delay).await;
                continue;
            }

            warn!(
                resource,
                attempt,
                status = result.status_code,
                error = result.error_message(),
                retryable = result.retryable,
                "send failed"
            );
            permit.failed();
            return GateOutcome::Failed {
                attempts: attempt,
                result,
            };
        }
    }

    async fn send_once(
        &self,
        sender: &dyn DynSender,
        url: &str,
        payload: &serde_json::Value,
    ) -> SendResult {
        match tokio::time::timeout(self.config.send_timeout, sender.send(url, payload)).await {
            Ok(result) => result,
            Err(_elapsed) => SendResult::network_error(format!(
                "send timed out after {}ms",
                self.config.send_timeout.as_millis()
            )),
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn rate_limiter(&self) -> &EndpointRateLimiter {
        &self.limiter
    }

    pub fn bulkhead(&self) -> &Bulkhead {
        &self.bulkhead
    }
}

impl std::fmt::Debug for ResilienceGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilienceGate")
            .field("resource", &self.resource)
            .field("circuit", &self.breaker.state())
            .field("bulkhead_available", &self.bulkhead.available())
            .finish_non_exhaustive()
    }
}
