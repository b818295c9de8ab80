use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use crate::metrics::{MetricsSink, PipelineEvent};
use crate::rate_limiter::EndpointRateLimiter;

/// Cooldown used when the provider gives no usable `Retry-After`.
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(30);

/// Reacts to provider-signalled rate limiting by throttling the endpoint's
/// local limiter to one call per cooldown.
pub struct AdaptiveRateLimitFeedback {
    enabled: bool,
    default_cooldown: Duration,
    metrics: Arc<dyn MetricsSink>,
}

impl AdaptiveRateLimitFeedback {
    pub fn new(enabled: bool, default_cooldown: Duration, metrics: Arc<dyn MetricsSink>) -> Self {
        Self {
            enabled,
            default_cooldown,
            metrics,
        }
    }

    /// The cooldown to apply for a given `Retry-After` hint.
    pub fn cooldown_for(&self, retry_after: Option<Duration>) -> Duration {
        retry_after
            .filter(|d| !d.is_zero())
            .unwrap_or(self.default_cooldown)
    }

    /// Throttle `limiter` after the provider rate-limited a call to
    /// `resource`. Returns the applied cooldown, or `None` when disabled.
    pub fn on_rate_limited(
        &self,
        resource: &str,
        limiter: &EndpointRateLimiter,
        retry_after: Option<Duration>,
    ) -> Option<Duration> {
        if !self.enabled {
            return None;
        }
        let cooldown = self.cooldown_for(retry_after);
        warn!(
            resource,
            cooldown_ms = cooldown.as_millis(),
            "external rate limit detected"
        );
        limiter.throttle_to(cooldown);
        self.metrics.record(&PipelineEvent::ExternalRateLimit {
            resource,
            retry_after,
        });
        Some(cooldown)
    }
}

impl Default for AdaptiveRateLimitFeedback {
    fn default() -> Self {
        Self::new(true, DEFAULT_COOLDOWN, Arc::new(crate::metrics::NoopMetrics))
    }
}

impl std::fmt::Debug for AdaptiveRateLimitFeedback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdaptiveRateLimitFeedback")
            .field("enabled", &self.enabled)
            .field("default_cooldown", &self.default_cooldown)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::PipelineMetrics;
    use crate::rate_limiter::RateLimiterConfig;

    #[test]
    fn cooldown_prefers_positive_retry_after() {
        let feedback = AdaptiveRateLimitFeedback::default();
        assert_eq!(
            feedback.cooldown_for(Some(Duration::from_secs(7))),
            Duration::from_secs(7)
        );
        assert_eq!(feedback.cooldown_for(Some(Duration::ZERO)), DEFAULT_COOLDOWN);
        assert_eq!(feedback.cooldown_for(None), DEFAULT_COOLDOWN);
    }

    #[tokio::test]
    async fn throttles_limiter_and_records_metric() {
        let metrics = Arc::new(PipelineMetrics::new());
        let feedback = AdaptiveRateLimitFeedback::new(
            true,
            DEFAULT_COOLDOWN,
            Arc::clone(&metrics) as Arc<dyn MetricsSink>,
        );
        let limiter = EndpointRateLimiter::new("slack:alerts", RateLimiterConfig::default());

        let applied = feedback.on_rate_limited("slack:alerts", &limiter, Some(Duration::from_secs(12)));
        assert_eq!(applied, Some(Duration::from_secs(12)));
        assert_eq!(limiter.cooldown(), Some(Duration::from_secs(12)));
        assert!(!limiter.acquire().await);
        assert_eq!(metrics.snapshot().external_rate_limits, 1);
    }

    #[test]
    fn disabled_feedback_leaves_limiter_alone() {
        let feedback =
            AdaptiveRateLimitFeedback::new(false, DEFAULT_COOLDOWN, Arc::new(crate::metrics::NoopMetrics));
        let limiter = EndpointRateLimiter::new("slack:alerts", RateLimiterConfig::default());
        assert!(feedback.on_rate_limited("slack:alerts", &limiter, None).is_none());
        assert!(limiter.cooldown().is_none());
    }
}
