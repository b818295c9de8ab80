use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use parking_lot::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// How often a waiting caller re-checks for a permit.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Configuration for a per-endpoint rate limiter.
#[derive(Debug, Clone)]
pub struct RateLimiterConfig {
    /// Permits issued per refresh period.
    pub limit_for_period: u32,
    /// Length of one refresh period.
    pub refresh_period: Duration,
    /// How long a caller may wait for a permit. Zero fails immediately.
    pub timeout: Duration,
}

impl RateLimiterConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.limit_for_period < 1 {
            return Err("limit_for_period must be >= 1".into());
        }
        if self.refresh_period.is_zero() {
            return Err("refresh_period must be > 0".into());
        }
        Ok(())
    }

    fn quota(&self) -> Quota {
        let burst = NonZeroU32::new(self.limit_for_period).unwrap_or(NonZeroU32::MIN);
        Quota::with_period(self.refresh_period / burst.get())
            .map_or_else(|| Quota::per_second(burst), |q| q.allow_burst(burst))
    }
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            limit_for_period: 10,
            refresh_period: Duration::from_secs(1),
            timeout: Duration::ZERO,
        }
    }
}

struct LimiterSlot {
    limiter: Arc<DirectLimiter>,
    /// Set while an adaptive throttle override is in effect.
    cooldown: Option<Duration>,
    /// When the override lifts, on the same wall clock governor uses.
    restore_at: Option<std::time::Instant>,
}

/// Token-bucket rate limiter for one endpoint.
///
/// The underlying limiter sits behind a lock so it can be swapped atomically
/// when the provider signals that we are being throttled; callers already
/// holding the old limiter finish against it. A throttle override lasts one
/// cooldown, after which the configured quota is reinstated.
pub struct EndpointRateLimiter {
    name: String,
    config: RateLimiterConfig,
    slot: RwLock<LimiterSlot>,
}

impl EndpointRateLimiter {
    pub fn new(name: impl Into<String>, config: RateLimiterConfig) -> Self {
        let limiter = Arc::new(RateLimiter::direct(config.quota()));
        Self {
            name: name.into(),
            config,
            slot: RwLock::new(LimiterSlot {
                limiter,
                cooldown: None,
                restore_at: None,
            }),
        }
    }

    /// Take a permit, waiting up to the configured timeout.
    ///
    /// Returns `false` if no permit became available in time.
    pub async fn acquire(&self) -> bool {
        let deadline = Instant::now() + self.config.timeout;
        loop {
            self.lift_expired_override();
            let limiter = Arc::clone(&self.slot.read().limiter);
            if limiter.check().is_ok() {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                debug!(limiter = %self.name, "no rate limit permit available");
                return false;
            }
            tokio::time::sleep(POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Replace the limiter with one admitting a single call per `cooldown`,
    /// with its initial permit already spent.
    pub fn throttle_to(&self, cooldown: Duration) {
        let Some(quota) = Quota::with_period(cooldown) else {
            warn!(limiter = %self.name, "zero cooldown, rate limiter not throttled");
            return;
        };
        let limiter = RateLimiter::direct(quota);
        // Spend the fresh permit so the next admission waits a full cooldown.
        let _ = limiter.check();

        let mut slot = self.slot.write();
        slot.limiter = Arc::new(limiter);
        slot.cooldown = Some(cooldown);
        slot.restore_at = Some(std::time::Instant::now() + cooldown);
        info!(limiter = %self.name, cooldown_ms = cooldown.as_millis(), "rate limiter throttled");
    }

    /// Drop any throttle override and go back to the configured quota.
    ///
    /// Returns `true` if an override was in effect.
    pub fn restore(&self) -> bool {
        let mut slot = self.slot.write();
        slot.restore_at = None;
        if slot.cooldown.take().is_none() {
            return false;
        }
        slot.limiter = Arc::new(RateLimiter::direct(self.config.quota()));
        info!(limiter = %self.name, "rate limiter restored to configured quota");
        true
    }

    fn lift_expired_override(&self) {
        let expired = self
            .slot
            .read()
            .restore_at
            .is_some_and(|at| std::time::Instant::now() >= at);
        if expired {
            self.restore();
        }
    }

    /// The active throttle cooldown, if an override is in effect.
    pub fn cooldown(&self) -> Option<Duration> {
        self.slot.read().cooldown
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }
}

impl std::fmt::Debug for EndpointRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointRateLimiter")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("cooldown", &self.cooldown())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(limit: u32, period: Duration, timeout: Duration) -> EndpointRateLimiter {
        EndpointRateLimiter::new(
            "slack:alerts",
            RateLimiterConfig {
                limit_for_period: limit,
                refresh_period: period,
                timeout,
            },
        )
    }

    #[test]
    fn validation() {
        assert!(RateLimiterConfig::default().validate().is_ok());
        let zero = RateLimiterConfig {
            limit_for_period: 0,
            ..RateLimiterConfig::default()
        };
        assert!(zero.validate().is_err());
        let instant = RateLimiterConfig {
            refresh_period: Duration::ZERO,
            ..RateLimiterConfig::default()
        };
        assert!(instant.validate().is_err());
    }

    #[tokio::test]
    async fn burst_up_to_limit_then_rejects() {
        let rl = limiter(3, Duration::from_secs(60), Duration::ZERO);
        assert!(rl.acquire().await);
        assert!(rl.acquire().await);
        assert!(rl.acquire().await);
        assert!(!rl.acquire().await);
    }

    #[tokio::test]
    async fn waits_for_permit_within_timeout() {
        let rl = limiter(1, Duration::from_millis(50), Duration::from_secs(2));
        assert!(rl.acquire().await);
        let started = std::time::Instant::now();
        assert!(rl.acquire().await);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn throttle_drains_and_restore_recovers() {
        let rl = limiter(100, Duration::from_secs(1), Duration::ZERO);
        rl.throttle_to(Duration::from_secs(30));
        assert_eq!(rl.cooldown(), Some(Duration::from_secs(30)));
        assert!(!rl.acquire().await, "throttled limiter starts drained");

        assert!(rl.restore());
        assert!(rl.cooldown().is_none());
        assert!(rl.acquire().await);
        assert!(!rl.restore(), "nothing left to restore");
    }

    #[tokio::test]
    async fn override_lifts_after_cooldown() {
        let rl = limiter(100, Duration::from_secs(1), Duration::ZERO);
        rl.throttle_to(Duration::from_millis(50));
        assert!(!rl.acquire().await);

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rl.acquire().await);
        assert!(rl.cooldown().is_none());
        assert!(rl.acquire().await, "configured burst is back");
    }

    #[test]
    fn zero_cooldown_is_ignored() {
        let rl = limiter(5, Duration::from_secs(1), Duration::ZERO);
        rl.throttle_to(Duration::ZERO);
        assert!(rl.cooldown().is_none());
    }
}
