use std::time::Duration;

use crate::bulkhead::BulkheadConfig;
use crate::circuit_breaker::CircuitBreakerConfig;
use crate::rate_limiter::RateLimiterConfig;
use crate::retry::RetryStrategy;

/// Resilience settings for one endpoint's [`ResilienceGate`](crate::ResilienceGate).
///
/// # Examples
///
/// ```
/// use herald_executor::GateConfig;
///
/// let config = GateConfig::default();
/// assert_eq!(config.max_attempts, 3);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Total send attempts per gated call, including the first.
    pub max_attempts: u32,
    /// Strategy used to compute the delay between attempts.
    pub retry: RetryStrategy,
    /// Maximum wall-clock time for a single send attempt.
    pub send_timeout: Duration,
    pub circuit_breaker: CircuitBreakerConfig,
    pub rate_limiter: RateLimiterConfig,
    pub bulkhead: BulkheadConfig,
}

impl GateConfig {
    /// Validate every section, prefixing errors with the section name.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts < 1 {
            return Err("retry: max_attempts must be >= 1".into());
        }
        if let RetryStrategy::Exponential {
            multiplier, jitter, ..
        } = &self.retry
        {
            if *multiplier < 1.0 {
                return Err("retry: multiplier must be >= 1".into());
            }
            if !(0.0..=1.0).contains(jitter) {
                return Err("retry: jitter must be within [0, 1]".into());
            }
        }
        if self.send_timeout.is_zero() {
            return Err("send_timeout must be > 0".into());
        }
        self.circuit_breaker
            .validate()
            .map_err(|e| format!("circuit_breaker: {e}"))?;
        self.rate_limiter
            .validate()
            .map_err(|e| format!("rate_limiter: {e}"))?;
        self.bulkhead
            .validate()
            .map_err(|e| format!("bulkhead: {e}"))
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry: RetryStrategy::default(),
            send_timeout: Duration::from_secs(10),
            circuit_breaker: CircuitBreakerConfig::default(),
            rate_limiter: RateLimiterConfig::default(),
            bulkhead: BulkheadConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = GateConfig::default();
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.send_timeout, Duration::from_secs(10));
        assert_eq!(cfg.bulkhead.max_concurrent, 10);
        assert_eq!(cfg.rate_limiter.limit_for_period, 10);
    }

    #[test]
    fn rejects_bad_retry_settings() {
        let no_attempts = GateConfig {
            max_attempts: 0,
            ..GateConfig::default()
        };
        assert!(no_attempts.validate().is_err());

        let shrinking = GateConfig {
            retry: RetryStrategy::Exponential {
                initial: Duration::from_millis(100),
                max: Duration::from_secs(1),
                multiplier: 0.5,
                jitter: 0.0,
            },
            ..GateConfig::default()
        };
        assert!(shrinking.validate().unwrap_err().contains("multiplier"));

        let wild_jitter = GateConfig {
            retry: RetryStrategy::Exponential {
                initial: Duration::from_millis(100),
                max: Duration::from_secs(1),
                multiplier: 2.0,
                jitter: 1.5,
            },
            ..GateConfig::default()
        };
        assert!(wild_jitter.validate().unwrap_err().contains("jitter"));
    }

    #[test]
    fn section_errors_are_prefixed() {
        let mut cfg = GateConfig::default();
        cfg.bulkhead.max_concurrent = 0;
        assert!(cfg.validate().unwrap_err().starts_with("bulkhead:"));
    }
}
