use std::collections::HashMap;
use std::time::Duration;

use herald_executor::{
    BulkheadConfig, CircuitBreakerConfig, GateConfig, RateLimiterConfig, RetryStrategy,
};
use serde::Deserialize;

/// Per-endpoint resilience defaults plus overrides keyed by resource key
/// (`platform:endpointKey`).
///
/// # Example
///
/// ```toml
/// [resilience]
/// max_attempts = 3
/// send_timeout_ms = 10000
///
/// [resilience.retry]
/// strategy = "exponential"
/// initial_delay_ms = 500
/// max_delay_ms = 10000
/// multiplier = 2.0
/// jitter = 0.1
///
/// [resilience.circuit_breaker]
/// failure_threshold = 5
/// wait_duration_seconds = 60
///
/// [resilience.overrides."slack:alerts"]
/// max_attempts = 5
/// limit_for_period = 1
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ResilienceConfig {
    /// Total send attempts per target, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Bound on a single send attempt.
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
    #[serde(default)]
    pub retry: RetrySection,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSection,
    #[serde(default)]
    pub rate_limiter: RateLimiterSection,
    #[serde(default)]
    pub bulkhead: BulkheadSection,
    /// Per-resource overrides applied on top of the defaults above.
    #[serde(default)]
    pub overrides: HashMap<String, ResilienceOverride>,
}

impl ResilienceConfig {
    /// Gate configuration used for resources without an override.
    pub fn gate_config(&self) -> GateConfig {
        GateConfig {
            max_attempts: self.max_attempts,
            retry: self.retry.strategy(),
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            circuit_breaker: self.circuit_breaker.to_config(),
            rate_limiter: self.rate_limiter.to_config(),
            bulkhead: self.bulkhead.to_config(),
        }
    }

    /// Gate configuration for `resource`, with its override applied.
    pub fn gate_config_for(&self, resource: &str) -> GateConfig {
        let mut config = self.gate_config();
        if let Some(overrides) = self.overrides.get(resource) {
            overrides.apply(&mut config);
        }
        config
    }

    /// Validate the defaults and every override.
    pub fn validate(&self) -> Result<(), String> {
        self.gate_config().validate()?;
        let mut resources: Vec<&String> = self.overrides.keys().collect();
        resources.sort_unstable();
        for resource in resources {
            self.gate_config_for(resource)
                .validate()
                .map_err(|e| format!("overrides.\"{resource}\": {e}"))?;
        }
        Ok(())
    }
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            send_timeout_ms: default_send_timeout_ms(),
            retry: RetrySection::default(),
            circuit_breaker: CircuitBreakerSection::default(),
            rate_limiter: RateLimiterSection::default(),
            bulkhead: BulkheadSection::default(),
            overrides: HashMap::new(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_send_timeout_ms() -> u64 {
    10_000
}

/// Backoff shape between retry attempts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryKind {
    #[default]
    Exponential,
    /// Every retry waits `initial_delay_ms`.
    Constant,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default)]
    pub strategy: RetryKind,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl RetrySection {
    pub fn strategy(&self) -> RetryStrategy {
        match self.strategy {
            RetryKind::Exponential => RetryStrategy::Exponential {
                initial: Duration::from_millis(self.initial_delay_ms),
                max: Duration::from_millis(self.max_delay_ms),
                multiplier: self.multiplier,
                jitter: self.jitter,
            },
            RetryKind::Constant => RetryStrategy::Constant {
                delay: Duration::from_millis(self.initial_delay_ms),
            },
        }
    }
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            strategy: RetryKind::default(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.1
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerSection {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Percentage in `(0, 100]`.
    #[serde(default = "default_failure_rate_threshold")]
    pub failure_rate_threshold: f64,
    #[serde(default = "default_minimum_calls")]
    pub minimum_calls: u32,
    #[serde(default = "default_window_size")]
    pub window_size: u32,
    #[serde(default = "default_wait_duration")]
    pub wait_duration_seconds: u64,
    #[serde(default = "default_half_open_calls")]
    pub permitted_half_open_calls: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl CircuitBreakerSection {
    pub fn to_config(&self) -> CircuitBreakerConfig {
        CircuitBreakerConfig {
            failure_threshold: self.failure_threshold,
            failure_rate_threshold: self.failure_rate_threshold,
            minimum_calls: self.minimum_calls,
            window_size: self.window_size,
            wait_duration: Duration::from_secs(self.wait_duration_seconds),
            permitted_half_open_calls: self.permitted_half_open_calls,
            success_threshold: self.success_threshold,
        }
    }
}

impl Default for CircuitBreakerSection {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            failure_rate_threshold: default_failure_rate_threshold(),
            minimum_calls: default_minimum_calls(),
            window_size: default_window_size(),
            wait_duration_seconds: default_wait_duration(),
            permitted_half_open_calls: default_half_open_calls(),
            success_threshold: default_success_threshold(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_failure_rate_threshold() -> f64 {
    50.0
}

fn default_minimum_calls() -> u32 {
    10
}

fn default_window_size() -> u32 {
    20
}

fn default_wait_duration() -> u64 {
    60
}

fn default_half_open_calls() -> u32 {
    3
}

fn default_success_threshold() -> u32 {
    2
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimiterSection {
    #[serde(default = "default_limit_for_period")]
    pub limit_for_period: u32,
    #[serde(default = "default_refresh_period_ms")]
    pub refresh_period_ms: u64,
    /// How long a send may wait for a permit; zero fails immediately.
    #[serde(default)]
    pub timeout_ms: u64,
}

impl RateLimiterSection {
    pub fn to_config(&self) -> RateLimiterConfig {
        RateLimiterConfig {
            limit_for_period: self.limit_for_period,
            refresh_period: Duration::from_millis(self.refresh_period_ms),
            timeout: Duration::from_millis(self.timeout_ms),
        }
    }
}

impl Default for RateLimiterSection {
    fn default() -> Self {
        Self {
            limit_for_period: default_limit_for_period(),
            refresh_period_ms: default_refresh_period_ms(),
            timeout_ms: 0,
        }
    }
}

fn default_limit_for_period() -> u32 {
    10
}

fn default_refresh_period_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Deserialize)]
pub struct BulkheadSection {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default)]
    pub max_wait_ms: u64,
}

impl BulkheadSection {
    pub fn to_config(&self) -> BulkheadConfig {
        BulkheadConfig {
            max_concurrent: self.max_concurrent,
            max_wait: Duration::from_millis(self.max_wait_ms),
        }
    }
}

impl Default for BulkheadSection {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            max_wait_ms: 0,
        }
    }
}

fn default_max_concurrent() -> usize {
    10
}

/// Per-resource overrides. Unset fields keep the resilience defaults; a
/// `retry` table replaces the default retry section wholesale.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResilienceOverride {
    pub max_attempts: Option<u32>,
    pub send_timeout_ms: Option<u64>,
    pub retry: Option<RetrySection>,
    pub failure_threshold: Option<u32>,
    pub failure_rate_threshold: Option<f64>,
    pub minimum_calls: Option<u32>,
    pub window_size: Option<u32>,
    pub wait_duration_seconds: Option<u64>,
    pub permitted_half_open_calls: Option<u32>,
    pub success_threshold: Option<u32>,
    pub limit_for_period: Option<u32>,
    pub refresh_period_ms: Option<u64>,
    pub rate_limiter_timeout_ms: Option<u64>,
    pub max_concurrent: Option<usize>,
    pub max_wait_ms: Option<u64>,
}

impl ResilienceOverride {
    fn apply(&self, config: &mut GateConfig) {
        if let Some(v) = self.max_attempts {
            config.max_attempts = v;
        }
        if let Some(v) = self.send_timeout_ms {
            config.send_timeout = Duration::from_millis(v);
        }
        if let Some(retry) = &self.retry {
            config.retry = retry.strategy();
        }

        let cb = &mut config.circuit_breaker;
        if let Some(v) = self.failure_threshold {
            cb.failure_threshold = v;
        }
        if let Some(v) = self.failure_rate_threshold {
            cb.failure_rate_threshold = v;
        }
        if let Some(v) = self.minimum_calls {
            cb.minimum_calls = v;
        }
        if let Some(v) = self.window_size {
            cb.window_size = v;
        }
        if let Some(v) = self.wait_duration_seconds {
            cb.wait_duration = Duration::from_secs(v);
        }
        if let Some(v) = self.permitted_half_open_calls {
            cb.permitted_half_open_calls = v;
        }
        if let Some(v) = self.success_threshold {
            cb.success_threshold = v;
        }

        let rl = &mut config.rate_limiter;
        if let Some(v) = self.limit_for_period {
            rl.limit_for_period = v;
        }
        if let Some(v) = self.refresh_period_ms {
            rl.refresh_period = Duration::from_millis(v);
        }
        if let Some(v) = self.rate_limiter_timeout_ms {
            rl.timeout = Duration::from_millis(v);
        }

        if let Some(v) = self.max_concurrent {
            config.bulkhead.max_concurrent = v;
        }
        if let Some(v) = self.max_wait_ms {
            config.bulkhead.max_wait = Duration::from_millis(v);
        }
    }
}

/// Provider rate-limit feedback.
#[derive(Debug, Clone, Deserialize)]
pub struct AdaptiveConfig {
    /// When disabled, provider 429s are still retried but never throttle the
    /// local limiter.
    #[serde(default = "default_adaptive_enabled")]
    pub enabled: bool,
    /// Cooldown used when the provider sent no usable `Retry-After`.
    #[serde(default = "default_cooldown_seconds")]
    pub default_cooldown_seconds: u64,
}

impl AdaptiveConfig {
    pub fn default_cooldown(&self) -> Duration {
        Duration::from_secs(self.default_cooldown_seconds)
    }

    /// A zero cooldown cannot be expressed as a throttle, so it is rejected
    /// while feedback is enabled.
    pub fn validate(&self) -> Result<(), String> {
        if self.enabled && self.default_cooldown_seconds == 0 {
            return Err("default_cooldown_seconds must be >= 1".into());
        }
        Ok(())
    }
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: default_adaptive_enabled(),
            default_cooldown_seconds: default_cooldown_seconds(),
        }
    }
}

fn default_adaptive_enabled() -> bool {
    true
}

fn default_cooldown_seconds() -> u64 {
    30
}
