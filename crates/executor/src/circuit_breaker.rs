use std::collections::VecDeque;
use std::sync::RwLock;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation, calls flow through.
    Closed,
    /// The endpoint is failing; calls are rejected without an attempt.
    Open,
    /// Recovery probe; a bounded number of trial calls are admitted.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for a per-endpoint circuit breaker.
///
/// Outcomes are tracked over a count-based sliding window of the most recent
/// `window_size` calls.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures within the window that open the circuit.
    pub failure_threshold: u32,
    /// Failure percentage (0–100] within the window that opens the circuit,
    /// once at least `minimum_calls` outcomes are recorded.
    pub failure_rate_threshold: f64,
    /// Calls required before the failure rate is evaluated.
    pub minimum_calls: u32,
    /// Number of most recent outcomes kept in the window.
    pub window_size: u32,
    /// How long to stay `Open` before admitting trial calls.
    pub wait_duration: Duration,
    /// Maximum trial calls in flight while `HalfOpen`.
    pub permitted_half_open_calls: u32,
    /// Consecutive trial successes that close the circuit.
    pub success_threshold: u32,
}

impl CircuitBreakerConfig {
    /// Validate configuration values.
    ///
    /// `wait_duration = 0` is allowed (useful for testing).
    pub fn validate(&self) -> Result<(), String> {
        if self.failure_threshold < 1 {
            return Err("failure_threshold must be >= 1".into());
        }
        if self.success_threshold < 1 {
            return Err("success_threshold must be >= 1".into());
        }
        if self.window_size < 1 {
            return Err("window_size must be >= 1".into());
        }
        if self.failure_threshold > self.window_size {
            return Err("failure_threshold must not exceed window_size".into());
        }
        if self.permitted_half_open_calls < 1 {
            return Err("permitted_half_open_calls must be >= 1".into());
        }
        if !(self.failure_rate_threshold > 0.0 && self.failure_rate_threshold <= 100.0) {
            return Err("failure_rate_threshold must be in (0, 100]".into());
        }
        Ok(())
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_rate_threshold: 50.0,
            minimum_calls: 10,
            window_size: 20,
            wait_duration: Duration::from_secs(60),
            permitted_half_open_calls: 3,
            success_threshold: 2,
        }
    }
}

type Transition = (CircuitState, CircuitState);

/// Internal mutable state for a single circuit breaker.
struct CircuitData {
    state: CircuitState,
    /// Most recent outcomes while `Closed`; `true` marks a failure.
    window: VecDeque<bool>,
    failures_in_window: u32,
    consecutive_successes: u32,
    trials_in_flight: u32,
    opened_at: Option<Instant>,
    /// Bumped on every transition so permits issued in an earlier state are
    /// ignored when they settle.
    epoch: u64,
}

impl CircuitData {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            window: VecDeque::new(),
            failures_in_window: 0,
            consecutive_successes: 0,
            trials_in_flight: 0,
            opened_at: None,
            epoch: 0,
        }
    }

    fn move_to(&mut self, to: CircuitState) -> Transition {
        let from = self.state;
        self.state = to;
        self.epoch += 1;
        self.window.clear();
        self.failures_in_window = 0;
        self.consecutive_successes = 0;
        self.trials_in_flight = 0;
        self.opened_at = (to == CircuitState::Open).then(Instant::now);
        (from, to)
    }
}

/// Circuit breaker for a single endpoint.
///
/// - `Closed` -> `Open` when the window's failure count or failure rate
///   reaches its threshold
/// - `Open` -> `HalfOpen` once `wait_duration` has elapsed
/// - `HalfOpen` -> `Closed` after `success_threshold` consecutive trial
///   successes
/// - `HalfOpen` -> `Open` on any trial failure
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    data: RwLock<CircuitData>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker in the `Closed` state.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            data: RwLock::new(CircuitData::new()),
        }
    }

    /// Ask to make a call.
    ///
    /// Returns `None` if the circuit is open (or all half-open trial slots are
    /// taken). This may trigger the `Open` -> `HalfOpen` transition when the
    /// wait duration has elapsed. The returned permit must be settled with
    /// [`CallPermit::succeeded`] or [`CallPermit::failed`]; a permit dropped
    /// unsettled releases its trial slot without recording an outcome.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        match data.state {
            CircuitState::Closed => Some(CallPermit::new(self, data.epoch, false)),
            CircuitState::Open => {
                let elapsed = data
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.config.wait_duration);
                if !elapsed {
                    return None;
                }
                let (from, to) = data.move_to(CircuitState::HalfOpen);
                info!(circuit = %self.name, %from, %to, "circuit breaker admitting trial calls");
                data.trials_in_flight = 1;
                Some(CallPermit::new(self, data.epoch, true))
            }
            CircuitState::HalfOpen => {
                if data.trials_in_flight >= self.config.permitted_half_open_calls {
                    return None;
                }
                data.trials_in_flight += 1;
                Some(CallPermit::new(self, data.epoch, true))
            }
        }
    }

    fn on_success(&self, epoch: u64, trial: bool) -> Option<Transition> {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if data.epoch != epoch {
            return None;
        }

        if trial {
            data.trials_in_flight = data.trials_in_flight.saturating_sub(1);
            data.consecutive_successes += 1;
            if data.consecutive_successes >= self.config.success_threshold {
                let transition = data.move_to(CircuitState::Closed);
                info!(circuit = %self.name, "circuit breaker closing after successful trials");
                return Some(transition);
            }
            None
        } else {
            self.push_outcome(&mut data, false);
            None
        }
    }

    fn on_failure(&self, epoch: u64, trial: bool) -> Option<Transition> {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if data.epoch != epoch {
            return None;
        }

        if trial {
            let transition = data.move_to(CircuitState::Open);
            info!(circuit = %self.name, "circuit breaker re-opening after trial failure");
            return Some(transition);
        }

        self.push_outcome(&mut data, true);
        let calls = u32::try_from(data.window.len()).unwrap_or(u32::MAX);
        let rate = f64::from(data.failures_in_window) * 100.0 / f64::from(calls.max(1));
        let count_tripped = data.failures_in_window >= self.config.failure_threshold;
        let rate_tripped =
            calls >= self.config.minimum_calls && rate >= self.config.failure_rate_threshold;

        if count_tripped || rate_tripped {
            info!(
                circuit = %self.name,
                failures = data.failures_in_window,
                calls,
                failure_rate = rate,
                "circuit breaker opening"
            );
            return Some(data.move_to(CircuitState::Open));
        }
        None
    }

    fn release_trial(&self, epoch: u64) {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if data.epoch == epoch {
            data.trials_in_flight = data.trials_in_flight.saturating_sub(1);
            debug!(circuit = %self.name, "abandoned trial call released");
        }
    }

    fn push_outcome(&self, data: &mut CircuitData, failed: bool) {
        let capacity = self.config.window_size as usize;
        while data.window.len() >= capacity {
            if data.window.pop_front() == Some(true) {
                data.failures_in_window -= 1;
            }
        }
        data.window.push_back(failed);
        if failed {
            data.failures_in_window += 1;
        }
    }

    /// Current state without triggering transitions.
    pub fn state(&self) -> CircuitState {
        self.data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .state
    }

    /// The circuit's name (the endpoint resource key).
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Reset the circuit breaker to `Closed`.
    pub fn reset(&self) {
        let mut data = self
            .data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        data.move_to(CircuitState::Closed);
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self
            .data
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &data.state)
            .field("failures_in_window", &data.failures_in_window)
            .field("trials_in_flight", &data.trials_in_flight)
            .finish_non_exhaustive()
    }
}

/// Admission granted by [`CircuitBreaker::try_acquire`].
#[must_use = "settle the permit with `succeeded` or `failed`"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    epoch: u64,
    trial: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, epoch: u64, trial: bool) -> Self {
        Self {
            breaker,
            epoch,
            trial,
            settled: false,
        }
    }

    /// Whether this permit is a half-open trial call.
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    /// Record a successful call. Returns the transition it caused, if any.
    pub fn succeeded(mut self) -> Option<(CircuitState, CircuitState)> {
        self.settled = true;
        self.breaker.on_success(self.epoch, self.trial)
    }

    /// Record a failed call. Returns the transition it caused, if any.
    pub fn failed(mut self) -> Option<(CircuitState, CircuitState)> {
        self.settled = true;
        self.breaker.on_failure(self.epoch, self.trial)
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.trial {
            self.breaker.release_trial(self.epoch);
        }
    }
}
