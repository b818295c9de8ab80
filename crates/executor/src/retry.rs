use std::time::Duration;

use rand::Rng;

/// Strategy for computing delay between retry attempts.
///
/// Attempt numbers are one-based: `delay_for(1)` is the wait after the first
/// failed attempt.
#[derive(Debug, Clone)]
pub enum RetryStrategy {
    /// Exponential backoff: `initial * multiplier^(attempt - 1)`, capped at
    /// `max`, then spread by a symmetric random jitter.
    Exponential {
        /// Delay after the first failed attempt.
        initial: Duration,
        /// Upper bound on the un-jittered delay.
        max: Duration,
        /// Factor applied on each successive attempt.
        multiplier: f64,
        /// Fraction in `[0, 1]`; the delay is scaled by a uniform factor in
        /// `[1 - jitter, 1 + jitter)`. Zero disables jitter.
        jitter: f64,
    },
    /// Constant delay between every retry attempt.
    Constant {
        /// Fixed delay duration.
        delay: Duration,
    },
}

impl RetryStrategy {
    /// Compute the delay for the given one-based `attempt` number.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use herald_executor::RetryStrategy;
    ///
    /// let strategy = RetryStrategy::Exponential {
    ///     initial: Duration::from_millis(100),
    ///     max: Duration::from_millis(500),
    ///     multiplier: 2.0,
    ///     jitter: 0.0,
    /// };
    /// assert_eq!(strategy.delay_for(3), Duration::from_millis(400));
    /// assert_eq!(strategy.delay_for(4), Duration::from_millis(500));
    /// ```
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Self::Exponential {
                initial,
                max,
                multiplier,
                jitter,
            } => {
                // Retry counts are small, so the exponent never wraps.
                #[allow(clippy::cast_possible_wrap)]
                let exponent = attempt.saturating_sub(1) as i32;
                let raw = initial.as_secs_f64() * multiplier.powi(exponent);
                let capped = raw.min(max.as_secs_f64());

                let adjusted = if *jitter > 0.0 {
                    let spread: f64 = rand::thread_rng().gen_range(-1.0..1.0);
                    capped * (1.0 + jitter * spread)
                } else {
                    capped
                };

                Duration::from_secs_f64(adjusted.max(0.0))
            }
            Self::Constant { delay } => *delay,
        }
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::Exponential {
            initial: Duration::from_millis(500),
            max: Duration::from_secs(10),
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponential_capped_sequence() {
        let strategy = RetryStrategy::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: 0.0,
        };
        let delays: Vec<u128> = (1..=5)
            .map(|attempt| strategy.delay_for(attempt).as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn jitter_stays_within_bounds_and_varies() {
        let strategy = RetryStrategy::Exponential {
            initial: Duration::from_millis(1000),
            max: Duration::from_secs(60),
            multiplier: 2.0,
            jitter: 0.1,
        };
        let samples: Vec<Duration> = (0..200).map(|_| strategy.delay_for(1)).collect();
        for delay in &samples {
            assert!(*delay >= Duration::from_millis(900), "too short: {delay:?}");
            assert!(*delay <= Duration::from_millis(1100), "too long: {delay:?}");
        }
        assert!(
            samples.iter().any(|d| *d != samples[0]),
            "jittered delays should not all be equal"
        );
    }

    #[test]
    fn attempt_zero_treated_as_first() {
        let strategy = RetryStrategy::Exponential {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(1),
            multiplier: 3.0,
            jitter: 0.0,
        };
        assert_eq!(strategy.delay_for(0), strategy.delay_for(1));
    }

    #[test]
    fn constant_always_same() {
        let strategy = RetryStrategy::Constant {
            delay: Duration::from_millis(250),
        };
        for attempt in 1..10 {
            assert_eq!(strategy.delay_for(attempt), Duration::from_millis(250));
        }
    }

    #[test]
    fn default_is_jittered_exponential() {
        match RetryStrategy::default() {
            RetryStrategy::Exponential {
                initial,
                max,
                multiplier,
                jitter,
            } => {
                assert_eq!(initial, Duration::from_millis(500));
                assert_eq!(max, Duration::from_secs(10));
                assert!((multiplier - 2.0).abs() < f64::EPSILON);
                assert!((jitter - 0.1).abs() < f64::EPSILON);
            }
            RetryStrategy::Constant { .. } => panic!("default should be Exponential"),
        }
    }
}
