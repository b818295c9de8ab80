use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Status code recorded for transport failures that never produced a
/// provider response.
pub const NETWORK_ERROR_CODE: i32 = -1;

/// The provider's "too many requests" status code.
pub const TOO_MANY_REQUESTS: i32 = 429;

/// Outcome of a single transport attempt against a webhook endpoint.
///
/// Construct values through the factory functions so the retryable flag and
/// status code stay consistent with the failure class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendResult {
    /// Whether the provider accepted the payload.
    pub success: bool,
    /// Provider status code, or [`NETWORK_ERROR_CODE`].
    pub status_code: i32,
    /// Error description for failed attempts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether retrying the same request may succeed.
    pub retryable: bool,
    /// Cooldown suggested by the provider, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<Duration>,
}

impl SendResult {
    /// A successful delivery.
    pub fn success(status_code: i32) -> Self {
        Self {
            success: true,
            status_code,
            error: None,
            retryable: false,
            retry_after: None,
        }
    }

    /// A failed delivery with an explicit retry classification.
    pub fn failure(status_code: i32, message: impl Into<String>, retryable: bool) -> Self {
        Self {
            success: false,
            status_code,
            error: Some(message.into()),
            retryable,
            retry_after: None,
        }
    }

    /// A transport-level failure (connect, timeout, reset). Always retryable.
    pub fn network_error(message: impl Into<String>) -> Self {
        Self::failure(NETWORK_ERROR_CODE, message, true)
    }

    /// The provider rejected the call because of its own rate limiting.
    /// Always retryable.
    pub fn rate_limited(message: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self {
            success: false,
            status_code: TOO_MANY_REQUESTS,
            error: Some(message.into()),
            retryable: true,
            retry_after,
        }
    }

    /// Classify an HTTP response status.
    ///
    /// 2xx is success, 429 is a provider rate limit, 5xx is a retryable
    /// failure, and every other status is a permanent failure.
    ///
    /// ```
    /// use herald_core::SendResult;
    ///
    /// assert!(SendResult::from_status(204, "", None).success);
    /// assert!(SendResult::from_status(503, "down", None).retryable);
    /// assert!(!SendResult::from_status(404, "gone", None).retryable);
    /// ```
    pub fn from_status(status_code: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let code = i32::from(status_code);
        match status_code {
            200..=299 => Self::success(code),
            429 => Self::rate_limited(format!("HTTP 429: {body}"), retry_after),
            500..=599 => Self::failure(code, format!("HTTP {status_code}: {body}"), true),
            _ => Self::failure(code, format!("HTTP {status_code}: {body}"), false),
        }
    }

    /// Whether this result signals that the provider itself throttled us.
    pub fn is_rate_limited(&self) -> bool {
        !self.success && self.status_code == TOO_MANY_REQUESTS
    }

    /// The error message, or an empty string for successes.
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or_default()
    }
}

/// Why a delivery to one target ended without success.
///
/// Every variant is terminal for the attempt that produced it; failed
/// deliveries end up in the dead-letter store with the [`Display`] rendering
/// of this value as their reason.
///
/// [`Display`]: std::fmt::Display
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DeliveryFailure {
    /// No formatter (specific or fallback) is registered for the target.
    NoFormatter,
    /// The formatter rejected the notification's context shape.
    ContextMismatch(String),
    /// The formatter returned an error.
    FormatFailed(String),
    /// The formatter produced an empty payload.
    EmptyPayload,
    /// No sender is registered for the target's platform.
    NoSender,
    /// The endpoint's concurrency limit was reached.
    BulkheadFull,
    /// The endpoint's local rate limiter had no permit available.
    RateLimited,
    /// The endpoint's circuit breaker is open; no attempt was made.
    CircuitOpen,
    /// The transport attempt(s) failed.
    SendFailed {
        /// Last status code observed.
        status_code: i32,
        /// Last error message observed.
        message: String,
    },
    /// The per-target pipeline panicked.
    Panicked(String),
}

impl DeliveryFailure {
    /// Short machine-readable label for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoFormatter => "no_formatter",
            Self::ContextMismatch(_) => "context_mismatch",
            Self::FormatFailed(_) => "format_failed",
            Self::EmptyPayload => "empty_payload",
            Self::NoSender => "no_sender",
            Self::BulkheadFull => "bulkhead_full",
            Self::RateLimited => "rate_limited",
            Self::CircuitOpen => "circuit_open",
            Self::SendFailed { .. } => "send_failed",
            Self::Panicked(_) => "panicked",
        }
    }
}

impl fmt::Display for DeliveryFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoFormatter => write!(f, "no formatter"),
            Self::ContextMismatch(msg) => write!(f, "context type mismatch: {msg}"),
            Self::FormatFailed(msg) => write!(f, "formatting failed: {msg}"),
            Self::EmptyPayload => write!(f, "formatter produced an empty payload"),
            Self::NoSender => write!(f, "no sender"),
            Self::BulkheadFull => write!(f, "bulkhead full"),
            Self::RateLimited => write!(f, "rate limited"),
            Self::CircuitOpen => write!(f, "skipped: circuit open"),
            Self::SendFailed {
                status_code,
                message,
            } => write!(f, "send failed ({status_code}): {message}"),
            Self::Panicked(msg) => write!(f, "unexpected panic: {msg}"),
        }
    }
}

impl From<&SendResult> for DeliveryFailure {
    fn from(result: &SendResult) -> Self {
        Self::SendFailed {
            status_code: result.status_code,
            message: result.error_message().to_owned(),
        }
    }
}
