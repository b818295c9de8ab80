use herald_core::SendResult;
use tracing::info;

use crate::sender::Sender;

/// A sender that logs the payload and reports success without performing any
/// external I/O.
///
/// Useful for local development and for platforms whose endpoints are not
/// reachable from the current environment.
pub struct LogSender {
    platform: String,
}

impl LogSender {
    /// Create a new `LogSender` for the given platform.
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
        }
    }
}

impl Sender for LogSender {
    fn platform(&self) -> &str {
        &self.platform
    }

    async fn send(&self, url: &str, payload: &serde_json::Value) -> SendResult {
        info!(
            platform = %self.platform,
            url,
            payload = %payload,
            "log sender delivered payload"
        );
        SendResult::success(200)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_sender_platform() {
        let sender = LogSender::new("slack");
        assert_eq!(Sender::platform(&sender), "slack");
    }

    #[tokio::test]
    async fn log_sender_always_succeeds() {
        let sender = LogSender::new("slack");
        let result = Sender::send(&sender, "https://x", &serde_json::json!({"text": "hi"})).await;
        assert!(result.success);
        assert_eq!(result.status_code, 200);
    }
}
