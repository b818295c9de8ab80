use std::collections::HashMap;
use std::time::Duration;

use herald_core::SendResult;
use reqwest::Client;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use tracing::{debug, instrument, warn};

use crate::sender::Sender;

/// A sender that POSTs the formatted JSON payload to the target URL.
///
/// Slack incoming webhooks, Discord webhooks, and Teams connectors all accept
/// a JSON POST, so one implementation serves every platform; register one
/// instance per platform identifier. Feature-gated behind `webhook`.
pub struct WebhookSender {
    /// Platform identifier this instance serves.
    platform: String,
    /// HTTP client used for outgoing requests.
    client: Client,
    /// Additional headers to include in every request.
    headers: HashMap<String, String>,
}

impl WebhookSender {
    /// Create a new `WebhookSender` for the given platform.
    ///
    /// Uses a default `reqwest::Client` and no extra headers.
    pub fn new(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            client: Client::new(),
            headers: HashMap::new(),
        }
    }

    /// Set a custom `reqwest::Client` (e.g. with timeouts or TLS
    /// configuration).
    #[must_use]
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    /// Add extra headers to send with every webhook request.
    #[must_use]
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

/// Parse a delta-seconds `Retry-After` header. HTTP-date values are ignored.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl Sender for WebhookSender {
    fn platform(&self) -> &str {
        &self.platform
    }

    #[instrument(skip(self, payload), fields(platform = %self.platform))]
    async fn send(&self, url: &str, payload: &serde_json::Value) -> SendResult {
        let mut request = self.client.post(url).json(payload);
        for (key, value) in &self.headers {
            request = request.header(key, value);
        }

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "webhook request failed");
                return SendResult::network_error(e.to_string());
            }
        };

        let status = response.status().as_u16();
        let retry_after = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();

        debug!(status, "webhook responded");
        SendResult::from_status(status, &body, retry_after)
    }
}
