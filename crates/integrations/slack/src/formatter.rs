use std::sync::Arc;

use herald_core::{Notification, NotificationTypeRegistry};
use herald_provider::{DynFormatter, FormatError};
use tracing::debug;

use crate::config::SlackConfig;
use crate::types::{Block, SlackMessage, Text};

/// Slack rejects header blocks longer than this.
const MAX_HEADER_CHARS: usize = 150;

/// Platform-wide fallback formatter for Slack incoming webhooks.
///
/// Renders any notification whose type is registered: the type's title
/// becomes the header and the context's `message` string (or the type's
/// default message) the body. Accepts any context shape, so register it with
/// `FormatterRegistry::register_fallback`.
pub struct SlackFormatter {
    types: Arc<NotificationTypeRegistry>,
    config: SlackConfig,
}

impl SlackFormatter {
    pub fn new(types: Arc<NotificationTypeRegistry>) -> Self {
        Self::with_config(types, SlackConfig::default())
    }

    pub fn with_config(types: Arc<NotificationTypeRegistry>, config: SlackConfig) -> Self {
        Self { types, config }
    }

    fn build(&self, notification: &Notification) -> Result<SlackMessage, FormatError> {
        let definition = self
            .types
            .get(notification.type_id())
            .map_err(|e| FormatError::Render(e.to_string()))?;

        let body = notification
            .context()
            .get("message")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_else(|| definition.default_message());
        let title = definition.title();

        let mut blocks = vec![
            Block::Header {
                text: Text::PlainText(title.chars().take(MAX_HEADER_CHARS).collect()),
            },
            Block::Section {
                text: Text::Mrkdwn(escape_mrkdwn(body)),
            },
        ];
        if self.config.include_context_block {
            blocks.push(Block::Context {
                elements: vec![Text::Mrkdwn(format!(
                    "*{}* | {}",
                    escape_mrkdwn(notification.category()),
                    notification.occurred_at().format("%Y-%m-%d %H:%M:%S UTC")
                ))],
            });
        }

        Ok(SlackMessage {
            text: format!("*{}*\n{}", escape_mrkdwn(title), escape_mrkdwn(body)),
            blocks,
            username: self.config.username.clone(),
            icon_emoji: self.config.icon_emoji.clone(),
        })
    }
}

impl DynFormatter for SlackFormatter {
    fn context_type(&self) -> Option<&'static str> {
        None
    }

    fn format(&self, notification: &Notification) -> Result<serde_json::Value, FormatError> {
        let message = self.build(notification)?;
        debug!(notification.type = notification.type_id(), "rendered slack message");
        Ok(serde_json::to_value(message)?)
    }
}

/// Escape the three characters Slack treats as control sequences.
pub fn escape_mrkdwn(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
