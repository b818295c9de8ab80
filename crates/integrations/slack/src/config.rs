/// Presentation options for the Slack formatter.
#[derive(Debug, Clone)]
pub struct SlackConfig {
    /// Display name override for the posting webhook.
    pub username: Option<String>,

    /// Emoji shortcode used as the message icon, e.g. `:rotating_light:`.
    pub icon_emoji: Option<String>,

    /// Whether to append a context block with the category and timestamp.
    pub include_context_block: bool,
}

impl SlackConfig {
    pub fn new() -> Self {
        Self {
            username: None,
            icon_emoji: None,
            include_context_block: true,
        }
    }

    #[must_use]
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    #[must_use]
    pub fn with_icon_emoji(mut self, emoji: impl Into<String>) -> Self {
        self.icon_emoji = Some(emoji.into());
        self
    }

    /// Drop the trailing context block.
    #[must_use]
    pub fn without_context_block(mut self) -> Self {
        self.include_context_block = false;
        self
    }
}

impl Default for SlackConfig {
    fn default() -> Self {
        Self::new()
    }
}
