use serde::Serialize;

/// Incoming-webhook message body.
#[derive(Debug, Serialize)]
pub struct SlackMessage {
    /// Fallback text shown in notifications and by clients without blocks.
    pub text: String,
    pub blocks: Vec<Block>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon_emoji: Option<String>,
}

/// The subset of Block Kit layout blocks the formatter emits.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { text: Text },
    Section { text: Text },
    Context { elements: Vec<Text> },
}

/// A Block Kit text object.
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "text", rename_all = "snake_case")]
pub enum Text {
    PlainText(String),
    Mrkdwn(String),
}
