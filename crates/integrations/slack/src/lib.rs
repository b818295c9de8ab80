//! Slack payload formatting for Herald.
//!
//! Delivery itself goes through the generic webhook sender; this crate only
//! turns notifications into Slack incoming-webhook message bodies.

pub mod config;
pub mod formatter;
pub mod types;

pub use config::SlackConfig;
pub use formatter::{SlackFormatter, escape_mrkdwn};
pub use types::{Block, SlackMessage, Text};
