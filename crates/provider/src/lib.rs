pub mod error;
pub mod formatter;
pub mod formatter_registry;
pub mod log;
pub mod registry;
pub mod sender;

#[cfg(feature = "webhook")]
pub mod webhook;

pub use error::FormatError;
pub use formatter::{DynFormatter, Formatter, is_empty_payload};
pub use formatter_registry::{FormatterKey, FormatterRegistry};
pub use log::LogSender;
pub use registry::SenderRegistry;
pub use sender::{DynSender, Sender};

#[cfg(feature = "webhook")]
pub use webhook::WebhookSender;
