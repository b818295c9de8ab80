use herald_core::Notification;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::error::FormatError;

/// Strongly-typed payload formatter for one platform.
///
/// The formatter declares the concrete context type it understands through
/// [`Formatter::Context`]. Before rendering, the notification's context is
/// deserialized into that type; a shape mismatch surfaces as
/// [`FormatError::ContextMismatch`] and the formatter is never invoked.
///
/// Every `Formatter` automatically implements [`DynFormatter`].
pub trait Formatter: Send + Sync {
    /// Context shape this formatter accepts.
    type Context: DeserializeOwned;

    /// Render the platform payload.
    fn render(
        &self,
        notification: &Notification,
        context: Self::Context,
    ) -> Result<serde_json::Value, FormatError>;
}

/// Object-safe formatter used by the registry and dispatcher.
///
/// Implement this trait directly for fallback formatters that accept any
/// context shape; typed formatters should implement [`Formatter`] instead.
pub trait DynFormatter: Send + Sync {
    /// Name of the declared context type, or `None` if any context is
    /// accepted.
    fn context_type(&self) -> Option<&'static str>;

    /// Render the platform payload for `notification`.
    fn format(&self, notification: &Notification) -> Result<serde_json::Value, FormatError>;
}

impl<T: Formatter> DynFormatter for T {
    fn context_type(&self) -> Option<&'static str> {
        Some(std::any::type_name::<T::Context>())
    }

    fn format(&self, notification: &Notification) -> Result<serde_json::Value, FormatError> {
        let context = <T::Context as Deserialize>::deserialize(notification.context()).map_err(
            |e| FormatError::ContextMismatch {
                expected: std::any::type_name::<T::Context>(),
                reason: e.to_string(),
            },
        )?;
        self.render(notification, context)
    }
}

/// Whether a rendered payload carries nothing worth sending.
///
/// `null`, blank strings, and empty arrays or objects are all empty.
pub fn is_empty_payload(payload: &serde_json::Value) -> bool {
    match payload {
        serde_json::Value::Null => true,
        serde_json::Value::String(s) => s.trim().is_empty(),
        serde_json::Value::Array(items) => items.is_empty(),
        serde_json::Value::Object(fields) => fields.is_empty(),
        serde_json::Value::Bool(_) | serde_json::Value::Number(_) => false,
    }
}
