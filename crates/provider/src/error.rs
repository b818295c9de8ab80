use thiserror::Error;

/// Errors a formatter can raise while rendering a payload.
///
/// Formatting is deterministic, so none of these are retried; the dispatcher
/// dead-letters the delivery immediately.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The notification context does not match the formatter's declared
    /// context type.
    #[error("expected context of type {expected}: {reason}")]
    ContextMismatch {
        /// Declared context type name.
        expected: &'static str,
        /// Deserialization failure detail.
        reason: String,
    },

    /// The formatter could not render the notification.
    #[error("render failed: {0}")]
    Render(String),

    /// The rendered payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl FormatError {
    /// Whether this error comes from a context-type mismatch.
    pub fn is_context_mismatch(&self) -> bool {
        matches!(self, Self::ContextMismatch { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = FormatError::ContextMismatch {
            expected: "BuildContext",
            reason: "missing field `pipeline`".into(),
        };
        assert_eq!(
            err.to_string(),
            "expected context of type BuildContext: missing field `pipeline`"
        );
        assert!(err.is_context_mismatch());

        let err = FormatError::Render("template exploded".into());
        assert_eq!(err.to_string(), "render failed: template exploded");
        assert!(!err.is_context_mismatch());
    }
}
