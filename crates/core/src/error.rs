use thiserror::Error;

/// A malformed domain value rejected at construction time.
///
/// Validation errors never reach the delivery pipeline: a notification or
/// type definition that fails validation is simply never built.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required identifier was empty or whitespace-only.
    #[error("{field} must not be blank")]
    Blank {
        /// Name of the offending field.
        field: &'static str,
    },

    /// A metadata entry was given a blank key.
    #[error("metadata keys must not be blank")]
    BlankMetadataKey,
}

/// Errors raised by the type, formatter, and sender registries.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// A notification type with this identifier is already registered.
    #[error("notification type already registered: {0}")]
    DuplicateType(String),

    /// No notification type is registered under this identifier.
    #[error("notification type not found: {0}")]
    TypeNotFound(String),

    /// A formatter for this (platform, type) pair is already registered.
    #[error("formatter already registered for {platform}/{type_id}")]
    DuplicateFormatter {
        /// Platform identifier.
        platform: String,
        /// Notification type identifier.
        type_id: String,
    },

    /// The platform already has a fallback formatter.
    #[error("fallback formatter already registered for platform {0}")]
    DuplicateFallback(String),

    /// A sender is already registered for this platform.
    #[error("sender already registered for platform {0}")]
    DuplicateSender(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ValidationError::Blank { field: "type_id" };
        assert_eq!(err.to_string(), "type_id must not be blank");

        let err = RegistryError::DuplicateFormatter {
            platform: "slack".into(),
            type_id: "build.failed".into(),
        };
        assert_eq!(
            err.to_string(),
            "formatter already registered for slack/build.failed"
        );

        let err = RegistryError::DuplicateFallback("discord".into());
        assert_eq!(
            err.to_string(),
            "fallback formatter already registered for platform discord"
        );
    }
}
