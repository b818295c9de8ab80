use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// An immutable notification event flowing through the delivery pipeline.
///
/// Notifications are built once through [`NotificationBuilder`], which
/// validates every field, and are never mutated afterwards. All fields are
/// private; read them through the accessor methods. Deserialization goes
/// through the same validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawNotification")]
pub struct Notification {
    type_id: String,
    category: String,
    occurred_at: DateTime<Utc>,
    context: serde_json::Value,
    metadata: BTreeMap<String, String>,
}

impl Notification {
    /// Start building a notification of the given type and category.
    ///
    /// # Examples
    ///
    /// ```
    /// use herald_core::Notification;
    ///
    /// let notification = Notification::builder("build.failed", "ci")
    ///     .context(serde_json::json!({"pipeline": "main"}))
    ///     .metadata("team", "platform")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(notification.type_id(), "build.failed");
    /// ```
    pub fn builder(
        type_id: impl Into<String>,
        category: impl Into<String>,
    ) -> NotificationBuilder {
        NotificationBuilder {
            type_id: type_id.into(),
            category: category.into(),
            occurred_at: None,
            context: serde_json::Value::Null,
            metadata: BTreeMap::new(),
        }
    }

    /// Notification type identifier.
    pub fn type_id(&self) -> &str {
        &self.type_id
    }

    /// Notification category, used as the second routing tier.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// When the underlying event happened.
    pub fn occurred_at(&self) -> DateTime<Utc> {
        self.occurred_at
    }

    /// Producer-supplied context payload handed to formatters.
    pub fn context(&self) -> &serde_json::Value {
        &self.context
    }

    /// Immutable key-value metadata.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }
}

/// Validating builder for [`Notification`].
#[derive(Debug, Clone)]
pub struct NotificationBuilder {
    type_id: String,
    category: String,
    occurred_at: Option<DateTime<Utc>>,
    context: serde_json::Value,
    metadata: BTreeMap<String, String>,
}

impl NotificationBuilder {
    /// Override the occurrence timestamp. Defaults to the build time.
    #[must_use]
    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    /// Set the context payload.
    #[must_use]
    pub fn context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    /// Serialize a typed value into the context payload.
    pub fn context_from<T: Serialize>(mut self, context: &T) -> Result<Self, serde_json::Error> {
        self.context = serde_json::to_value(context)?;
        Ok(self)
    }

    /// Add a metadata entry. Later entries with the same key win.
    #[must_use]
    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Validate and build the notification.
    pub fn build(self) -> Result<Notification, ValidationError> {
        if self.type_id.trim().is_empty() {
            return Err(ValidationError::Blank { field: "type_id" });
        }
        if self.category.trim().is_empty() {
            return Err(ValidationError::Blank { field: "category" });
        }
        if self.metadata.keys().any(|k| k.trim().is_empty()) {
            return Err(ValidationError::BlankMetadataKey);
        }

        Ok(Notification {
            type_id: self.type_id,
            category: self.category,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            context: self.context,
            metadata: self.metadata,
        })
    }
}

/// Wire shape of a [`Notification`] before validation.
#[derive(Deserialize)]
struct RawNotification {
    type_id: String,
    category: String,
    #[serde(default)]
    occurred_at: Option<DateTime<Utc>>,
    #[serde(default)]
    context: serde_json::Value,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

impl TryFrom<RawNotification> for Notification {
    type Error = ValidationError;

    fn try_from(raw: RawNotification) -> Result<Self, Self::Error> {
        NotificationBuilder {
            type_id: raw.type_id,
            category: raw.category,
            occurred_at: raw.occurred_at,
            context: raw.context,
            metadata: raw.metadata,
        }
        .build()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn build_with_defaults() {
        let before = Utc::now();
        let n = Notification::builder("deploy.finished", "cd").build().unwrap();
        assert_eq!(n.type_id(), "deploy.finished");
        assert_eq!(n.category(), "cd");
        assert!(n.occurred_at() >= before);
        assert!(n.context().is_null());
        assert!(n.metadata().is_empty());
    }

    #[test]
    fn blank_type_rejected() {
        let err = Notification::builder("  ", "cd").build().unwrap_err();
        assert_eq!(err, ValidationError::Blank { field: "type_id" });
    }

    #[test]
    fn blank_category_rejected() {
        let err = Notification::builder("deploy.finished", "")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::Blank { field: "category" });
    }

    #[test]
    fn blank_metadata_key_rejected() {
        let err = Notification::builder("deploy.finished", "cd")
            .metadata(" ", "x")
            .build()
            .unwrap_err();
        assert_eq!(err, ValidationError::BlankMetadataKey);
    }

    #[test]
    fn explicit_timestamp_and_metadata() {
        let at = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let n = Notification::builder("deploy.finished", "cd")
            .occurred_at(at)
            .metadata("env", "prod")
            .metadata("env", "staging")
            .build()
            .unwrap();
        assert_eq!(n.occurred_at(), at);
        assert_eq!(n.metadata().get("env").map(String::as_str), Some("staging"));
    }

    #[test]
    fn deserialize_round_trips_valid_notification() {
        let n = Notification::builder("deploy.finished", "cd")
            .context(serde_json::json!({"service": "api"}))
            .metadata("env", "prod")
            .build()
            .unwrap();
        let json = serde_json::to_string(&n).unwrap();
        let back: Notification = serde_json::from_str(&json).unwrap();
        assert_eq!(back, n);
    }

    #[test]
    fn deserialize_rejects_blank_fields() {
        let err = serde_json::from_str::<Notification>(r#"{"type_id": " ", "category": "cd"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("type_id must not be blank"));

        let err = serde_json::from_str::<Notification>(
            r#"{"type_id": "deploy.finished", "category": "cd", "metadata": {"": "x"}}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("metadata keys must not be blank"));
    }

    #[test]
    fn deserialize_defaults_missing_optional_fields() {
        let before = Utc::now();
        let n: Notification =
            serde_json::from_str(r#"{"type_id": "deploy.finished", "category": "cd"}"#).unwrap();
        assert!(n.occurred_at() >= before);
        assert!(n.context().is_null());
        assert!(n.metadata().is_empty());
    }

    #[test]
    fn typed_context() {
        #[derive(Serialize)]
        struct Deploy {
            service: &'static str,
            version: u32,
        }

        let n = Notification::builder("deploy.finished", "cd")
            .context_from(&Deploy {
                service: "api",
                version: 7,
            })
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(n.context()["service"], "api");
        assert_eq!(n.context()["version"], 7);
    }
}
