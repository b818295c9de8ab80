use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RegistryError, ValidationError};

/// Static metadata describing one kind of notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTypeDefinition {
    id: String,
    title: String,
    default_message: String,
    category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    schema_version: Option<String>,
}

impl NotificationTypeDefinition {
    /// Create a validated type definition. `id`, `title`, and `category` must
    /// not be blank; the default message may be empty.
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        default_message: impl Into<String>,
        category: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let def = Self {
            id: id.into(),
            title: title.into(),
            default_message: default_message.into(),
            category: category.into(),
            schema_version: None,
        };
        if def.id.trim().is_empty() {
            return Err(ValidationError::Blank { field: "id" });
        }
        if def.title.trim().is_empty() {
            return Err(ValidationError::Blank { field: "title" });
        }
        if def.category.trim().is_empty() {
            return Err(ValidationError::Blank { field: "category" });
        }
        Ok(def)
    }

    /// Attach a schema version.
    #[must_use]
    pub fn with_schema_version(mut self, version: impl Into<String>) -> Self {
        self.schema_version = Some(version.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn default_message(&self) -> &str {
        &self.default_message
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn schema_version(&self) -> Option<&str> {
        self.schema_version.as_deref()
    }
}

/// Concurrent registry of notification type definitions.
///
/// Each identifier may be registered once; lookups never block registration
/// of other identifiers.
#[derive(Debug, Default)]
pub struct NotificationTypeRegistry {
    types: DashMap<String, Arc<NotificationTypeDefinition>>,
}

impl NotificationTypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition. Fails if the identifier is already taken.
    pub fn register(&self, definition: NotificationTypeDefinition) -> Result<(), RegistryError> {
        match self.types.entry(definition.id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::DuplicateType(definition.id)),
            Entry::Vacant(slot) => {
                debug!(type_id = %definition.id, "notification type registered");
                slot.insert(Arc::new(definition));
                Ok(())
            }
        }
    }

    /// Look up a definition by identifier.
    pub fn get(&self, id: &str) -> Result<Arc<NotificationTypeDefinition>, RegistryError> {
        self.types
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| RegistryError::TypeNotFound(id.to_owned()))
    }

    /// Whether a definition exists for `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.types.contains_key(id)
    }

    /// Sorted list of registered identifiers.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.types.iter().map(|e| e.key().clone()).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(id: &str) -> NotificationTypeDefinition {
        NotificationTypeDefinition::new(id, "Build failed", "A build failed", "ci").unwrap()
    }

    #[test]
    fn register_and_get() {
        let reg = NotificationTypeRegistry::new();
        reg.register(def("build.failed").with_schema_version("2"))
            .unwrap();

        let found = reg.get("build.failed").unwrap();
        assert_eq!(found.title(), "Build failed");
        assert_eq!(found.category(), "ci");
        assert_eq!(found.schema_version(), Some("2"));
        assert!(reg.contains("build.failed"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn duplicate_rejected() {
        let reg = NotificationTypeRegistry::new();
        reg.register(def("build.failed")).unwrap();
        let err = reg.register(def("build.failed")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateType("build.failed".into()));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn missing_lookup_is_not_found() {
        let reg = NotificationTypeRegistry::new();
        assert_eq!(
            reg.get("nope").unwrap_err(),
            RegistryError::TypeNotFound("nope".into())
        );
    }

    #[test]
    fn blank_fields_rejected() {
        assert!(NotificationTypeDefinition::new("", "t", "m", "c").is_err());
        assert!(NotificationTypeDefinition::new("id", " ", "m", "c").is_err());
        assert!(NotificationTypeDefinition::new("id", "t", "m", "").is_err());
        assert!(NotificationTypeDefinition::new("id", "t", "", "c").is_ok());
    }

    #[test]
    fn ids_sorted() {
        let reg = NotificationTypeRegistry::new();
        reg.register(def("z.type")).unwrap();
        reg.register(def("a.type")).unwrap();
        assert_eq!(reg.ids(), vec!["a.type".to_owned(), "z.type".to_owned()]);
    }

    #[test]
    fn concurrent_registration_admits_one_winner() {
        let reg = Arc::new(NotificationTypeRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.register(def("race")).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }
}
