use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use herald_core::RegistryError;
use tracing::debug;

use crate::formatter::DynFormatter;

/// Lookup key for a formatter: a platform plus an optional notification type.
///
/// A key without a type identifier is the platform's fallback entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FormatterKey {
    pub platform: String,
    pub type_id: Option<String>,
}

impl FormatterKey {
    /// Key for a type-specific formatter.
    pub fn specific(platform: impl Into<String>, type_id: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            type_id: Some(type_id.into()),
        }
    }

    /// Key for a platform-wide fallback formatter.
    pub fn fallback(platform: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            type_id: None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.type_id.is_none()
    }
}

impl fmt::Display for FormatterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.type_id {
            Some(type_id) => write!(f, "{}/{type_id}", self.platform),
            None => write!(f, "{}/*", self.platform),
        }
    }
}

/// Concurrent registry mapping (platform, type) to a formatter.
///
/// Resolution prefers the type-specific entry and falls back to the
/// platform-wide entry; a miss is reported as `None`, never as an error.
#[derive(Default)]
pub struct FormatterRegistry {
    formatters: DashMap<FormatterKey, Arc<dyn DynFormatter>>,
}

impl FormatterRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a formatter for one notification type on one platform.
    pub fn register(
        &self,
        platform: impl Into<String>,
        type_id: impl Into<String>,
        formatter: Arc<dyn DynFormatter>,
    ) -> Result<(), RegistryError> {
        self.insert(FormatterKey::specific(platform, type_id), formatter)
    }

    /// Register the platform-wide fallback formatter. At most one per platform.
    pub fn register_fallback(
        &self,
        platform: impl Into<String>,
        formatter: Arc<dyn DynFormatter>,
    ) -> Result<(), RegistryError> {
        self.insert(FormatterKey::fallback(platform), formatter)
    }

    /// Register under an explicit key.
    pub fn insert(
        &self,
        key: FormatterKey,
        formatter: Arc<dyn DynFormatter>,
    ) -> Result<(), RegistryError> {
        match self.formatters.entry(key) {
            Entry::Occupied(existing) => {
                let key = existing.key().clone();
                Err(match key.type_id {
                    Some(type_id) => RegistryError::DuplicateFormatter {
                        platform: key.platform,
                        type_id,
                    },
                    None => RegistryError::DuplicateFallback(key.platform),
                })
            }
            Entry::Vacant(slot) => {
                debug!(key = %slot.key(), "formatter registered");
                slot.insert(formatter);
                Ok(())
            }
        }
    }

    /// Resolve the formatter for `platform` and `type_id`.
    pub fn resolve(&self, platform: &str, type_id: &str) -> Option<Arc<dyn DynFormatter>> {
        self.formatters
            .get(&FormatterKey::specific(platform, type_id))
            .or_else(|| self.formatters.get(&FormatterKey::fallback(platform)))
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Whether the platform has a fallback formatter.
    pub fn has_fallback(&self, platform: &str) -> bool {
        self.formatters
            .contains_key(&FormatterKey::fallback(platform))
    }

    pub fn len(&self) -> usize {
        self.formatters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.formatters.is_empty()
    }
}

impl fmt::Debug for FormatterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<String> = self.formatters.iter().map(|e| e.key().to_string()).collect();
        keys.sort_unstable();
        f.debug_struct("FormatterRegistry")
            .field("keys", &keys)
            .finish()
    }
}
