use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use herald_core::RegistryError;

use crate::sender::DynSender;

/// A registry that maps platform identifiers to their senders.
///
/// Senders are stored behind `Arc<dyn DynSender>` so they can be shared
/// across tasks. The registry is built once at startup and then shared as an
/// immutable reference or wrapped in an `Arc`.
pub struct SenderRegistry {
    senders: HashMap<String, Arc<dyn DynSender>>,
}

impl SenderRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            senders: HashMap::new(),
        }
    }

    /// Register a sender under its [`DynSender::platform`] identifier.
    ///
    /// Each platform has exactly one sender; registering a second one fails.
    pub fn register(&mut self, sender: Arc<dyn DynSender>) -> Result<(), RegistryError> {
        match self.senders.entry(sender.platform().to_owned()) {
            Entry::Occupied(slot) => Err(RegistryError::DuplicateSender(slot.key().clone())),
            Entry::Vacant(slot) => {
                slot.insert(sender);
                Ok(())
            }
        }
    }

    /// Look up the sender for a platform.
    pub fn get(&self, platform: &str) -> Option<Arc<dyn DynSender>> {
        self.senders.get(platform).cloned()
    }

    /// Return a sorted list of all registered platforms.
    pub fn list(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.senders.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Return the number of registered senders.
    pub fn len(&self) -> usize {
        self.senders.len()
    }

    /// Return `true` if no senders are registered.
    pub fn is_empty(&self) -> bool {
        self.senders.is_empty()
    }
}

impl Default for SenderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SenderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SenderRegistry")
            .field("platforms", &self.list())
            .finish()
    }
}
