use std::collections::BTreeMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use herald_core::{Notification, RoutingTarget};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a dead-letter entry.
///
/// `Pending -> Processing -> Resolved | Abandoned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeadLetterStatus {
    Pending,
    Processing,
    Resolved,
    Abandoned,
}

impl DeadLetterStatus {
    pub const ALL: [Self; 4] = [
        Self::Pending,
        Self::Processing,
        Self::Resolved,
        Self::Abandoned,
    ];
}

impl fmt::Display for DeadLetterStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Processing => write!(f, "PROCESSING"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Abandoned => write!(f, "ABANDONED"),
        }
    }
}

/// A delivery that could not be completed, kept for inspection and replay.
///
/// Only `status` and `updated_at` change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetterEntry {
    pub id: Uuid,
    /// Notification type identifier.
    pub type_id: String,
    pub category: String,
    /// The notification context, serialized as JSON.
    pub context: String,
    pub target: RoutingTarget,
    /// The formatted payload, when formatting got that far.
    pub payload: Option<serde_json::Value>,
    /// Why delivery failed.
    pub reason: String,
    pub status: DeadLetterStatus,
    /// Send attempts made before giving up.
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeadLetterEntry {
    /// A new `Pending` entry snapshotting `notification`.
    pub fn new(
        notification: &Notification,
        target: RoutingTarget,
        payload: Option<serde_json::Value>,
        reason: impl Into<String>,
        attempts: u32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            type_id: notification.type_id().to_owned(),
            category: notification.category().to_owned(),
            context: notification.context().to_string(),
            target,
            payload,
            reason: reason.into(),
            status: DeadLetterStatus::Pending,
            attempts,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Errors from dead-letter store operations.
#[derive(Debug, thiserror::Error)]
pub enum DeadLetterError {
    #[error("dead letter entry not found: {0}")]
    NotFound(Uuid),

    #[error("dead letter entry {id} is {current}, cannot move to {to}")]
    InvalidTransition {
        id: Uuid,
        current: DeadLetterStatus,
        to: DeadLetterStatus,
    },

    #[error("dead letter backend error: {0}")]
    Backend(String),
}

/// Storage for dead-letter entries.
///
/// Implementations must make [`transition`](Self::transition) an atomic
/// compare-and-set on the entry's status.
#[async_trait]
pub trait DeadLetterStore: Send + Sync {
    /// Persist a new entry, returning its id.
    async fn store(&self, entry: DeadLetterEntry) -> Result<Uuid, DeadLetterError>;

    async fn get(&self, id: Uuid) -> Result<Option<DeadLetterEntry>, DeadLetterError>;

    /// Move `id` to `to` if its current status is one of `from`; returns the
    /// updated entry.
    async fn transition(
        &self,
        id: Uuid,
        from: &[DeadLetterStatus],
        to: DeadLetterStatus,
    ) -> Result<DeadLetterEntry, DeadLetterError>;

    /// Entries with `status`, oldest first.
    async fn list_by_status(
        &self,
        status: DeadLetterStatus,
    ) -> Result<Vec<DeadLetterEntry>, DeadLetterError>;

    async fn count_by_status(&self, status: DeadLetterStatus) -> Result<usize, DeadLetterError>;

    /// Entry counts for every status, including zeroes.
    async fn counts(&self) -> Result<BTreeMap<DeadLetterStatus, usize>, DeadLetterError> {
        let mut counts = BTreeMap::new();
        for status in DeadLetterStatus::ALL {
            counts.insert(status, self.count_by_status(status).await?);
        }
        Ok(counts)
    }

    async fn len(&self) -> Result<usize, DeadLetterError>;

    async fn is_empty(&self) -> Result<bool, DeadLetterError> {
        Ok(self.len().await? == 0)
    }
}

/// Process-lifetime dead-letter store backed by a [`DashMap`].
///
/// Status changes happen under the entry's shard lock, so concurrent
/// transitions of the same entry are serialized and only one can win.
#[derive(Debug, Default)]
pub struct InMemoryDeadLetterStore {
    entries: DashMap<Uuid, DeadLetterEntry>,
}

impl InMemoryDeadLetterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeadLetterStore for InMemoryDeadLetterStore {
    async fn store(&self, entry: DeadLetterEntry) -> Result<Uuid, DeadLetterError> {
        let id = entry.id;
        self.entries.insert(id, entry);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Option<DeadLetterEntry>, DeadLetterError> {
        Ok(self.entries.get(&id).map(|e| e.value().clone()))
    }

    async fn transition(
        &self,
        id: Uuid,
        from: &[DeadLetterStatus],
        to: DeadLetterStatus,
    ) -> Result<DeadLetterEntry, DeadLetterError> {
        let mut entry = self
            .entries
            .get_mut(&id)
            .ok_or(DeadLetterError::NotFound(id))?;
        if !from.contains(&entry.status) {
            return Err(DeadLetterError::InvalidTransition {
                id,
                current: entry.status,
                to,
            });
        }
        entry.status = to;
        entry.updated_at = Utc::now();
        Ok(entry.clone())
    }

    async fn list_by_status(
        &self,
        status: DeadLetterStatus,
    ) -> Result<Vec<DeadLetterEntry>, DeadLetterError> {
        let mut entries: Vec<DeadLetterEntry> = self
            .entries
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|e| (e.created_at, e.id));
        Ok(entries)
    }

    async fn count_by_status(&self, status: DeadLetterStatus) -> Result<usize, DeadLetterError> {
        Ok(self.entries.iter().filter(|e| e.status == status).count())
    }

    async fn len(&self) -> Result<usize, DeadLetterError> {
        Ok(self.entries.len())
    }
}
