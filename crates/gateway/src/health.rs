use std::collections::BTreeMap;
use std::fmt;

use herald_executor::{CircuitState, DeadLetterStatus};
use serde::Serialize;

/// Overall gateway health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Up,
    /// At least one endpoint circuit is open.
    Degraded,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Degraded => write!(f, "DEGRADED"),
        }
    }
}

/// Point-in-time health: circuit state per resource key and dead-letter
/// counts per status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub circuits: BTreeMap<String, CircuitState>,
    pub dead_letters: BTreeMap<DeadLetterStatus, usize>,
}

impl HealthReport {
    pub fn new(
        circuits: BTreeMap<String, CircuitState>,
        dead_letters: BTreeMap<DeadLetterStatus, usize>,
    ) -> Self {
        let status = if circuits.values().any(|s| *s == CircuitState::Open) {
            HealthStatus::Degraded
        } else {
            HealthStatus::Up
        };
        Self {
            status,
            circuits,
            dead_letters,
        }
    }

    /// Resource keys whose circuit is open.
    pub fn open_circuits(&self) -> Vec<&str> {
        self.circuits
            .iter()
            .filter(|(_, state)| **state == CircuitState::Open)
            .map(|(resource, _)| resource.as_str())
            .collect()
    }
}
