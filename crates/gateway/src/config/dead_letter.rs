use serde::Deserialize;

/// Dead-letter reprocessing policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeadLetterConfig {
    /// Permit `ABANDONED -> PROCESSING` so abandoned entries can be retried.
    #[serde(default)]
    pub allow_reprocess_abandoned: bool,
}
