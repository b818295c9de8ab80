use thiserror::Error;

use crate::pool::PoolError;
use crate::publisher::BatchResult;
use crate::reprocess::ReprocessError;

/// Errors that can occur while building or driving the gateway.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The gateway was misconfigured (invalid values, missing runtime).
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The configuration file could not be parsed.
    #[error("configuration parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The configuration file could not be read.
    #[error("configuration read error: {0}")]
    Io(#[from] std::io::Error),

    /// A type, formatter, or sender was registered twice.
    #[error("registry error: {0}")]
    Registry(#[from] herald_core::RegistryError),

    /// A batch request was rejected before any submission.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),

    /// The execution pool refused the work.
    #[error("pool error: {0}")]
    Pool(#[from] PoolError),

    /// The pool stopped accepting work partway through a batch.
    #[error(
        "batch interrupted after {} of {} notifications: {source}",
        .partial.published,
        .partial.total
    )]
    BatchInterrupted {
        partial: BatchResult,
        source: PoolError,
    },

    /// A dead-letter reprocessing request was rejected.
    #[error("reprocess error: {0}")]
    Reprocess(#[from] ReprocessError),

    /// The dead-letter store failed.
    #[error("dead letter error: {0}")]
    DeadLetter(#[from] herald_executor::DeadLetterError),
}
