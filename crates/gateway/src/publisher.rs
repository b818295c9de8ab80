use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use herald_core::Notification;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::BatchConfig;
use crate::dispatcher::Dispatcher;
use crate::error::GatewayError;
use crate::pool::{ExecutionPool, PoolError, SubmitOutcome};

/// Chunking options for [`Publisher::publish_all`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    pub chunk_size: usize,
    /// Pause between consecutive chunks; zero disables it.
    pub inter_chunk_delay: Duration,
}

impl BatchOptions {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            inter_chunk_delay: Duration::ZERO,
        }
    }

    #[must_use]
    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self::from(&BatchConfig::default())
    }
}

impl From<&BatchConfig> for BatchOptions {
    fn from(config: &BatchConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            inter_chunk_delay: Duration::from_millis(config.inter_chunk_delay_ms),
        }
    }
}

/// What a batch publish got through before finishing or being cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    /// Notifications handed to the pool.
    pub published: usize,
    pub chunks_completed: usize,
    /// Notifications in the request.
    pub total: usize,
    pub cancelled: bool,
}

/// Submits notifications to the execution pool for dispatch.
///
/// Publishing is fire-and-forget: delivery failures surface as dead-letter
/// entries and metrics, never as errors here.
#[derive(Debug, Clone)]
pub struct Publisher {
    pool: Arc<ExecutionPool>,
    dispatcher: Arc<Dispatcher>,
}

impl Publisher {
    pub fn new(pool: Arc<ExecutionPool>, dispatcher: Arc<Dispatcher>) -> Self {
        Self { pool, dispatcher }
    }

    /// Queue one notification for dispatch.
    pub async fn publish(&self, notification: Notification) -> Result<SubmitOutcome, GatewayError> {
        Ok(self.submit(notification).await?)
    }

    async fn submit(&self, notification: Notification) -> Result<SubmitOutcome, PoolError> {
        let dispatcher = Arc::clone(&self.dispatcher);
        let job = async move {
            dispatcher.dispatch(&notification).await;
        }
        .boxed();
        self.pool.submit(job).await
    }

    /// Publish `notifications` in order, in fixed-size chunks.
    ///
    /// Cancellation is observed before each chunk and during the
    /// inter-chunk wait; a cancelled batch returns the partial result.
    /// If the pool stops accepting work partway through, the error is
    /// [`GatewayError::BatchInterrupted`] and carries the partial result.
    #[instrument(skip_all, fields(total = notifications.len(), chunk_size = options.chunk_size))]
    pub async fn publish_all(
        &self,
        notifications: Vec<Notification>,
        options: BatchOptions,
        cancel: &CancellationToken,
    ) -> Result<BatchResult, GatewayError> {
        if options.chunk_size == 0 {
            return Err(GatewayError::InvalidBatch(
                "chunk_size must be >= 1".to_owned(),
            ));
        }

        let mut result = BatchResult {
            total: notifications.len(),
            ..BatchResult::default()
        };
        let mut remaining = notifications.into_iter().peekable();

        while remaining.peek().is_some() {
            if result.chunks_completed > 0 && !options.inter_chunk_delay.is_zero() {
                tokio::select! {
                    () = cancel.cancelled() => {
                        result.cancelled = true;
                        break;
                    }
                    () = tokio::time::sleep(options.inter_chunk_delay) => {}
                }
            }
            if cancel.is_cancelled() {
                result.cancelled = true;
                break;
            }

            for notification in remaining.by_ref().take(options.chunk_size) {
                if let Err(source) = self.submit(notification).await {
                    warn!(
                        published = result.published,
                        chunks = result.chunks_completed,
                        error = %source,
                        "batch publish interrupted"
                    );
                    return Err(GatewayError::BatchInterrupted {
                        partial: result,
                        source,
                    });
                }
                result.published += 1;
            }
            result.chunks_completed += 1;
            debug!(
                chunk = result.chunks_completed,
                published = result.published,
                "chunk submitted"
            );
        }

        info!(
            published = result.published,
            chunks = result.chunks_completed,
            cancelled = result.cancelled,
            "batch publish finished"
        );
        Ok(result)
    }
}
