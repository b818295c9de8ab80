use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Configuration for a per-endpoint bulkhead.
#[derive(Debug, Clone)]
pub struct BulkheadConfig {
    /// Maximum concurrent calls to the endpoint.
    pub max_concurrent: usize,
    /// How long a caller may wait for a slot. Zero fails immediately.
    pub max_wait: Duration,
}

impl BulkheadConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent < 1 {
            return Err("max_concurrent must be >= 1".into());
        }
        Ok(())
    }
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            max_wait: Duration::ZERO,
        }
    }
}

/// Concurrency admission for one endpoint, backed by a
/// [`tokio::sync::Semaphore`]. The returned permit frees its slot on drop.
#[derive(Debug)]
pub struct Bulkhead {
    semaphore: Arc<Semaphore>,
    max_wait: Duration,
}

impl Bulkhead {
    pub fn new(config: &BulkheadConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            max_wait: config.max_wait,
        }
    }

    /// Take a slot, waiting up to `max_wait`. `None` means saturated.
    pub async fn acquire(&self) -> Option<OwnedSemaphorePermit> {
        if self.max_wait.is_zero() {
            return Arc::clone(&self.semaphore).try_acquire_owned().ok();
        }
        // Cancel-safe: dropping the wait never takes a slot.
        tokio::time::timeout(self.max_wait, Arc::clone(&self.semaphore).acquire_owned())
            .await
            .ok()
            .and_then(Result::ok)
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn saturates_without_wait() {
        let bulkhead = Bulkhead::new(&BulkheadConfig {
            max_concurrent: 2,
            max_wait: Duration::ZERO,
        });
        let a = bulkhead.acquire().await.expect("first slot");
        let _b = bulkhead.acquire().await.expect("second slot");
        assert!(bulkhead.acquire().await.is_none());

        drop(a);
        assert_eq!(bulkhead.available(), 1);
        assert!(bulkhead.acquire().await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn waits_up_to_max_wait() {
        let bulkhead = Arc::new(Bulkhead::new(&BulkheadConfig {
            max_concurrent: 1,
            max_wait: Duration::from_secs(1),
        }));
        let held = bulkhead.acquire().await.expect("slot");

        assert!(bulkhead.acquire().await.is_none(), "times out while held");

        let waiter = {
            let bulkhead = Arc::clone(&bulkhead);
            tokio::spawn(async move { bulkhead.acquire().await.is_some() })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(held);
        assert!(waiter.await.unwrap());
    }

    #[test]
    fn zero_concurrency_invalid() {
        let config = BulkheadConfig {
            max_concurrent: 0,
            max_wait: Duration::ZERO,
        };
        assert!(config.validate().is_err());
    }
}
