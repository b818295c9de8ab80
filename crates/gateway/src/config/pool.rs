use std::time::Duration;

use serde::Deserialize;

/// How the execution pool runs submitted dispatches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolMode {
    /// Fixed worker set with a bounded queue and caller-runs overflow.
    #[default]
    Bounded,
    /// One task per submission.
    Unbounded,
}

/// Execution pool configuration.
///
/// # Example
///
/// ```toml
/// [pool]
/// mode = "bounded"
/// core_workers = 4
/// max_workers = 16
/// queue_capacity = 1000
/// worker_name_prefix = "herald-"
/// keep_alive_seconds = 60
/// shutdown_timeout_seconds = 30
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub mode: PoolMode,
    /// Workers started up front and kept for the pool's lifetime.
    #[serde(default = "default_core_workers")]
    pub core_workers: usize,
    /// Upper bound on workers once the queue is full.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Prefix of each worker's tracing span name.
    #[serde(default = "default_worker_name_prefix")]
    pub worker_name_prefix: String,
    /// Idle time after which a worker above `core_workers` exits.
    #[serde(default = "default_keep_alive")]
    pub keep_alive_seconds: u64,
    /// How long `shutdown` waits for in-flight work.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_seconds: u64,
}

impl PoolConfig {
    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_seconds)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_seconds)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.mode == PoolMode::Unbounded {
            return Ok(());
        }
        if self.core_workers < 1 {
            return Err("core_workers must be >= 1".into());
        }
        if self.core_workers > self.max_workers {
            return Err("core_workers must not exceed max_workers".into());
        }
        if self.queue_capacity < 1 {
            return Err("queue_capacity must be >= 1".into());
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            mode: PoolMode::default(),
            core_workers: default_core_workers(),
            max_workers: default_max_workers(),
            queue_capacity: default_queue_capacity(),
            worker_name_prefix: default_worker_name_prefix(),
            keep_alive_seconds: default_keep_alive(),
            shutdown_timeout_seconds: default_shutdown_timeout(),
        }
    }
}

fn default_core_workers() -> usize {
    4
}

fn default_max_workers() -> usize {
    16
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_worker_name_prefix() -> String {
    "herald-".to_owned()
}

fn default_keep_alive() -> u64 {
    60
}

fn default_shutdown_timeout() -> u64 {
    30
}

/// Defaults for [`Gateway::publish_all`](crate::Gateway::publish_all).
#[derive(Debug, Clone, Deserialize)]
pub struct BatchConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Pause between chunks; zero disables it.
    #[serde(default)]
    pub inter_chunk_delay_ms: u64,
}

impl BatchConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size < 1 {
            return Err("chunk_size must be >= 1".into());
        }
        Ok(())
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            inter_chunk_delay_ms: 0,
        }
    }
}

fn default_chunk_size() -> usize {
    100
}
