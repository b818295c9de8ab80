pub mod bulkhead;
pub mod circuit_breaker;
pub mod config;
pub mod dlq;
pub mod feedback;
pub mod gate;
pub mod metrics;
pub mod rate_limiter;
pub mod registry;
pub mod retry;

pub use bulkhead::{Bulkhead, BulkheadConfig};
pub use circuit_breaker::{CallPermit, CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use config::GateConfig;
pub use dlq::{
    DeadLetterEntry, DeadLetterError, DeadLetterStatus, DeadLetterStore, InMemoryDeadLetterStore,
};
pub use feedback::{AdaptiveRateLimitFeedback, DEFAULT_COOLDOWN};
pub use gate::{GateOutcome, Rejection, ResilienceGate};
pub use metrics::{MetricsSink, MetricsSnapshot, NoopMetrics, PipelineEvent, PipelineMetrics};
pub use rate_limiter::{EndpointRateLimiter, RateLimiterConfig};
pub use registry::ResilienceRegistry;
pub use retry::RetryStrategy;
