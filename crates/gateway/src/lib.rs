pub mod builder;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gateway;
pub mod health;
pub mod pool;
pub mod publisher;
pub mod reprocess;
pub mod routing;

pub use builder::GatewayBuilder;
pub use config::HeraldConfig;
pub use dispatcher::{DeliveryReport, Dispatcher};
pub use error::GatewayError;
pub use gateway::Gateway;
pub use health::{HealthReport, HealthStatus};
pub use herald_executor::{
    CircuitState, DeadLetterEntry, DeadLetterStatus, DeadLetterStore, InMemoryDeadLetterStore,
};
pub use pool::{ExecutionPool, Job, PoolError, SubmitOutcome};
pub use publisher::{BatchOptions, BatchResult, Publisher};
pub use reprocess::{DeadLetterReprocessor, ReprocessError, ReprocessOutcome, ReprocessSummary};
pub use routing::{RouteMapping, RoutingResolver, RoutingSource, StaticRoutingTable};
pub use tokio_util::sync::CancellationToken;
