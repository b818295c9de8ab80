mod dead_letter;
mod pool;
mod resilience;


pub use dead_letter::*;
pub use pool::*;
pub use resilience::*;

use std::path::Path;

use serde::Deserialize;

use crate::error::GatewayError;
use crate::routing::StaticRoutingTable;

/// Top-level Herald configuration, loaded from a TOML file.
///
/// Every section is optional and falls back to its defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HeraldConfig {
    /// Execution pool used by `publish`.
    #[serde(default)]
    pub pool: PoolConfig,
    /// Batch publishing defaults.
    #[serde(default)]
    pub batch: BatchConfig,
    /// Per-endpoint resilience settings.
    #[serde(default)]
    pub resilience: ResilienceConfig,
    /// Provider rate-limit feedback.
    #[serde(default)]
    pub adaptive: AdaptiveConfig,
    /// Dead-letter reprocessing policy.
    #[serde(default)]
    pub dead_letter: DeadLetterConfig,
    /// Routing tiers and endpoint URLs.
    #[serde(default)]
    pub routing: StaticRoutingTable,
}

impl HeraldConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, GatewayError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse, and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, GatewayError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Check every section, reporting the first invalid value.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let section = |name: &str, result: Result<(), String>| {
            result.map_err(|e| GatewayError::Configuration(format!("{name}: {e}")))
        };
        section("pool", self.pool.validate())?;
        section("batch", self.batch.validate())?;
        section("resilience", self.resilience.validate())?;
        section("adaptive", self.adaptive.validate())?;
        Ok(())
    }
}
