//! # Configuration
//!
//! Typed configuration for the orchestration core, layered by the
//! loader: built-in defaults, then an optional YAML file, then
//! environment overrides. No hidden fallbacks: everything the runtime
//! reads is visible in one structure.

pub mod loader;

use serde::{Deserialize, Serialize};

pub use loader::ConfigManager;

use crate::messaging::PgmqGatewayConfig;
use crate::orchestration::WatchdogConfig;

/// Root configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    pub database: DatabaseConfig,
    pub broker: PgmqGatewayConfig,
    pub watchdog: WatchdogConfig,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            broker: PgmqGatewayConfig::default(),
            watchdog: WatchdogConfig::default(),
        }
    }
}

/// Database connection and pooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgresql://localhost/mlforge_development".to_string(),
            pool: 10,
        }
    }
}
