//! # Configuration Loader
//!
//! Layers configuration sources in increasing precedence:
//!
//! 1. built-in defaults
//! 2. the YAML file named by `MLFORGE_CONFIG_PATH`, when set
//! 3. environment variables prefixed `MLFORGE_`, with `__` separating
//!    nested keys (e.g. `MLFORGE_DATABASE__URL`)

use config::{Config, Environment, File};
use std::env;

use super::CoreConfig;
use crate::error::{PipelineError, Result};

/// Environment variable naming the optional config file.
pub const CONFIG_PATH_VAR: &str = "MLFORGE_CONFIG_PATH";

/// Loaded configuration plus the environment it was resolved in.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: CoreConfig,
    environment: String,
}

impl ConfigManager {
    /// Load configuration for the auto-detected environment.
    pub fn load() -> Result<Self> {
        let environment = detect_environment();

        let mut builder = Config::builder().add_source(
            Config::try_from(&CoreConfig::default())
                .map_err(|e| PipelineError::configuration(e.to_string()))?,
        );

        if let Ok(path) = env::var(CONFIG_PATH_VAR) {
            builder = builder.add_source(File::with_name(&path));
        }

        let config: CoreConfig = builder
            .add_source(Environment::with_prefix("MLFORGE").separator("__"))
            .build()
            .map_err(|e| PipelineError::configuration(e.to_string()))?
            .try_deserialize()
            .map_err(|e| PipelineError::configuration(e.to_string()))?;

        Ok(Self {
            config,
            environment,
        })
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }
}

fn detect_environment() -> String {
    env::var("MLFORGE_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_load_without_file() {
        // No config file, no overrides: defaults come through.
        let manager = ConfigManager::load().unwrap();
        let config = manager.config();
        assert!(config.database.pool > 0);
        assert!(config.broker.max_delivery_attempts > 0);
        assert!(config.watchdog.stage_deadline_seconds > 0);
    }
}
