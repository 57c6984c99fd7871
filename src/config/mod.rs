//! Configuration management for jobmeter
//!
//! This module provides a layered configuration system that loads settings from:
//! 1. Default values (embedded in structs)
//! 2. TOML configuration file
//! 3. Environment variables (highest priority)
//!
//! # Usage
//!
//! ```no_run
//! use jobmeter::config::Config;
//!
//! let config = Config::load().expect("Failed to load configuration");
//! println!("Exporter listening on: {}", config.server.bind_addr);
//! ```
//!
//! # Environment Variables
//!
//! Configuration can be overridden using environment variables with the pattern:
//! `JOBMETER__<section>__<key>`
//!
//! Examples:
//! - `JOBMETER__SERVER__BIND_ADDR=0.0.0.0:9400`
//! - `JOBMETER__METRICS__ROLE=client`
//! - `JOBMETER__METRICS__COLLECT_CLUSTER_METRICS=true`
//! - `JOBMETER__STATS__TIMEOUT=2s`
//!
//! # Configuration File
//!
//! By default, the configuration is loaded from `config/jobmeter.toml`.
//! This can be overridden using the `JOBMETER_CONFIG` environment variable.

mod models;
mod sources;
mod validation;

pub use crate::humanize::HumanDuration;
pub use models::{
    Config, ErrorClassLabel, MetricsConfig, ProcessRole, ServerConfig, Settings, StatsConfig,
};
pub use validation::ValidationError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Configuration validation failed: {0}")]
    ValidationError(#[from] ValidationError),
}

impl Config {
    /// Load configuration from all sources (file + environment)
    ///
    /// Configuration is loaded with the following priority (highest to lowest):
    /// 1. Environment variables (`JOBMETER__*`)
    /// 2. TOML file (default: `config/jobmeter.toml`)
    /// 3. Default values
    pub fn load() -> Result<Self, ConfigError> {
        let config = sources::load()?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: std::path::PathBuf) -> Result<Self, ConfigError> {
        let config = sources::load_from_sources(path)?;
        validation::validate(&config)?;
        Ok(config)
    }

    /// Resolved instrumentation toggles
    pub fn settings(&self) -> Settings {
        self.metrics.resolve()
    }
}
