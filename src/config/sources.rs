use super::models::Config;
use config::{ConfigError, Environment, File};
use std::env;
use std::path::PathBuf;

const CONFIG_ENV_VAR: &str = "JOBMETER_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config/jobmeter.toml";
const ENV_PREFIX: &str = "JOBMETER";
const ENV_SEPARATOR: &str = "__";

/// Path of the configuration file: `JOBMETER_CONFIG` or the default location
pub fn config_path() -> PathBuf {
    env::var(CONFIG_ENV_VAR)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Load configuration from multiple sources with priority:
/// 1. Defaults (embedded in structs)
/// 2. TOML file (if exists)
/// 3. Environment variables from .env file (via dotenvy)
/// 4. System environment variables (highest priority)
pub fn load() -> Result<Config, ConfigError> {
    // Missing .env is fine
    let _ = dotenvy::dotenv();

    load_from_sources(config_path())
}

/// Load configuration from a specific path and environment
pub fn load_from_sources(config_path: PathBuf) -> Result<Config, ConfigError> {
    let mut builder = config::Config::builder();

    if config_path.exists() {
        tracing::info!("Loading configuration from: {}", config_path.display());
        builder = builder.add_source(File::from(config_path).required(false));
    } else {
        tracing::warn!(
            "Configuration file not found at {}, using defaults and environment overrides",
            config_path.display()
        );
    }

    // JOBMETER__METRICS__ROLE -> metrics.role
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .separator(ENV_SEPARATOR)
            .try_parsing(true),
    );

    let config = builder.build()?;
    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ErrorClassLabel, ProcessRole};
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_load_defaults_only() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("nonexistent.toml");

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:9394");
        assert_eq!(config.metrics.role, ProcessRole::Server);
    }

    #[test]
    fn test_load_from_toml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        let toml_content = r#"
[server]
bind_addr = "127.0.0.1:9400"

[metrics]
role = "client"
collect_cluster_metrics = true
retries_segmented_by_queue = true
label_error_class = "error_class"
namespace = "sidekiq"

[stats]
endpoint = "http://queue-admin:7433"
timeout = "750ms"
        "#;

        fs::write(&config_path, toml_content).unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.server.bind_addr.to_string(), "127.0.0.1:9400");
        assert_eq!(config.metrics.role, ProcessRole::Client);
        assert_eq!(config.metrics.collect_cluster_metrics, Some(true));
        assert_eq!(config.metrics.declare_process_metrics, None);
        assert!(config.metrics.retries_segmented_by_queue);
        assert_eq!(
            config.metrics.label_error_class,
            ErrorClassLabel::Named("error_class".to_string())
        );
        assert_eq!(config.metrics.namespace.as_deref(), Some("sidekiq"));
        assert_eq!(config.stats.endpoint.as_deref(), Some("http://queue-admin:7433"));
        assert_eq!(config.stats.timeout.as_duration(), Duration::from_millis(750));
    }

    #[test]
    fn test_boolean_error_label() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.toml");

        fs::write(&config_path, "[metrics]\nlabel_error_class = true\n").unwrap();

        let config = load_from_sources(config_path).unwrap();
        assert_eq!(config.metrics.resolve().error_label.as_deref(), Some("error"));
    }
}
