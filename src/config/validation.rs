use super::models::Config;
use crate::labels::{self, is_valid_label_name};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid stats endpoint scheme '{scheme}', expected 'http://' or 'https://'")]
    InvalidStatsScheme { scheme: String },

    #[error("Stats timeout must be positive")]
    ZeroStatsTimeout,

    #[error("Invalid error label name '{name}'")]
    InvalidErrorLabel { name: String },

    #[error("Error label '{name}' collides with a built-in dimension")]
    ReservedErrorLabel { name: String },

    #[error("Invalid metric namespace '{namespace}'")]
    InvalidNamespace { namespace: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_stats(config)?;
    validate_error_label(config)?;
    validate_namespace(config)?;
    Ok(())
}

fn validate_stats(config: &Config) -> Result<(), ValidationError> {
    if let Some(endpoint) = &config.stats.endpoint {
        let scheme = endpoint.split("://").next().unwrap_or_default();
        if !endpoint.contains("://") || !matches!(scheme, "http" | "https") {
            return Err(ValidationError::InvalidStatsScheme {
                scheme: scheme.to_string(),
            });
        }
    }

    if config.stats.timeout.is_zero() {
        return Err(ValidationError::ZeroStatsTimeout);
    }

    Ok(())
}

/// The error dimension must be a legal label name and must not shadow the
/// (queue, worker) dimensions of the failed counter
fn validate_error_label(config: &Config) -> Result<(), ValidationError> {
    let Some(name) = config.metrics.label_error_class.label_name() else {
        return Ok(());
    };

    if !is_valid_label_name(name) {
        return Err(ValidationError::InvalidErrorLabel {
            name: name.to_string(),
        });
    }

    if name == labels::QUEUE || name == labels::WORKER {
        return Err(ValidationError::ReservedErrorLabel {
            name: name.to_string(),
        });
    }

    Ok(())
}

fn validate_namespace(config: &Config) -> Result<(), ValidationError> {
    if let Some(namespace) = &config.metrics.namespace {
        if !is_valid_label_name(namespace) {
            return Err(ValidationError::InvalidNamespace {
                namespace: namespace.clone(),
            });
        }
    }
    Ok(())
}
