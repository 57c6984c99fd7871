use crate::humanize::HumanDuration;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub stats: StatsConfig,
}

/// Exporter HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9394))
}

/// Kind of process being instrumented
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessRole {
    /// Executes jobs
    #[default]
    Server,
    /// Only submits jobs
    Client,
}

/// Whether failed-job counters carry an error-kind dimension.
///
/// Accepts `false`, `true` (dimension named `error`) or an explicit
/// dimension name.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum ErrorClassLabel {
    Toggle(bool),
    Named(String),
}

impl Default for ErrorClassLabel {
    fn default() -> Self {
        ErrorClassLabel::Toggle(false)
    }
}

impl ErrorClassLabel {
    pub const DEFAULT_NAME: &'static str = "error";

    /// Dimension name to use, if enabled
    pub fn label_name(&self) -> Option<&str> {
        match self {
            ErrorClassLabel::Toggle(false) => None,
            ErrorClassLabel::Toggle(true) => Some(Self::DEFAULT_NAME),
            ErrorClassLabel::Named(name) => match name.as_str() {
                // Environment overrides arrive as strings
                "false" | "" => None,
                "true" => Some(Self::DEFAULT_NAME),
                other => Some(other),
            },
        }
    }
}

/// Instrumentation toggles
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MetricsConfig {
    #[serde(default)]
    pub role: ProcessRole,
    /// Defaults to true for server processes
    pub declare_process_metrics: Option<bool>,
    /// Defaults to true for server processes
    pub collect_cluster_metrics: Option<bool>,
    /// Per-queue retry counts (enumerates the whole retry set)
    #[serde(default)]
    pub retries_segmented_by_queue: bool,
    #[serde(default)]
    pub label_error_class: ErrorClassLabel,
    /// Optional Prometheus namespace prefix
    pub namespace: Option<String>,
}

impl MetricsConfig {
    /// Resolve role-dependent defaults into concrete settings
    pub fn resolve(&self) -> Settings {
        let is_server = self.role == ProcessRole::Server;
        Settings {
            declare_process_metrics: self.declare_process_metrics.unwrap_or(is_server),
            collect_cluster_metrics: self.collect_cluster_metrics.unwrap_or(is_server),
            retries_segmented_by_queue: self.retries_segmented_by_queue,
            error_label: self.label_error_class.label_name().map(str::to_string),
        }
    }
}

/// Resolved toggles consulted by the hooks and the collector
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub declare_process_metrics: bool,
    pub collect_cluster_metrics: bool,
    pub retries_segmented_by_queue: bool,
    pub error_label: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        MetricsConfig::default().resolve()
    }
}

/// External stats backend configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StatsConfig {
    /// Base URL of the stats backend (e.g. "http://queue-admin:7433")
    pub endpoint: Option<String>,
    #[serde(default = "default_stats_timeout")]
    pub timeout: HumanDuration,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout: default_stats_timeout(),
        }
    }
}

fn default_stats_timeout() -> HumanDuration {
    HumanDuration::from_secs(5)
}
