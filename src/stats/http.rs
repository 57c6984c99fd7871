//! HTTP client for a JSON stats endpoint
//!
//! - `GET {endpoint}/stats` → [`ClusterStats`]
//! - `GET {endpoint}/retries` → `[RetryEntry]`

use super::{BackendError, ClusterStats, Result, RetryEntry, StatsBackend};
use crate::config::StatsConfig;
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

pub struct HttpStatsBackend {
    client: Client,
    endpoint: String,
}

impl HttpStatsBackend {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
            return Err(BackendError::InvalidEndpoint(endpoint.to_string()));
        }

        let client = Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(concat!("jobmeter/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BackendError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    /// Build a backend from configuration, `None` if no endpoint is set
    pub fn from_config(config: &StatsConfig) -> Result<Option<Self>> {
        config
            .endpoint
            .as_deref()
            .map(|endpoint| Self::new(endpoint, config.timeout.as_duration()))
            .transpose()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = format!("{}/{}", self.endpoint, path);
        debug!(url, "Fetching stats");

        let response = self.client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(BackendError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| {
            if e.is_timeout() {
                BackendError::Timeout
            } else {
                BackendError::RequestFailed(format!("Failed to read body: {}", e))
            }
        })?;

        Ok(serde_json::from_slice(&body)?)
    }
}

#[async_trait]
impl StatsBackend for HttpStatsBackend {
    async fn snapshot(&self) -> Result<ClusterStats> {
        self.get_json("stats").await
    }

    async fn retry_set(&self) -> Result<Vec<RetryEntry>> {
        self.get_json("retries").await
    }
}
