//! External stats backend
//!
//! Cluster-wide queue statistics (queue depths, retry/dead/scheduled set
//! sizes, process counts) come from the queue backend, not from this process.
//! The collector only reads them through [`StatsBackend`].

mod http;

pub use http::HttpStatsBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Stats request failed: {0}")]
    RequestFailed(String),

    #[error("Stats request timed out")]
    Timeout,

    #[error("Stats backend returned HTTP {0}")]
    Status(u16),

    #[error("Invalid stats payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid stats endpoint: {0}")]
    InvalidEndpoint(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Point-in-time statistics for the whole queue installation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterStats {
    /// Queue name → number of waiting jobs
    #[serde(default)]
    pub queues: BTreeMap<String, u64>,
    /// Queue name → seconds since the oldest waiting job was enqueued
    #[serde(default)]
    pub queue_latencies: BTreeMap<String, f64>,
    #[serde(default)]
    pub scheduled_size: u64,
    #[serde(default)]
    pub retry_size: u64,
    #[serde(default)]
    pub dead_size: u64,
    /// Busy workers across all processes
    #[serde(default)]
    pub workers_size: u64,
    #[serde(default)]
    pub processes_size: u64,
}

/// One job waiting in the retry set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryEntry {
    #[serde(default)]
    pub jid: String,
    pub queue: String,
}

/// Read-only access to cluster statistics
#[async_trait]
pub trait StatsBackend: Send + Sync {
    async fn snapshot(&self) -> Result<ClusterStats>;

    /// Enumerate the full retry set. Expensive when the set is large.
    async fn retry_set(&self) -> Result<Vec<RetryEntry>>;
}

/// Count retry entries per queue
pub fn retries_by_queue(entries: &[RetryEntry]) -> BTreeMap<String, u64> {
    entries.iter().fold(BTreeMap::new(), |mut counts, entry| {
        *counts.entry(entry.queue.clone()).or_insert(0) += 1;
        counts
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retries_by_queue() {
        let entries = vec![
            RetryEntry { jid: "a".into(), queue: "default".into() },
            RetryEntry { jid: "b".into(), queue: "mailers".into() },
            RetryEntry { jid: "c".into(), queue: "default".into() },
        ];

        let counts = retries_by_queue(&entries);
        assert_eq!(counts["default"], 2);
        assert_eq!(counts["mailers"], 1);
        assert!(retries_by_queue(&[]).is_empty());
    }

    #[test]
    fn test_partial_snapshot_uses_defaults() {
        let stats: ClusterStats =
            serde_json::from_str(r#"{"queues": {"default": 5, "mailers": 4}, "dead_size": 3}"#)
                .unwrap();

        assert_eq!(stats.queues["default"], 5);
        assert_eq!(stats.dead_size, 3);
        assert_eq!(stats.retry_size, 0);
        assert!(stats.queue_latencies.is_empty());
    }
}
