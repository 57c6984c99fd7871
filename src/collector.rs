//! Scrape-time collection
//!
//! Each scrape runs two independent halves:
//!
//! 1. **Running jobs**: sets `running_job_runtime` for every key with in-flight
//!    jobs to the longest elapsed time, then zeroes every key that had running
//!    jobs on the previous scrape but has none now. Without the zeroing a gauge
//!    would keep reporting its last value forever.
//! 2. **Cluster stats** (optional): pulls one snapshot from the stats backend,
//!    bounded by a timeout, and sets the cluster gauges. A failed pull reports
//!    nothing for that cycle and never affects the first half.

use crate::labels::{self, LabelKey};
use crate::observability::Metrics;
use crate::observability::definitions::{
    ACTIVE_PROCESSES, ACTIVE_WORKERS_COUNT, JOBS_DEAD_COUNT, JOBS_RETRY_COUNT,
    JOBS_SCHEDULED_COUNT, JOBS_WAITING_COUNT, QUEUE_LATENCY, RUNNING_JOB_RUNTIME,
};
use crate::registry::InFlightRegistry;
use crate::stats::{self, BackendError, ClusterStats, StatsBackend};
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::time::{Instant, timeout};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("Stats backend error: {0}")]
    Backend(#[from] BackendError),

    #[error("Stats backend did not answer within {0:?}")]
    Timeout(Duration),
}

/// Outcome of the cluster half of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterOutcome {
    Disabled,
    Collected,
    Failed(String),
}

/// Summary of one collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectReport {
    /// Keys with at least one running job
    pub running_keys: usize,
    /// Keys zeroed because their jobs finished since the previous scrape
    pub retired_keys: usize,
    pub cluster: ClusterOutcome,
}

struct ClusterSource {
    backend: Arc<dyn StatsBackend>,
    timeout: Duration,
    retries_segmented_by_queue: bool,
}

/// Snapshot pulled from the backend, applied only once complete
struct ClusterSnapshot {
    stats: ClusterStats,
    retries_by_queue: Option<BTreeMap<String, u64>>,
}

pub struct Collector {
    metrics: Metrics,
    registry: Arc<InFlightRegistry>,
    previous_keys: Mutex<HashSet<LabelKey>>,
    cluster: Option<ClusterSource>,
}

impl Collector {
    pub fn new(metrics: Metrics, registry: Arc<InFlightRegistry>) -> Self {
        Self {
            metrics,
            registry,
            previous_keys: Mutex::new(HashSet::new()),
            cluster: None,
        }
    }

    /// Enable cluster-wide collection from `backend`
    pub fn with_cluster_stats(
        mut self,
        backend: Arc<dyn StatsBackend>,
        timeout: Duration,
        retries_segmented_by_queue: bool,
    ) -> Self {
        self.cluster = Some(ClusterSource {
            backend,
            timeout,
            retries_segmented_by_queue,
        });
        self
    }

    pub fn collects_cluster_stats(&self) -> bool {
        self.cluster.is_some()
    }

    /// Run both halves of a collection
    pub async fn collect(&self) -> CollectReport {
        let (running_keys, retired_keys) = self.collect_running();

        let cluster = match self.collect_cluster().await {
            Ok(true) => ClusterOutcome::Collected,
            Ok(false) => ClusterOutcome::Disabled,
            Err(e) => {
                warn!(error = %e, "Cluster stats collection failed, skipping this cycle");
                ClusterOutcome::Failed(e.to_string())
            }
        };

        CollectReport {
            running_keys,
            retired_keys,
            cluster,
        }
    }

    /// Update `running_job_runtime` from the in-flight registry.
    ///
    /// Returns (keys with running jobs, keys retired to zero).
    pub fn collect_running(&self) -> (usize, usize) {
        let mut previous_keys = self
            .previous_keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let longest = self.registry.longest_running(Instant::now());
        for (key, elapsed) in &longest {
            self.metrics
                .set(&RUNNING_JOB_RUNTIME, key, elapsed.as_secs_f64());
        }

        let mut retired = 0;
        for key in previous_keys.iter().filter(|key| !longest.contains_key(*key)) {
            debug!(%key, "No running jobs left, zeroing runtime gauge");
            self.metrics.set(&RUNNING_JOB_RUNTIME, key, 0.0);
            retired += 1;
        }

        *previous_keys = longest.keys().cloned().collect();
        (longest.len(), retired)
    }

    /// Pull cluster statistics and set the cluster gauges.
    ///
    /// Returns `Ok(false)` when cluster collection is disabled.
    pub async fn collect_cluster(&self) -> Result<bool, CollectError> {
        let Some(source) = &self.cluster else {
            return Ok(false);
        };

        let snapshot = source.fetch().await?;
        self.apply(&snapshot);
        Ok(true)
    }

    fn apply(&self, snapshot: &ClusterSnapshot) {
        let stats = &snapshot.stats;
        let global = LabelKey::new();

        for (queue, size) in &stats.queues {
            self.metrics.set(&JOBS_WAITING_COUNT, &queue_key(queue), *size as f64);
        }
        for (queue, latency) in &stats.queue_latencies {
            self.metrics.set(&QUEUE_LATENCY, &queue_key(queue), *latency);
        }

        self.metrics
            .set(&ACTIVE_WORKERS_COUNT, &global, stats.workers_size as f64);
        self.metrics
            .set(&JOBS_SCHEDULED_COUNT, &global, stats.scheduled_size as f64);
        self.metrics.set(&JOBS_DEAD_COUNT, &global, stats.dead_size as f64);
        self.metrics
            .set(&ACTIVE_PROCESSES, &global, stats.processes_size as f64);

        match &snapshot.retries_by_queue {
            Some(by_queue) => {
                // Known queues without retries report zero rather than a stale count
                for queue in stats.queues.keys().filter(|q| !by_queue.contains_key(*q)) {
                    self.metrics.set(&JOBS_RETRY_COUNT, &queue_key(queue), 0.0);
                }
                for (queue, count) in by_queue {
                    self.metrics.set(&JOBS_RETRY_COUNT, &queue_key(queue), *count as f64);
                }
            }
            None => self
                .metrics
                .set(&JOBS_RETRY_COUNT, &global, stats.retry_size as f64),
        }
    }
}

impl ClusterSource {
    async fn fetch(&self) -> Result<ClusterSnapshot, CollectError> {
        let stats = timeout(self.timeout, self.backend.snapshot())
            .await
            .map_err(|_| CollectError::Timeout(self.timeout))??;

        let retries_by_queue = if self.retries_segmented_by_queue {
            let entries = timeout(self.timeout, self.backend.retry_set())
                .await
                .map_err(|_| CollectError::Timeout(self.timeout))??;
            Some(stats::retries_by_queue(&entries))
        } else {
            None
        };

        Ok(ClusterSnapshot {
            stats,
            retries_by_queue,
        })
    }
}

fn queue_key(queue: &str) -> LabelKey {
    LabelKey::new().with(labels::QUEUE, queue)
}
