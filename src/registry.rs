//! In-flight job registry
//!
//! Tracks which jobs are executing right now, per label key, with their
//! monotonic start instants. Every executing job inserts and removes its own
//! entry; the collector reads the registry on each scrape.
//!
//! Backed by a sharded `DashMap`: an insert or remove locks only the shard
//! holding its key, so workers never contend on a global lock and a slow
//! scrape never stalls them for longer than one map operation. Because insert
//! and remove for a key happen under that key's shard lock, a concurrent read
//! observes an entry until its removal has been applied.

use crate::labels::LabelKey;
use dashmap::DashMap;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
pub struct InFlightRegistry {
    jobs: DashMap<LabelKey, HashMap<String, Instant>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `jid` started executing under `key` at `started_at`
    pub fn insert(&self, key: LabelKey, jid: impl Into<String>, started_at: Instant) {
        let jid = jid.into();
        debug!(%key, jid, "Job registered as in-flight");
        self.jobs.entry(key).or_default().insert(jid, started_at);
    }

    /// Remove `jid` from `key`, pruning the key once it has no entries left.
    ///
    /// Returns the start instant if the entry was present.
    pub fn remove(&self, key: &LabelKey, jid: &str) -> Option<Instant> {
        let started_at = self.jobs.get_mut(key)?.remove(jid);
        // Re-checked under the shard lock, so a concurrent insert is kept
        self.jobs.remove_if(key, |_, entries| entries.is_empty());
        debug!(%key, jid, "Job removed from in-flight registry");
        started_at
    }

    pub fn contains(&self, key: &LabelKey, jid: &str) -> bool {
        self.jobs
            .get(key)
            .is_some_and(|entries| entries.contains_key(jid))
    }

    /// Number of in-flight jobs across all keys
    pub fn len(&self) -> usize {
        self.jobs.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Longest elapsed time per key with at least one in-flight job.
    ///
    /// The maximum is used so one stuck job dominates its key.
    pub fn longest_running(&self, now: Instant) -> HashMap<LabelKey, Duration> {
        self.jobs
            .iter()
            .filter_map(|entry| {
                entry
                    .value()
                    .values()
                    .map(|started_at| now.saturating_duration_since(*started_at))
                    .max()
                    .map(|elapsed| (entry.key().clone(), elapsed))
            })
            .collect()
    }
}
