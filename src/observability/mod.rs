//! Metrics sinks and the facade the hooks write through
//!
//! The hooks and the collector never talk to a metrics backend directly: they
//! call [`Metrics`], which forwards to any [`MetricsSink`]. Sink failures are
//! logged and absorbed so instrumentation can never break a job.
//!
//! Labels installed with [`with_ambient_labels`] are merged into every
//! observation made inside that scope, so metrics emitted by a job body carry
//! the job's custom dimensions.

pub mod definitions;
mod memory;
mod prometheus;

pub use definitions::{Aggregation, MetricDef, MetricKind};
pub use memory::MemorySink;
pub use prometheus::PrometheusSink;

use crate::labels::LabelKey;
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Prometheus error: {0}")]
    Prometheus(#[from] ::prometheus::Error),

    #[error("Metric '{name}' registered with labels [{expected}], got [{actual}]")]
    LabelMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    #[error("Metric '{name}' is already in use, cannot add labels [{labels}]")]
    AlreadyInUse { name: String, labels: String },

    #[error("Counter '{name}' cannot be decreased (by {by})")]
    NegativeIncrement { name: String, by: f64 },
}

/// Storage for counters, gauges and histograms
pub trait MetricsSink: Send + Sync + 'static {
    /// Announce a metric before first use.
    ///
    /// `extra_labels` are label names beyond `def.labels` that observations
    /// of this metric may carry. Repeated declarations accumulate.
    fn declare(&self, _def: &MetricDef, _extra_labels: &[&str]) -> Result<(), SinkError> {
        Ok(())
    }

    fn increment(&self, def: &MetricDef, labels: &LabelKey, by: f64) -> Result<(), SinkError>;

    fn set(&self, def: &MetricDef, labels: &LabelKey, value: f64) -> Result<(), SinkError>;

    fn observe(&self, def: &MetricDef, labels: &LabelKey, value: f64) -> Result<(), SinkError>;
}

tokio::task_local! {
    static AMBIENT_LABELS: LabelKey;
}

/// Labels currently installed as ambient context (empty outside any scope)
pub fn ambient_labels() -> LabelKey {
    AMBIENT_LABELS
        .try_with(|labels| labels.clone())
        .unwrap_or_default()
}

/// Run `fut` with `labels` merged into the ambient context
pub async fn with_ambient_labels<F: Future>(labels: LabelKey, fut: F) -> F::Output {
    let merged = ambient_labels().merge(&labels);
    AMBIENT_LABELS.scope(merged, fut).await
}

/// Blocking counterpart of [`with_ambient_labels`]
pub fn with_ambient_labels_sync<R>(labels: LabelKey, f: impl FnOnce() -> R) -> R {
    let merged = ambient_labels().merge(&labels);
    AMBIENT_LABELS.sync_scope(merged, f)
}

/// Handle for recording counters, gauges and histograms
#[derive(Clone)]
pub struct Metrics {
    sink: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    pub fn declare(&self, defs: &[&MetricDef]) {
        self.declare_with_labels(defs, &[]);
    }

    /// Declare `defs` as also carrying the `extra_labels` dimensions
    pub fn declare_with_labels(&self, defs: &[&MetricDef], extra_labels: &[&str]) {
        for def in defs {
            if let Err(e) = self.sink.declare(def, extra_labels) {
                warn!(metric = def.name, error = %e, "Failed to declare metric");
            }
        }
    }

    pub fn increment(&self, def: &MetricDef, labels: &LabelKey) {
        self.increment_by(def, labels, 1.0);
    }

    pub fn increment_by(&self, def: &MetricDef, labels: &LabelKey, by: f64) {
        if !self.expect_kind(def, MetricKind::Counter) {
            return;
        }
        let labels = with_ambient(labels);
        match self.sink.increment(def, &labels, by) {
            Ok(()) => debug!(counter = def.name, %labels, "Metric incremented"),
            Err(e) => warn!(counter = def.name, %labels, error = %e, "Failed to increment metric"),
        }
    }

    pub fn set(&self, def: &MetricDef, labels: &LabelKey, value: f64) {
        if !self.expect_kind(def, MetricKind::Gauge) {
            return;
        }
        let labels = with_ambient(labels);
        if let Err(e) = self.sink.set(def, &labels, value) {
            warn!(gauge = def.name, %labels, error = %e, "Failed to set metric");
        }
    }

    pub fn observe(&self, def: &MetricDef, labels: &LabelKey, value: f64) {
        if !self.expect_kind(def, MetricKind::Histogram) {
            return;
        }
        let labels = with_ambient(labels);
        if let Err(e) = self.sink.observe(def, &labels, value) {
            warn!(histogram = def.name, %labels, error = %e, "Failed to observe metric");
        }
    }

    fn expect_kind(&self, def: &MetricDef, kind: MetricKind) -> bool {
        if def.kind != kind {
            warn!(metric = def.name, declared = ?def.kind, used_as = ?kind, "Metric used as wrong kind");
            return false;
        }
        true
    }
}

/// Explicit labels win over ambient ones
fn with_ambient(labels: &LabelKey) -> LabelKey {
    ambient_labels().merge(labels)
}

#[cfg(test)]
mod tests {
    use super::definitions::*;
    use super::*;

    struct BrokenSink;

    impl MetricsSink for BrokenSink {
        fn increment(&self, def: &MetricDef, _: &LabelKey, by: f64) -> Result<(), SinkError> {
            Err(SinkError::NegativeIncrement {
                name: def.name.to_string(),
                by,
            })
        }

        fn set(&self, def: &MetricDef, _: &LabelKey, _: f64) -> Result<(), SinkError> {
            Err(SinkError::LabelMismatch {
                name: def.name.to_string(),
                expected: String::new(),
                actual: String::new(),
            })
        }

        fn observe(&self, def: &MetricDef, labels: &LabelKey, value: f64) -> Result<(), SinkError> {
            self.set(def, labels, value)
        }
    }

    #[test]
    fn test_sink_errors_are_absorbed() {
        let metrics = Metrics::new(Arc::new(BrokenSink));
        let key = LabelKey::for_job("default", "W");

        metrics.increment(&JOBS_ENQUEUED_TOTAL, &key);
        metrics.set(&RUNNING_JOB_RUNTIME, &key, 1.0);
        metrics.observe(&JOB_RUNTIME, &key, 1.0);
    }

    #[test]
    fn test_wrong_kind_is_ignored() {
        let sink = Arc::new(MemorySink::new());
        let metrics = Metrics::new(sink.clone());
        let key = LabelKey::for_job("default", "W");

        metrics.increment(&RUNNING_JOB_RUNTIME, &key);
        metrics.set(&JOBS_ENQUEUED_TOTAL, &key, 3.0);

        assert_eq!(sink.gauge("running_job_runtime", &key), None);
        assert_eq!(sink.counter("jobs_enqueued_total", &key), 0.0);
    }

    #[tokio::test]
    async fn test_ambient_labels_merge_into_observations() {
        let sink = Arc::new(MemorySink::new());
        let metrics = Metrics::new(sink.clone());

        with_ambient_labels(LabelKey::from([("implicit", "true")]), async {
            metrics.increment(&JOBS_ENQUEUED_TOTAL, &LabelKey::from([("explicit", "true")]));
        })
        .await;

        let expected = LabelKey::from([("explicit", "true"), ("implicit", "true")]);
        assert_eq!(sink.counter("jobs_enqueued_total", &expected), 1.0);
        assert!(ambient_labels().is_empty());
    }

    #[test]
    fn test_explicit_labels_win_over_ambient() {
        let sink = Arc::new(MemorySink::new());
        let metrics = Metrics::new(sink.clone());

        with_ambient_labels_sync(LabelKey::from([("tenant", "ambient")]), || {
            with_ambient_labels_sync(LabelKey::from([("region", "eu")]), || {
                metrics.increment(&JOBS_ENQUEUED_TOTAL, &LabelKey::from([("tenant", "explicit")]));
            });
        });

        let expected = LabelKey::from([("region", "eu"), ("tenant", "explicit")]);
        assert_eq!(sink.counter("jobs_enqueued_total", &expected), 1.0);
    }
}
