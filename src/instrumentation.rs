use std::sync::Arc;
use std::time::Duration;

use crate::collector::Collector;
use crate::config::Settings;
use crate::hooks::{EnqueueHook, RunHook, Worker};
use crate::labels::QUEUE;
use crate::observability::definitions::{
    CLIENT_METRICS, CLUSTER_METRICS, JOBS_FAILED_TOTAL, JOBS_RETRY_COUNT, PROCESS_METRICS,
};
use crate::observability::{Metrics, MetricsSink};
use crate::registry::InFlightRegistry;
use crate::stats::StatsBackend;
use tracing::{debug, info, warn};

/// Everything one process needs to instrument its jobs: hooks and collector
/// sharing one sink and one in-flight registry.
#[derive(Clone)]
pub struct Instrumentation {
    pub settings: Arc<Settings>,
    pub metrics: Metrics,
    pub registry: Arc<InFlightRegistry>,
    pub collector: Arc<Collector>,
}

impl Instrumentation {
    /// Declare metrics according to `settings` and wire the components.
    ///
    /// `backend` is only used when cluster collection is enabled.
    pub fn new(
        settings: Settings,
        sink: Arc<dyn MetricsSink>,
        backend: Option<(Arc<dyn StatsBackend>, Duration)>,
    ) -> Self {
        let metrics = Metrics::new(sink);
        let registry = Arc::new(InFlightRegistry::new());

        metrics.declare(CLIENT_METRICS);
        if settings.declare_process_metrics {
            metrics.declare(PROCESS_METRICS);
            if let Some(error_label) = &settings.error_label {
                metrics.declare_with_labels(&[&JOBS_FAILED_TOTAL], &[error_label.as_str()]);
            }
        }

        let mut collector = Collector::new(metrics.clone(), registry.clone());
        match backend {
            Some((backend, timeout)) if settings.collect_cluster_metrics => {
                metrics.declare(CLUSTER_METRICS);
                if settings.retries_segmented_by_queue {
                    metrics.declare_with_labels(&[&JOBS_RETRY_COUNT], &[QUEUE]);
                }
                collector = collector.with_cluster_stats(
                    backend,
                    timeout,
                    settings.retries_segmented_by_queue,
                );
            }
            None if settings.collect_cluster_metrics => {
                warn!("Cluster metrics enabled but no stats backend configured");
            }
            _ => {}
        }

        info!(
            declare_process_metrics = settings.declare_process_metrics,
            collect_cluster_metrics = collector.collects_cluster_stats(),
            retries_segmented_by_queue = settings.retries_segmented_by_queue,
            error_label = ?settings.error_label,
            "Job instrumentation configured"
        );

        Self {
            settings: Arc::new(settings),
            metrics,
            registry,
            collector: Arc::new(collector),
        }
    }

    /// Declare the custom label names of `worker`.
    ///
    /// Call for every worker with [`MetricLabels`](crate::hooks::MetricLabels)
    /// before its first job runs: the custom labels reach the process metrics
    /// and, as ambient labels, anything enqueued from the job body.
    pub fn declare_worker<W: Worker + ?Sized>(&self, worker: &W) {
        let Some(source) = worker.metric_labels() else {
            return;
        };
        let names = source.label_names();
        debug!(worker = worker.name(), labels = ?names, "Declaring custom worker labels");

        self.metrics.declare_with_labels(CLIENT_METRICS, names);
        if self.settings.declare_process_metrics {
            self.metrics.declare_with_labels(PROCESS_METRICS, names);
        }
    }

    pub fn enqueue_hook(&self) -> EnqueueHook {
        EnqueueHook::new(self.metrics.clone())
    }

    pub fn run_hook(&self) -> RunHook {
        RunHook::new(
            self.metrics.clone(),
            self.registry.clone(),
            self.settings.clone(),
        )
    }
}
