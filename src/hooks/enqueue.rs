use super::job::JobPayload;
use crate::labels::{self, LabelKey};
use crate::observability::Metrics;
use crate::observability::definitions::{JOBS_ENQUEUED_TOTAL, JOBS_REROUTED_TOTAL};
use tracing::debug;

/// Counts job submissions.
///
/// Install it where the queue framework observes submissions; it never fails
/// and never blocks the enqueue.
#[derive(Debug, Clone)]
pub struct EnqueueHook {
    metrics: Metrics,
}

impl EnqueueHook {
    pub fn new(metrics: Metrics) -> Self {
        Self { metrics }
    }

    /// Observe one submission.
    ///
    /// `requested_queue` is the queue the job was submitted to; `job.queue` is
    /// the queue it is actually routed to after any upstream override.
    pub fn call(&self, worker: &str, job: &JobPayload, requested_queue: &str) {
        let worker = labels::worker_identity(worker, job.wrapped.as_deref());
        let routed_queue = if job.queue.is_empty() {
            requested_queue
        } else {
            job.queue.as_str()
        };

        self.metrics
            .increment(&JOBS_ENQUEUED_TOTAL, &LabelKey::for_job(routed_queue, worker));

        if routed_queue != requested_queue {
            debug!(
                jid = %job.jid,
                from_queue = requested_queue,
                to_queue = routed_queue,
                worker,
                "Job rerouted before enqueue"
            );
            let rerouted = LabelKey::new()
                .with(labels::FROM_QUEUE, requested_queue)
                .with(labels::TO_QUEUE, routed_queue)
                .with(labels::WORKER, worker);
            self.metrics.increment(&JOBS_REROUTED_TOTAL, &rerouted);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::MemorySink;
    use std::sync::Arc;

    fn hook() -> (EnqueueHook, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        (EnqueueHook::new(Metrics::new(sink.clone())), sink)
    }

    #[test]
    fn test_counts_enqueues_per_worker() {
        let (hook, sink) = hook();

        for _ in 0..2 {
            let job = JobPayload::builder().class("SamplePlainJob").build();
            hook.call("SamplePlainJob", &job, "default");
        }
        let job = JobPayload::builder().class("FailingPlainJob").build();
        hook.call("FailingPlainJob", &job, "default");

        let sample = LabelKey::for_job("default", "SamplePlainJob");
        let failing = LabelKey::for_job("default", "FailingPlainJob");
        assert_eq!(sink.counter("jobs_enqueued_total", &sample), 2.0);
        assert_eq!(sink.counter("jobs_enqueued_total", &failing), 1.0);
        assert!(!sink.was_written("jobs_rerouted_total"));
    }

    #[test]
    fn test_wrapped_class_is_worker_identity() {
        let (hook, sink) = hook();

        let job = JobPayload::builder()
            .class("JobWrapper")
            .wrapped("SampleActiveJob")
            .build();
        hook.call("JobWrapper", &job, "default");

        let key = LabelKey::for_job("default", "SampleActiveJob");
        assert_eq!(sink.counter("jobs_enqueued_total", &key), 1.0);
    }

    #[test]
    fn test_reroute_counts_both() {
        let (hook, sink) = hook();

        let job = JobPayload::builder()
            .class("SamplePlainJob")
            .queue("rerouted_queue")
            .build();
        hook.call("SamplePlainJob", &job, "default");

        let enqueued = LabelKey::for_job("rerouted_queue", "SamplePlainJob");
        let rerouted = LabelKey::from([
            ("from_queue", "default"),
            ("to_queue", "rerouted_queue"),
            ("worker", "SamplePlainJob"),
        ]);
        assert_eq!(sink.counter("jobs_enqueued_total", &enqueued), 1.0);
        assert_eq!(sink.counter("jobs_rerouted_total", &rerouted), 1.0);
    }

    #[test]
    fn test_empty_routed_queue_falls_back_to_requested() {
        let (hook, sink) = hook();

        let job = JobPayload::builder().class("W").queue("").build();
        hook.call("W", &job, "critical");

        assert_eq!(sink.counter("jobs_enqueued_total", &LabelKey::for_job("critical", "W")), 1.0);
        assert!(!sink.was_written("jobs_rerouted_total"));
    }
}
