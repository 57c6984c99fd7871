use super::job::{JobPayload, LabelArity, Worker};
use crate::config::Settings;
use crate::labels::{self, LabelKey};
use crate::observability::definitions::{
    JOB_LATENCY, JOB_RUNTIME, JOBS_EXECUTED_TOTAL, JOBS_FAILED_TOTAL, JOBS_SUCCESS_TOTAL,
};
use crate::observability::{Metrics, ambient_labels, with_ambient_labels, with_ambient_labels_sync};
use crate::registry::InFlightRegistry;
use std::fmt::Debug;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, warn};

const PANIC_ERROR_CLASS: &str = "panic";
const CANCELLED_ERROR_CLASS: &str = "cancelled";

/// Wraps the execution of each job instance.
///
/// Records queue latency, keeps the job in the in-flight registry while it
/// runs, and counts the outcome. The job's own result is returned untouched.
#[derive(Debug, Clone)]
pub struct RunHook {
    metrics: Metrics,
    registry: Arc<InFlightRegistry>,
    settings: Arc<Settings>,
}

impl RunHook {
    pub fn new(metrics: Metrics, registry: Arc<InFlightRegistry>, settings: Arc<Settings>) -> Self {
        Self {
            metrics,
            registry,
            settings,
        }
    }

    /// Run an async job body under instrumentation
    pub async fn run<W, F, T, E>(
        &self,
        worker: &W,
        job: &JobPayload,
        queue: &str,
        body: F,
    ) -> Result<T, E>
    where
        W: Worker + ?Sized,
        F: Future<Output = Result<T, E>>,
        E: Debug,
    {
        if !self.settings.declare_process_metrics {
            return body.await;
        }

        let custom = custom_labels(worker, job);
        let execution = self.start(worker, job, queue, &custom);
        let result = with_ambient_labels(custom, body).await;
        execution.finish(&result);
        result
    }

    /// Run a blocking job body under instrumentation
    pub fn run_blocking<W, F, T, E>(
        &self,
        worker: &W,
        job: &JobPayload,
        queue: &str,
        body: F,
    ) -> Result<T, E>
    where
        W: Worker + ?Sized,
        F: FnOnce() -> Result<T, E>,
        E: Debug,
    {
        if !self.settings.declare_process_metrics {
            return body();
        }

        let custom = custom_labels(worker, job);
        let execution = self.start(worker, job, queue, &custom);
        let result = with_ambient_labels_sync(custom, body);
        execution.finish(&result);
        result
    }

    fn start<W>(&self, worker: &W, job: &JobPayload, queue: &str, custom: &LabelKey) -> Execution<'_>
    where
        W: Worker + ?Sized,
    {
        // The registry key carries ambient labels too, so the running gauge
        // lines up with the counters recorded for the same job
        let job_labels = labels::labelize(worker.name(), job.wrapped.as_deref(), queue).merge(custom);
        let labels = ambient_labels().merge(&job_labels);

        match job.latency(OffsetDateTime::now_utc()) {
            Some(latency) => self.metrics.observe(&JOB_LATENCY, &labels, latency),
            None => debug!(jid = %job.jid, "Job has no enqueue time, skipping latency"),
        }

        let started_at = Instant::now();
        self.registry.insert(labels.clone(), job.jid.clone(), started_at);

        Execution {
            hook: self,
            labels,
            jid: job.jid.clone(),
            started_at,
            finished: false,
        }
    }

    fn record_failure(&self, labels: &LabelKey, error_class: &str) {
        let failed = match &self.settings.error_label {
            Some(name) => labels.clone().with(name.as_str(), error_class),
            None => labels.clone(),
        };
        self.metrics.increment(&JOBS_FAILED_TOTAL, &failed);
    }
}

/// One instrumented execution. Dropping it without [`Execution::finish`]
/// (panic or cancelled future) still records the run as failed and removes
/// the job from the registry.
struct Execution<'a> {
    hook: &'a RunHook,
    labels: LabelKey,
    jid: String,
    started_at: Instant,
    finished: bool,
}

impl Execution<'_> {
    fn finish<T, E: Debug>(mut self, result: &Result<T, E>) {
        match result {
            Ok(_) => self.hook.metrics.increment(&JOBS_SUCCESS_TOTAL, &self.labels),
            Err(e) => self.hook.record_failure(&self.labels, &error_class(e)),
        }
        self.finished = true;
    }
}

impl Drop for Execution<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let error_class = if std::thread::panicking() {
                PANIC_ERROR_CLASS
            } else {
                CANCELLED_ERROR_CLASS
            };
            warn!(jid = %self.jid, labels = %self.labels, error_class, "Job did not complete");
            self.hook.record_failure(&self.labels, error_class);
        }

        let runtime = self.started_at.elapsed().as_secs_f64();
        self.hook.metrics.observe(&JOB_RUNTIME, &self.labels, runtime);
        self.hook.metrics.increment(&JOBS_EXECUTED_TOTAL, &self.labels);
        self.hook.registry.remove(&self.labels, &self.jid);
    }
}

/// Custom labels declared by the worker. A failing or panicking label
/// callback yields no custom labels.
fn custom_labels<W>(worker: &W, job: &JobPayload) -> LabelKey
where
    W: Worker + ?Sized,
{
    let Some(source) = worker.metric_labels() else {
        return LabelKey::new();
    };

    let args = match source.arity() {
        LabelArity::Zero => &[][..],
        LabelArity::JobArgs => job.args.as_slice(),
    };

    match catch_unwind(AssertUnwindSafe(|| source.labels(args))) {
        Ok(Ok(labels)) => {
            let declared = source.label_names();
            if let Some(undeclared) = labels.names().find(|name| !declared.contains(name)) {
                warn!(worker = worker.name(), label = undeclared, "Dropping undeclared custom label");
            }
            labels
                .iter()
                .filter(|(name, _)| declared.contains(name))
                .collect()
        }
        Ok(Err(e)) => {
            warn!(worker = worker.name(), jid = %job.jid, error = %e, "Custom labels unavailable");
            LabelKey::new()
        }
        Err(_) => {
            warn!(worker = worker.name(), jid = %job.jid, "Custom label callback panicked");
            LabelKey::new()
        }
    }
}

/// Kind of failure for the error label.
///
/// The name of the error's runtime variant or type as printed by `Debug`
/// (`Timeout` for `JobError::Timeout`, `Custom` for a boxed `io::Error`),
/// falling back to the short static type name when `Debug` does not start with
/// an identifier (strings, tuples, collections).
pub fn error_class<E: Debug + ?Sized>(error: &E) -> String {
    let debug = format!("{:?}", error);
    let variant: String = debug
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();

    match variant.chars().next() {
        Some(first) if first.is_alphabetic() || first == '_' => variant,
        _ => short_type_name(std::any::type_name::<E>()).to_string(),
    }
}

/// `alloc::boxed::Box<dyn core::error::Error>` -> `Box`
fn short_type_name(name: &str) -> &str {
    let path = name.split('<').next().unwrap_or(name);
    path.rsplit("::").next().unwrap_or(path)
}
