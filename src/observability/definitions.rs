//! Metric definitions emitted by the hooks and the collector

use crate::labels::{FROM_QUEUE, QUEUE, TO_QUEUE, WORKER};

/// Histogram buckets in seconds. Standard Prometheus buckets extended up to
/// six hours, since jobs may be very long-running.
pub const LONG_RUNNING_JOB_RUNTIME_BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0,
    1800.0, 3600.0, 21_600.0,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

/// How a gauge should be combined across processes by an aggregating exporter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Aggregation {
    MostRecent,
    Sum,
    Max,
}

/// Static description of one metric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricDef {
    pub name: &'static str,
    pub kind: MetricKind,
    pub help: &'static str,
    /// Declared dimensions. Custom worker labels may extend these.
    pub labels: &'static [&'static str],
    /// Histogram bucket bounds, empty for other kinds
    pub buckets: &'static [f64],
    pub aggregation: Aggregation,
}

impl MetricDef {
    pub const fn counter(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            help,
            labels,
            buckets: &[],
            aggregation: Aggregation::Sum,
        }
    }

    pub const fn gauge(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
    ) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            help,
            labels,
            buckets: &[],
            aggregation: Aggregation::MostRecent,
        }
    }

    pub const fn histogram(
        name: &'static str,
        help: &'static str,
        labels: &'static [&'static str],
        buckets: &'static [f64],
    ) -> Self {
        Self {
            name,
            kind: MetricKind::Histogram,
            help,
            labels,
            buckets,
            aggregation: Aggregation::Sum,
        }
    }

    pub const fn aggregated_by(mut self, aggregation: Aggregation) -> Self {
        self.aggregation = aggregation;
        self
    }
}

const JOB_LABELS: &[&str] = &[QUEUE, WORKER];
const QUEUE_LABELS: &[&str] = &[QUEUE];

// Declared in every process

pub const JOBS_ENQUEUED_TOTAL: MetricDef = MetricDef::counter(
    "jobs_enqueued_total",
    "A counter of the total number of jobs enqueued.",
    JOB_LABELS,
);

pub const JOBS_REROUTED_TOTAL: MetricDef = MetricDef::counter(
    "jobs_rerouted_total",
    "A counter of the total number of jobs rerouted to another queue before enqueue.",
    &[FROM_QUEUE, TO_QUEUE, WORKER],
);

// Declared only where jobs execute

pub const JOBS_EXECUTED_TOTAL: MetricDef = MetricDef::counter(
    "jobs_executed_total",
    "A counter of the total number of jobs executed.",
    JOB_LABELS,
);

pub const JOBS_SUCCESS_TOTAL: MetricDef = MetricDef::counter(
    "jobs_success_total",
    "A counter of the total number of jobs successfully processed.",
    JOB_LABELS,
);

pub const JOBS_FAILED_TOTAL: MetricDef = MetricDef::counter(
    "jobs_failed_total",
    "A counter of the total number of jobs failed.",
    JOB_LABELS,
);

pub const JOB_LATENCY: MetricDef = MetricDef::histogram(
    "job_latency",
    "The job latency, the difference in seconds between enqueued and running time",
    JOB_LABELS,
    LONG_RUNNING_JOB_RUNTIME_BUCKETS,
);

pub const JOB_RUNTIME: MetricDef = MetricDef::histogram(
    "job_runtime",
    "A histogram of the job execution time.",
    JOB_LABELS,
    LONG_RUNNING_JOB_RUNTIME_BUCKETS,
);

pub const RUNNING_JOB_RUNTIME: MetricDef = MetricDef::gauge(
    "running_job_runtime",
    "How long currently running jobs are running (the longest one per label set)",
    JOB_LABELS,
)
.aggregated_by(Aggregation::Max);

// Cluster-wide gauges filled from the stats backend

pub const JOBS_WAITING_COUNT: MetricDef = MetricDef::gauge(
    "jobs_waiting_count",
    "The number of jobs waiting to process.",
    QUEUE_LABELS,
);

pub const QUEUE_LATENCY: MetricDef = MetricDef::gauge(
    "queue_latency",
    "The queue latency, the difference in seconds since the oldest job in the queue was enqueued",
    QUEUE_LABELS,
);

pub const ACTIVE_WORKERS_COUNT: MetricDef = MetricDef::gauge(
    "active_workers_count",
    "The number of currently busy workers.",
    &[],
);

pub const JOBS_SCHEDULED_COUNT: MetricDef = MetricDef::gauge(
    "jobs_scheduled_count",
    "The number of jobs scheduled for later execution.",
    &[],
);

/// Labelled by queue when retries are segmented
pub const JOBS_RETRY_COUNT: MetricDef = MetricDef::gauge(
    "jobs_retry_count",
    "The number of failed jobs waiting to be retried",
    &[],
);

pub const JOBS_DEAD_COUNT: MetricDef = MetricDef::gauge(
    "jobs_dead_count",
    "The number of jobs exceeded their retry count.",
    &[],
);

pub const ACTIVE_PROCESSES: MetricDef = MetricDef::gauge(
    "active_processes",
    "The number of active worker processes.",
    &[],
);

pub const CLIENT_METRICS: &[&MetricDef] = &[&JOBS_ENQUEUED_TOTAL, &JOBS_REROUTED_TOTAL];

pub const PROCESS_METRICS: &[&MetricDef] = &[
    &JOBS_EXECUTED_TOTAL,
    &JOBS_SUCCESS_TOTAL,
    &JOBS_FAILED_TOTAL,
    &JOB_LATENCY,
    &JOB_RUNTIME,
    &RUNNING_JOB_RUNTIME,
];

pub const CLUSTER_METRICS: &[&MetricDef] = &[
    &JOBS_WAITING_COUNT,
    &QUEUE_LATENCY,
    &ACTIVE_WORKERS_COUNT,
    &JOBS_SCHEDULED_COUNT,
    &JOBS_RETRY_COUNT,
    &JOBS_DEAD_COUNT,
    &ACTIVE_PROCESSES,
];
