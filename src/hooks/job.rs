use crate::labels::LabelKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;
use uuid::Uuid;

/// Raw job payload as handed to the hooks by the queue framework
#[derive(Debug, Clone, Serialize, Deserialize, bon::Builder)]
pub struct JobPayload {
    /// Job identifier
    #[builder(into, default = Uuid::new_v4().to_string())]
    pub jid: String,
    /// Worker class name
    #[builder(into)]
    pub class: String,
    /// Queue the job is routed to
    #[builder(into, default = "default".to_string())]
    pub queue: String,
    /// Real class name when submitted through a wrapping job adapter
    #[builder(into)]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wrapped: Option<String>,
    #[builder(default)]
    #[serde(default)]
    pub args: Vec<Value>,
    /// Enqueue time, fractional seconds since the Unix epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueued_at: Option<f64>,
}

impl JobPayload {
    /// Seconds spent waiting in the queue, `None` if the enqueue time is unknown
    pub fn latency(&self, now: OffsetDateTime) -> Option<f64> {
        let enqueued_at = self.enqueued_at.filter(|t| t.is_finite())?;
        Some((unix_seconds(now) - enqueued_at).max(0.0))
    }
}

/// Fractional seconds since the Unix epoch
pub fn unix_seconds(at: OffsetDateTime) -> f64 {
    at.unix_timestamp_nanos() as f64 / 1e9
}

/// Which arguments a [`MetricLabels`] implementation wants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LabelArity {
    /// Called with no arguments
    #[default]
    Zero,
    /// Called with the job's arguments
    JobArgs,
}

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("missing job argument at position {0}")]
    MissingArgument(usize),

    #[error("invalid job argument: {0}")]
    InvalidArgument(String),

    #[error("label callback failed: {0}")]
    Callback(String),
}

/// Optional capability: extra label dimensions declared by a worker.
///
/// The labels are added to every metric recorded for the worker's jobs and
/// installed as ambient context while the job body runs.
pub trait MetricLabels: Send + Sync {
    fn arity(&self) -> LabelArity {
        LabelArity::Zero
    }

    /// Every label name [`MetricLabels::labels`] may return. Sinks with a
    /// fixed label schema register these before the worker's first job.
    fn label_names(&self) -> &[&str];

    /// Called with an empty slice for [`LabelArity::Zero`]
    fn labels(&self, args: &[Value]) -> Result<LabelKey, LabelError>;
}

/// A job worker as seen by the run hook
pub trait Worker: Send + Sync {
    /// Worker class name
    fn name(&self) -> &str;

    fn metric_labels(&self) -> Option<&dyn MetricLabels> {
        None
    }
}

impl Worker for str {
    fn name(&self) -> &str {
        self
    }
}

impl Worker for String {
    fn name(&self) -> &str {
        self
    }
}
