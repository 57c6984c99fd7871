//! Job lifecycle hooks
//!
//! - [`EnqueueHook`] - counts submissions and reroutes
//! - [`RunHook`] - wraps job execution: latency, in-flight tracking, outcome counters
//! - [`Worker`] / [`MetricLabels`] - worker identity and optional custom labels
//!
//! ## Example
//!
//! ```rust,ignore
//! let instrumentation = Instrumentation::new(settings, sink, None);
//! instrumentation.declare_worker(&worker);
//! let hook = instrumentation.run_hook();
//!
//! let result = hook
//!     .run(&worker, &job, "default", async { worker.perform(&job.args).await })
//!     .await;
//! ```

mod enqueue;
mod job;
mod run;

pub use enqueue::EnqueueHook;
pub use job::{JobPayload, LabelArity, LabelError, MetricLabels, Worker, unix_seconds};
pub use run::{RunHook, error_class};
