pub mod collector;
pub mod config;
pub mod hooks;
pub mod humanize;
pub mod instrumentation;
pub mod labels;
pub mod observability;
pub mod registry;
pub mod server;
pub mod stats;

pub use collector::{CollectReport, Collector};
pub use hooks::{EnqueueHook, JobPayload, RunHook, Worker};
pub use instrumentation::Instrumentation;
pub use labels::LabelKey;
pub use registry::InFlightRegistry;
