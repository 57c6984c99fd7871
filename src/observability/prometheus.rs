//! Prometheus-backed sink.
//!
//! A metric family's label names are the union of everything declared for it
//! (see [`MetricsSink::declare`]) plus, for metrics used without declaration,
//! the labels of the first observation. The family is built and registered on
//! first use; from then on its label names are fixed, so widening
//! declarations must happen before any job runs. Observations that omit a
//! declared label export it as an empty value, which Prometheus treats as
//! absent.

use super::{MetricDef, MetricKind, MetricsSink, SinkError};
use crate::labels::LabelKey;
use dashmap::DashMap;
use prometheus::{CounterVec, GaugeVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::collections::BTreeSet;
use tracing::debug;

#[derive(Clone)]
enum Family {
    Counter(CounterVec),
    Gauge(GaugeVec),
    Histogram(HistogramVec),
}

#[derive(Default)]
struct Declared {
    label_names: BTreeSet<String>,
    /// Built on first observation
    family: Option<Family>,
}

/// Sink writing into a `prometheus::Registry` for scraping
pub struct PrometheusSink {
    registry: Registry,
    namespace: Option<String>,
    families: DashMap<&'static str, Declared>,
}

impl PrometheusSink {
    pub fn new(namespace: Option<String>) -> Self {
        Self::with_registry(Registry::new(), namespace)
    }

    /// Use an externally owned registry (e.g. one shared with other exporters)
    pub fn with_registry(registry: Registry, namespace: Option<String>) -> Self {
        Self {
            registry,
            namespace,
            families: DashMap::new(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Label names a metric is (or will be) exported with, sorted
    pub fn label_names(&self, name: &str) -> Vec<String> {
        self.families
            .get(name)
            .map(|declared| declared.label_names.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Render all registered metrics in the Prometheus text format
    pub fn render(&self) -> Result<String, SinkError> {
        let encoder = TextEncoder::new();
        Ok(encoder.encode_to_string(&self.registry.gather())?)
    }

    /// Family for `def` and the label values of `labels` in family order
    fn series(&self, def: &MetricDef, labels: &LabelKey) -> Result<(Family, Vec<String>), SinkError> {
        let mut declared = self.families.entry(def.name).or_default();

        let family = match declared.family.clone() {
            Some(family) => family,
            None => {
                let mut names = declared.label_names.clone();
                names.extend(def.labels.iter().map(|name| name.to_string()));
                names.extend(labels.names().map(str::to_string));

                let family = self.register(def, &names)?;
                debug!(metric = def.name, labels = ?names, "Registered metric family");
                declared.label_names = names;
                declared.family = Some(family.clone());
                family
            }
        };

        if labels.names().any(|name| !declared.label_names.contains(name)) {
            return Err(SinkError::LabelMismatch {
                name: def.name.to_string(),
                expected: join(&declared.label_names),
                actual: labels.names().collect::<Vec<_>>().join(","),
            });
        }

        let values = declared
            .label_names
            .iter()
            .map(|name| labels.get(name).unwrap_or_default().to_string())
            .collect();
        Ok((family, values))
    }

    fn register(&self, def: &MetricDef, names: &BTreeSet<String>) -> Result<Family, SinkError> {
        let names: Vec<&str> = names.iter().map(String::as_str).collect();
        let mut opts = Opts::new(def.name, def.help);
        if let Some(namespace) = &self.namespace {
            opts = opts.namespace(namespace.clone());
        }

        let family = match def.kind {
            MetricKind::Counter => Family::Counter(CounterVec::new(opts, &names)?),
            MetricKind::Gauge => Family::Gauge(GaugeVec::new(opts, &names)?),
            MetricKind::Histogram => {
                let opts = HistogramOpts::from(opts).buckets(def.buckets.to_vec());
                Family::Histogram(HistogramVec::new(opts, &names)?)
            }
        };

        match &family {
            Family::Counter(vec) => self.registry.register(Box::new(vec.clone()))?,
            Family::Gauge(vec) => self.registry.register(Box::new(vec.clone()))?,
            Family::Histogram(vec) => self.registry.register(Box::new(vec.clone()))?,
        }

        Ok(family)
    }
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

impl MetricsSink for PrometheusSink {
    fn declare(&self, def: &MetricDef, extra_labels: &[&str]) -> Result<(), SinkError> {
        let mut declared = self.families.entry(def.name).or_default();

        let missing: BTreeSet<String> = def
            .labels
            .iter()
            .chain(extra_labels)
            .filter(|name| !declared.label_names.contains(**name))
            .map(|name| name.to_string())
            .collect();
        if missing.is_empty() {
            return Ok(());
        }
        if declared.family.is_some() {
            return Err(SinkError::AlreadyInUse {
                name: def.name.to_string(),
                labels: join(&missing),
            });
        }

        declared.label_names.extend(missing);
        Ok(())
    }

    fn increment(&self, def: &MetricDef, labels: &LabelKey, by: f64) -> Result<(), SinkError> {
        if by < 0.0 {
            return Err(SinkError::NegativeIncrement {
                name: def.name.to_string(),
                by,
            });
        }
        if let (Family::Counter(vec), values) = self.series(def, labels)? {
            vec.get_metric_with_label_values(&values)?.inc_by(by);
        }
        Ok(())
    }

    fn set(&self, def: &MetricDef, labels: &LabelKey, value: f64) -> Result<(), SinkError> {
        if let (Family::Gauge(vec), values) = self.series(def, labels)? {
            vec.get_metric_with_label_values(&values)?.set(value);
        }
        Ok(())
    }

    fn observe(&self, def: &MetricDef, labels: &LabelKey, value: f64) -> Result<(), SinkError> {
        if let (Family::Histogram(vec), values) = self.series(def, labels)? {
            vec.get_metric_with_label_values(&values)?.observe(value);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::definitions::*;

    #[test]
    fn test_renders_counter_with_labels() {
        let sink = PrometheusSink::new(None);
        let key = LabelKey::for_job("default", "SamplePlainJob");

        sink.increment(&JOBS_ENQUEUED_TOTAL, &key, 1.0).unwrap();
        sink.increment(&JOBS_ENQUEUED_TOTAL, &key, 1.0).unwrap();

        let text = sink.render().unwrap();
        assert!(text.contains("# TYPE jobs_enqueued_total counter"));
        assert!(text.contains(r#"jobs_enqueued_total{queue="default",worker="SamplePlainJob"} 2"#));
    }

    #[test]
    fn test_namespace_prefixes_metric_names() {
        let sink = PrometheusSink::new(Some("sidekiq".to_string()));
        sink.set(&JOBS_DEAD_COUNT, &LabelKey::new(), 3.0).unwrap();

        let text = sink.render().unwrap();
        assert!(text.contains("sidekiq_jobs_dead_count 3"));
    }

    #[test]
    fn test_histogram_uses_long_running_buckets() {
        let sink = PrometheusSink::new(None);
        sink.observe(&JOB_RUNTIME, &LabelKey::for_job("default", "W"), 0.05)
            .unwrap();

        let text = sink.render().unwrap();
        assert!(text.contains(r#"le="21600""#));
        assert!(text.contains(r#"job_runtime_count{queue="default",worker="W"} 1"#));
    }

    #[test]
    fn test_label_mismatch_is_reported() {
        let sink = PrometheusSink::new(None);
        sink.increment(&JOBS_FAILED_TOTAL, &LabelKey::for_job("default", "W"), 1.0)
            .unwrap();

        let extended = LabelKey::for_job("default", "W").with("error", "Boom");
        let result = sink.increment(&JOBS_FAILED_TOTAL, &extended, 1.0);
        assert!(matches!(result, Err(SinkError::LabelMismatch { .. })));
    }

    #[test]
    fn test_declared_labels_pad_plain_series() {
        let sink = PrometheusSink::new(None);
        sink.declare(&JOBS_EXECUTED_TOTAL, &["tenant"]).unwrap();

        sink.increment(&JOBS_EXECUTED_TOTAL, &LabelKey::for_job("default", "W"), 1.0)
            .unwrap();
        let tenant = LabelKey::for_job("default", "TenantJob").with("tenant", "acme");
        sink.increment(&JOBS_EXECUTED_TOTAL, &tenant, 1.0).unwrap();

        let text = sink.render().unwrap();
        assert!(text.contains(r#"jobs_executed_total{queue="default",tenant="",worker="W"} 1"#));
        assert!(text.contains(r#"jobs_executed_total{queue="default",tenant="acme",worker="TenantJob"} 1"#));
        assert_eq!(sink.label_names("jobs_executed_total"), vec!["queue", "tenant", "worker"]);
    }

    #[test]
    fn test_declarations_accumulate_until_first_use() {
        let sink = PrometheusSink::new(None);
        sink.declare(&JOBS_FAILED_TOTAL, &["error"]).unwrap();
        sink.declare(&JOBS_FAILED_TOTAL, &["tenant"]).unwrap();
        // Already covered, no-op
        sink.declare(&JOBS_FAILED_TOTAL, &["error"]).unwrap();
        assert!(!sink.render().unwrap().contains("jobs_failed_total"));

        let failed = LabelKey::for_job("default", "W").with("error", "Timeout");
        sink.increment(&JOBS_FAILED_TOTAL, &failed, 1.0).unwrap();

        let text = sink.render().unwrap();
        assert!(text.contains(r#"jobs_failed_total{error="Timeout",queue="default",tenant="",worker="W"} 1"#));
    }

    #[test]
    fn test_widening_after_first_use_is_rejected() {
        let sink = PrometheusSink::new(None);
        sink.increment(&JOBS_EXECUTED_TOTAL, &LabelKey::for_job("default", "W"), 1.0)
            .unwrap();

        let result = sink.declare(&JOBS_EXECUTED_TOTAL, &["tenant"]);
        assert!(matches!(result, Err(SinkError::AlreadyInUse { .. })));
        assert!(sink.declare(&JOBS_EXECUTED_TOTAL, &[]).is_ok());
        assert_eq!(sink.label_names("jobs_executed_total"), vec!["queue", "worker"]);
    }
}
