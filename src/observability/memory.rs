//! In-memory sink, inspectable from tests and embedding applications

use super::{MetricDef, MetricKind, MetricsSink, SinkError};
use crate::labels::LabelKey;
use dashmap::{DashMap, DashSet};
use std::collections::BTreeSet;

type SeriesKey = (String, LabelKey);

/// Records every observation in memory.
///
/// Gauges keep their last value; histograms keep every observed sample.
#[derive(Debug)]
struct Declared {
    kind: MetricKind,
    labels: BTreeSet<String>,
}

#[derive(Debug, Default)]
pub struct MemorySink {
    declared: DashMap<String, Declared>,
    counters: DashMap<SeriesKey, f64>,
    gauges: DashMap<SeriesKey, f64>,
    histograms: DashMap<SeriesKey, Vec<f64>>,
    touched: DashSet<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.declared.contains_key(name)
    }

    pub fn declared_kind(&self, name: &str) -> Option<MetricKind> {
        self.declared.get(name).map(|declared| declared.kind)
    }

    /// Label names declared for a metric, sorted; empty if undeclared
    pub fn declared_labels(&self, name: &str) -> Vec<String> {
        self.declared
            .get(name)
            .map(|declared| declared.labels.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Current counter value, zero if never incremented
    pub fn counter(&self, name: &str, labels: &LabelKey) -> f64 {
        self.counters
            .get(&(name.to_string(), labels.clone()))
            .map(|v| *v)
            .unwrap_or(0.0)
    }

    /// Last value set on a gauge
    pub fn gauge(&self, name: &str, labels: &LabelKey) -> Option<f64> {
        self.gauges
            .get(&(name.to_string(), labels.clone()))
            .map(|v| *v)
    }

    pub fn observations(&self, name: &str, labels: &LabelKey) -> Vec<f64> {
        self.histograms
            .get(&(name.to_string(), labels.clone()))
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Every label set a metric has been written with
    pub fn series(&self, name: &str) -> Vec<LabelKey> {
        let mut keys: Vec<LabelKey> = self
            .counters
            .iter()
            .map(|e| e.key().clone())
            .chain(self.gauges.iter().map(|e| e.key().clone()))
            .chain(self.histograms.iter().map(|e| e.key().clone()))
            .filter(|(metric, _)| metric == name)
            .map(|(_, labels)| labels)
            .collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// True if the metric was written at least once
    pub fn was_written(&self, name: &str) -> bool {
        self.touched.contains(name)
    }

    /// Sum of a counter across all label sets
    pub fn counter_total(&self, name: &str) -> f64 {
        self.counters
            .iter()
            .filter(|e| e.key().0 == name)
            .map(|e| *e.value())
            .sum()
    }
}

impl MetricsSink for MemorySink {
    fn declare(&self, def: &MetricDef, extra_labels: &[&str]) -> Result<(), SinkError> {
        let mut declared = self
            .declared
            .entry(def.name.to_string())
            .or_insert_with(|| Declared {
                kind: def.kind,
                labels: BTreeSet::new(),
            });
        declared.labels.extend(
            def.labels
                .iter()
                .chain(extra_labels)
                .map(|name| name.to_string()),
        );
        Ok(())
    }

    fn increment(&self, def: &MetricDef, labels: &LabelKey, by: f64) -> Result<(), SinkError> {
        if by < 0.0 {
            return Err(SinkError::NegativeIncrement {
                name: def.name.to_string(),
                by,
            });
        }
        *self
            .counters
            .entry((def.name.to_string(), labels.clone()))
            .or_insert(0.0) += by;
        self.touched.insert(def.name.to_string());
        Ok(())
    }

    fn set(&self, def: &MetricDef, labels: &LabelKey, value: f64) -> Result<(), SinkError> {
        self.gauges
            .insert((def.name.to_string(), labels.clone()), value);
        self.touched.insert(def.name.to_string());
        Ok(())
    }

    fn observe(&self, def: &MetricDef, labels: &LabelKey, value: f64) -> Result<(), SinkError> {
        self.histograms
            .entry((def.name.to_string(), labels.clone()))
            .or_default()
            .push(value);
        self.touched.insert(def.name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::definitions::*;

    #[test]
    fn test_counter_accumulates_per_label_set() {
        let sink = MemorySink::new();
        let a = LabelKey::for_job("default", "A");
        let b = LabelKey::for_job("default", "B");

        sink.increment(&JOBS_ENQUEUED_TOTAL, &a, 1.0).unwrap();
        sink.increment(&JOBS_ENQUEUED_TOTAL, &a, 1.0).unwrap();
        sink.increment(&JOBS_ENQUEUED_TOTAL, &b, 1.0).unwrap();

        assert_eq!(sink.counter("jobs_enqueued_total", &a), 2.0);
        assert_eq!(sink.counter("jobs_enqueued_total", &b), 1.0);
        assert_eq!(sink.counter_total("jobs_enqueued_total"), 3.0);
        assert_eq!(sink.series("jobs_enqueued_total"), vec![a, b]);
    }

    #[test]
    fn test_rejects_negative_increment() {
        let sink = MemorySink::new();
        let result = sink.increment(&JOBS_ENQUEUED_TOTAL, &LabelKey::new(), -1.0);
        assert!(matches!(result, Err(SinkError::NegativeIncrement { .. })));
    }

    #[test]
    fn test_gauge_keeps_last_value() {
        let sink = MemorySink::new();
        let key = LabelKey::from([("queue", "default")]);

        sink.set(&JOBS_WAITING_COUNT, &key, 5.0).unwrap();
        sink.set(&JOBS_WAITING_COUNT, &key, 2.0).unwrap();

        assert_eq!(sink.gauge("jobs_waiting_count", &key), Some(2.0));
        assert!(sink.was_written("jobs_waiting_count"));
        assert!(!sink.was_written("queue_latency"));
    }

    #[test]
    fn test_declare_records_kind() {
        let sink = MemorySink::new();
        sink.declare(&JOB_RUNTIME, &[]).unwrap();
        assert_eq!(sink.declared_kind("job_runtime"), Some(MetricKind::Histogram));
        assert!(!sink.is_declared("job_latency"));
    }

    #[test]
    fn test_declared_labels_accumulate() {
        let sink = MemorySink::new();
        sink.declare(&JOBS_FAILED_TOTAL, &["error"]).unwrap();
        sink.declare(&JOBS_FAILED_TOTAL, &["tenant"]).unwrap();

        assert_eq!(
            sink.declared_labels("jobs_failed_total"),
            vec!["error", "queue", "tenant", "worker"]
        );
        assert!(sink.declared_labels("job_latency").is_empty());
    }
}
