//! Label keys addressing every metric observation

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const QUEUE: &str = "queue";
pub const WORKER: &str = "worker";
pub const FROM_QUEUE: &str = "from_queue";
pub const TO_QUEUE: &str = "to_queue";

/// Canonical composite key: dimension name → value.
///
/// Backed by a `BTreeMap` so equality, hashing and ordering are structural and
/// independent of insertion order. Keys built at enqueue time, run time and
/// collection time collide whenever their contents match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelKey(BTreeMap<String, String>);

impl LabelKey {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key for a (queue, worker) pair
    pub fn for_job(queue: impl Into<String>, worker: impl Into<String>) -> Self {
        Self::new().with(QUEUE, queue).with(WORKER, worker)
    }

    /// Return a copy of this key with `name` set to `value`
    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    /// Return a copy of this key with `name` removed
    pub fn without(mut self, name: &str) -> Self {
        self.0.remove(name);
        self
    }

    /// Merge `other` into this key. Values from `other` win on conflict.
    pub fn merge(mut self, other: &LabelKey) -> Self {
        for (name, value) in &other.0 {
            self.0.insert(name.clone(), value.clone());
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Dimension names in canonical order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Values in the same order as [`LabelKey::names`]
    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.0.values().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for LabelKey
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl<K, V, const N: usize> From<[(K, V); N]> for LabelKey
where
    K: Into<String>,
    V: Into<String>,
{
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

impl From<BTreeMap<String, String>> for LabelKey {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl fmt::Display for LabelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str("}")
    }
}

/// Worker identity for a job, unwrapping one level of adapter indirection.
///
/// Jobs submitted through a higher-level job abstraction carry the real class
/// in `wrapped`; that name identifies the worker. Otherwise the worker's own
/// name is used.
pub fn worker_identity<'a>(worker: &'a str, wrapped: Option<&'a str>) -> &'a str {
    match wrapped {
        Some(name) if !name.is_empty() => name,
        _ => worker,
    }
}

/// Build the (queue, worker) key for a job
pub fn labelize(worker: &str, wrapped: Option<&str>, queue: &str) -> LabelKey {
    LabelKey::for_job(queue, worker_identity(worker, wrapped))
}

/// True if `name` is usable as a metric label name
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    !name.starts_with("__") && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
