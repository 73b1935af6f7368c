//! In-process metrics registry shared by every reconcile cycle.

use std::collections::BTreeMap;
use std::sync::Mutex;

use serde::Serialize;
use tracing::debug;

/// Sink for reconcile observability.
///
/// One instance lives for the whole process and is shared by every cycle.
pub trait MetricsReporter: Send + Sync {
    fn reconcile_started(&self, policy: &str);

    fn reconcile_failed(&self, policy: &str);

    /// Replace every intensity series owned by `policy` with `samples`.
    /// An empty slice drops the policy's series.
    fn record_intensity(&self, policy: &str, samples: &[IntensitySample]);
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct SeriesKey {
    cluster: String,
    location: String,
    active: bool,
}

/// One intensity gauge series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntensitySample {
    pub cluster: String,
    pub location: String,
    pub active: bool,
    pub value: f64,
}

impl IntensitySample {
    fn key(&self) -> SeriesKey {
        SeriesKey {
            cluster: self.cluster.clone(),
            location: self.location.clone(),
            active: self.active,
        }
    }
}

/// Point-in-time copy of every metric, sorted by label values.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub reconciles: Vec<(String, u64)>,
    pub reconcile_errors: Vec<(String, u64)>,
    pub intensity: Vec<IntensitySample>,
}

impl MetricsSnapshot {
    pub fn reconciles_for(&self, policy: &str) -> u64 {
        lookup(&self.reconciles, policy)
    }

    pub fn errors_for(&self, policy: &str) -> u64 {
        lookup(&self.reconcile_errors, policy)
    }
}

fn lookup(counters: &[(String, u64)], policy: &str) -> u64 {
    counters
        .iter()
        .find(|(p, _)| p == policy)
        .map(|(_, n)| *n)
        .unwrap_or(0)
}

#[derive(Default)]
struct Registry {
    reconciles: BTreeMap<String, u64>,
    reconcile_errors: BTreeMap<String, u64>,
    /// Series per owning policy.
    intensity: BTreeMap<String, Vec<IntensitySample>>,
}

/// Default [`MetricsReporter`] backing the `/metrics` endpoint.
#[derive(Default)]
pub struct OperatorMetrics {
    registry: Mutex<Registry>,
}

impl OperatorMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        MetricsSnapshot {
            reconciles: registry
                .reconciles
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            reconcile_errors: registry
                .reconcile_errors
                .iter()
                .map(|(k, v)| (k.clone(), *v))
                .collect(),
            intensity: merge_series(&registry.intensity),
        }
    }
}

/// Flatten per-policy series into one set sorted by labels. Policies sharing
/// a cluster with identical labels collapse to one series; the later policy
/// key wins.
fn merge_series(by_policy: &BTreeMap<String, Vec<IntensitySample>>) -> Vec<IntensitySample> {
    let mut merged: BTreeMap<SeriesKey, f64> = BTreeMap::new();
    for sample in by_policy.values().flatten() {
        merged.insert(sample.key(), sample.value);
    }
    merged
        .into_iter()
        .map(|(key, value)| IntensitySample {
            cluster: key.cluster,
            location: key.location,
            active: key.active,
            value,
        })
        .collect()
}

impl MetricsReporter for OperatorMetrics {
    fn reconcile_started(&self, policy: &str) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        *registry.reconciles.entry(policy.to_string()).or_default() += 1;
    }

    fn reconcile_failed(&self, policy: &str) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        *registry.reconcile_errors.entry(policy.to_string()).or_default() += 1;
    }

    fn record_intensity(&self, policy: &str, samples: &[IntensitySample]) {
        let mut registry = self.registry.lock().unwrap_or_else(|e| e.into_inner());
        let previous = if samples.is_empty() {
            registry.intensity.remove(policy)
        } else {
            registry
                .intensity
                .insert(policy.to_string(), samples.to_vec())
        };
        let dropped = previous.map_or(0, |old| {
            old.iter()
                .filter(|o| !samples.iter().any(|s| s.key() == o.key()))
                .count()
        });
        if dropped > 0 {
            debug!(policy, dropped, "dropped stale intensity series");
        }
    }
}
