//! Domain types for the carbon-aware state store.
//!
//! Policies, placement targets, and events are persisted as JSON. Field
//! names on the wire are camelCase so manifests read like the custom
//! resources operators already know.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unique identifier for a policy (`{namespace}/{name}`).
pub type PolicyKey = String;

/// Discriminator for cluster-scoped placement targets.
pub const CLUSTER_SCOPED_KIND: &str = "clusterpropagationpolicies.policy.karmada.io";

/// Discriminator for namespace-scoped placement targets.
pub const NAMESPACED_KIND: &str = "propagationpolicies.policy.karmada.io";

// ── Intensity ─────────────────────────────────────────────────────

/// One carbon intensity reading for a location.
///
/// When `is_valid` is false the provider had no usable data; every other
/// field except `location` is meaningless and must not be ranked.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IntensityReading {
    pub is_valid: bool,
    pub location: String,
    pub units: String,
    pub valid_from: DateTime<Utc>,
    pub valid_to: DateTime<Utc>,
    pub value: f64,
}

impl IntensityReading {
    /// A "no data" reading for `location`.
    pub fn invalid(location: &str) -> Self {
        Self {
            is_valid: false,
            location: location.to_string(),
            ..Default::default()
        }
    }
}

/// A reading tagged with the cluster that requested it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterCarbonIntensity {
    pub cluster_name: String,
    pub reading: IntensityReading,
}

// ── Policy ────────────────────────────────────────────────────────

/// A member cluster and the grid location it draws power from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClusterLocation {
    pub name: String,
    pub location: String,
}

/// Reference to the placement target a policy rewrites.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TargetRef {
    pub name: String,
    /// Ignored for cluster-scoped targets.
    #[serde(default)]
    pub namespace: String,
}

/// Desired state of a carbon-aware policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PolicySpec {
    /// Number of clusters to keep active. Zero or negative means none.
    pub active_clusters: i32,
    pub cluster_locations: Vec<ClusterLocation>,
    /// Raw target discriminator; resolved to a [`TargetKind`] every cycle.
    pub target_kind: String,
    pub target_ref: TargetRef,
}

/// Snapshot of one cluster's intensity as shown in status.
///
/// Values are preformatted: `value` with two decimals, timestamps RFC 3339.
/// All fields are empty for clusters whose location had no data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IntensityStatus {
    pub units: String,
    pub valid_from: String,
    pub valid_to: String,
    pub value: String,
}

impl IntensityStatus {
    pub fn from_reading(reading: &IntensityReading) -> Self {
        if !reading.is_valid {
            return Self::default();
        }
        Self {
            units: reading.units.clone(),
            valid_from: reading.valid_from.to_rfc3339_opts(SecondsFormat::Secs, true),
            valid_to: reading.valid_to.to_rfc3339_opts(SecondsFormat::Secs, true),
            value: format!("{:.2}", reading.value),
        }
    }
}

/// Per-cluster entry in a policy's status.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStatus {
    pub name: String,
    pub location: String,
    pub carbon_intensity: IntensityStatus,
}

/// Observed state of a policy, overwritten wholesale every successful cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PolicyStatus {
    pub active_clusters: Vec<String>,
    /// Ranked clusters first, then clusters without data.
    pub clusters: Vec<ClusterStatus>,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_reconciled: Option<String>,
}

/// A carbon-aware placement policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CarbonAwarePolicy {
    pub namespace: String,
    pub name: String,
    pub spec: PolicySpec,
    #[serde(default)]
    pub status: PolicyStatus,
}

impl CarbonAwarePolicy {
    /// Build the composite key for the policies table.
    pub fn table_key(&self) -> PolicyKey {
        format!("{}/{}", self.namespace, self.name)
    }
}

// ── Targets ───────────────────────────────────────────────────────

/// The two shapes of placement target a policy can point at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetKind {
    /// Identified by name only.
    #[serde(rename = "clusterpropagationpolicies.policy.karmada.io")]
    ClusterScoped,
    /// Identified by name and namespace.
    #[serde(rename = "propagationpolicies.policy.karmada.io")]
    Namespaced,
}

impl TargetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetKind::ClusterScoped => CLUSTER_SCOPED_KIND,
            TargetKind::Namespaced => NAMESPACED_KIND,
        }
    }
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a policy names a target kind the operator does not know.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown target kind: {0:?}")]
pub struct UnknownTargetKind(pub String);

impl FromStr for TargetKind {
    type Err = UnknownTargetKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            CLUSTER_SCOPED_KIND => Ok(TargetKind::ClusterScoped),
            NAMESPACED_KIND => Ok(TargetKind::Namespaced),
            _ => Err(UnknownTargetKind(s.to_string())),
        }
    }
}

/// Cluster affinity of a placement target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAffinity {
    #[serde(default)]
    pub label_selector: BTreeMap<String, String>,
    #[serde(default)]
    pub cluster_names: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
}

/// Placement section of a target.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_affinity: Option<ClusterAffinity>,
    /// Spread constraints are carried through untouched.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub spread_constraints: Vec<String>,
}

/// A downstream placement object whose cluster affinity the operator owns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlacementTarget {
    pub kind: TargetKind,
    pub name: String,
    /// `None` for cluster-scoped targets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub placement: Placement,
}

impl PlacementTarget {
    /// Build the key for the target's table.
    pub fn table_key(&self) -> String {
        match &self.namespace {
            Some(ns) if self.kind == TargetKind::Namespaced => format!("{ns}/{}", self.name),
            _ => self.name.clone(),
        }
    }

    /// Replace the affinity's cluster names with `active`.
    ///
    /// Creates the affinity when absent; otherwise only `cluster_names`
    /// changes and selectors and exclusions are preserved.
    pub fn apply_active_clusters(&mut self, active: &[String]) {
        match &mut self.placement.cluster_affinity {
            Some(affinity) => affinity.cluster_names = active.to_vec(),
            None => {
                self.placement.cluster_affinity = Some(ClusterAffinity {
                    cluster_names: active.to_vec(),
                    ..Default::default()
                });
            }
        }
    }

    /// Cluster names currently selected by the affinity.
    pub fn cluster_names(&self) -> &[String] {
        self.placement
            .cluster_affinity
            .as_ref()
            .map(|a| a.cluster_names.as_slice())
            .unwrap_or_default()
    }
}

// ── Events ────────────────────────────────────────────────────────

/// Severity of a policy event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

/// Human-readable notification attached to a policy.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyEvent {
    pub policy: PolicyKey,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub reason: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl PolicyEvent {
    pub fn normal(policy: &str, reason: &str, message: impl Into<String>) -> Self {
        Self::new(policy, EventType::Normal, reason, message.into())
    }

    pub fn warning(policy: &str, reason: &str, message: impl Into<String>) -> Self {
        Self::new(policy, EventType::Warning, reason, message.into())
    }

    fn new(policy: &str, event_type: EventType, reason: &str, message: String) -> Self {
        Self {
            policy: policy.to_string(),
            event_type,
            reason: reason.to_string(),
            message,
            timestamp: Utc::now(),
        }
    }
}
