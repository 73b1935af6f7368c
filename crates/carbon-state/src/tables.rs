//! redb table definitions for the carbon-aware state store.
//!
//! Each table uses `&str` keys and `&[u8]` values (JSON-serialized domain types).

use redb::TableDefinition;

/// Carbon-aware policies keyed by `{namespace}/{name}`.
pub const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");

/// Cluster-scoped placement targets keyed by `{name}`.
pub const CLUSTER_TARGETS: TableDefinition<&str, &[u8]> = TableDefinition::new("cluster_targets");

/// Namespace-scoped placement targets keyed by `{namespace}/{name}`.
pub const NAMESPACED_TARGETS: TableDefinition<&str, &[u8]> =
    TableDefinition::new("namespaced_targets");

/// Policy events keyed by `{policy}:{sequence:020}`.
pub const EVENTS: TableDefinition<&str, &[u8]> = TableDefinition::new("events");
