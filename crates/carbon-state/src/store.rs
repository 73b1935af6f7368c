//! StateStore: redb-backed persistence for carbon-aware policies.
//!
//! Provides typed CRUD operations over policies, placement targets, and
//! policy events. All values are JSON-serialized into redb's `&[u8]` value
//! columns. The store supports both on-disk and in-memory backends (the
//! latter for testing).

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::tables::*;
use crate::types::*;

/// Events kept per policy; older ones are pruned on insert.
pub const MAX_EVENTS_PER_POLICY: usize = 100;

/// Convert any `Display` error into a `StoreError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StoreError::$variant(e.to_string())
    };
}

/// Thread-safe state store backed by redb.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    /// Monotonic suffix for event keys, seeded from the wall clock.
    event_seq: Arc<AtomicU64>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!(?path, "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StoreResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db);
        store.ensure_tables()?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> Self {
        let seed = u64::try_from(Utc::now().timestamp_micros()).unwrap_or_default();
        Self {
            db: Arc::new(db),
            event_seq: Arc::new(AtomicU64::new(seed)),
        }
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(POLICIES).map_err(map_err!(Table))?;
        txn.open_table(CLUSTER_TARGETS).map_err(map_err!(Table))?;
        txn.open_table(NAMESPACED_TARGETS).map_err(map_err!(Table))?;
        txn.open_table(EVENTS).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Policies ───────────────────────────────────────────────────

    /// Insert or replace a policy, status included.
    pub fn put_policy(&self, policy: &CarbonAwarePolicy) -> StoreResult<()> {
        let key = policy.table_key();
        let value = serde_json::to_vec(policy).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "policy stored");
        Ok(())
    }

    /// Insert a policy or replace its spec, keeping any existing status.
    pub fn apply_policy(&self, policy: &CarbonAwarePolicy) -> StoreResult<CarbonAwarePolicy> {
        let key = policy.table_key();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let merged;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            let existing: Option<CarbonAwarePolicy> =
                match table.get(key.as_str()).map_err(map_err!(Read))? {
                    Some(guard) => {
                        Some(serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?)
                    }
                    None => None,
                };
            let mut next = policy.clone();
            if let Some(existing) = existing {
                next.status = existing.status;
            }
            let value = serde_json::to_vec(&next).map_err(map_err!(Serialize))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
            merged = next;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, "policy applied");
        Ok(merged)
    }

    /// Get a policy by namespace/name key.
    pub fn get_policy(&self, key: &str) -> StoreResult<Option<CarbonAwarePolicy>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let policy: CarbonAwarePolicy =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(policy))
            }
            None => Ok(None),
        }
    }

    /// List all policies.
    pub fn list_policies(&self) -> StoreResult<Vec<CarbonAwarePolicy>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let policy: CarbonAwarePolicy =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(policy);
        }
        Ok(results)
    }

    /// Delete a policy by key. Returns true if it existed.
    pub fn delete_policy(&self, key: &str) -> StoreResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            existed = table.remove(key).map_err(map_err!(Write))?.is_some();
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, existed, "policy deleted");
        Ok(existed)
    }

    /// Overwrite a policy's status, leaving its spec untouched.
    pub fn update_policy_status(&self, key: &str, status: &PolicyStatus) -> StoreResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(POLICIES).map_err(map_err!(Table))?;
            let mut policy: CarbonAwarePolicy = match table.get(key).map_err(map_err!(Read))? {
                Some(guard) => {
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?
                }
                None => return Err(StoreError::PolicyNotFound(key.to_string())),
            };
            policy.status = status.clone();
            let value = serde_json::to_vec(&policy).map_err(map_err!(Serialize))?;
            table.insert(key, value.as_slice()).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, active = ?status.active_clusters, "policy status updated");
        Ok(())
    }

    // ── Targets ────────────────────────────────────────────────────

    /// Insert or replace a placement target in the table matching its kind.
    ///
    /// A namespaced target must carry a non-empty namespace.
    pub fn put_target(&self, target: &PlacementTarget) -> StoreResult<()> {
        if target.kind == TargetKind::Namespaced
            && target.namespace.as_deref().is_none_or(str::is_empty)
        {
            return Err(StoreError::MissingNamespace {
                name: target.name.clone(),
            });
        }
        let key = target.table_key();
        let table_def = match target.kind {
            TargetKind::ClusterScoped => CLUSTER_TARGETS,
            TargetKind::Namespaced => NAMESPACED_TARGETS,
        };
        let value = serde_json::to_vec(target).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(table_def).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(%key, kind = %target.kind, "placement target stored");
        Ok(())
    }

    /// Get a cluster-scoped target by name.
    pub fn get_cluster_target(&self, name: &str) -> StoreResult<Option<PlacementTarget>> {
        self.get_target_from(CLUSTER_TARGETS, name)
    }

    /// Get a namespace-scoped target by namespace and name.
    pub fn get_namespaced_target(
        &self,
        namespace: &str,
        name: &str,
    ) -> StoreResult<Option<PlacementTarget>> {
        self.get_target_from(NAMESPACED_TARGETS, &format!("{namespace}/{name}"))
    }

    fn get_target_from(
        &self,
        table_def: redb::TableDefinition<'static, &'static str, &'static [u8]>,
        key: &str,
    ) -> StoreResult<Option<PlacementTarget>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(table_def).map_err(map_err!(Table))?;
        match table.get(key).map_err(map_err!(Read))? {
            Some(guard) => {
                let target: PlacementTarget =
                    serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
                Ok(Some(target))
            }
            None => Ok(None),
        }
    }

    /// List all placement targets, cluster-scoped first.
    pub fn list_targets(&self) -> StoreResult<Vec<PlacementTarget>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let mut results = Vec::new();
        for table_def in [CLUSTER_TARGETS, NAMESPACED_TARGETS] {
            let table = txn.open_table(table_def).map_err(map_err!(Table))?;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (_, value) = entry.map_err(map_err!(Read))?;
                let target: PlacementTarget =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                results.push(target);
            }
        }
        Ok(results)
    }

    // ── Events ─────────────────────────────────────────────────────

    /// Append an event, pruning the policy's oldest events beyond
    /// [`MAX_EVENTS_PER_POLICY`].
    pub fn put_event(&self, event: &PolicyEvent) -> StoreResult<()> {
        let seq = self.event_seq.fetch_add(1, Ordering::Relaxed);
        let prefix = format!("{}:", event.policy);
        let key = format!("{prefix}{seq:020}");
        let value = serde_json::to_vec(event).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
            table
                .insert(key.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;

            let mut keys = Vec::new();
            for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
                let (k, _) = entry.map_err(map_err!(Read))?;
                if !k.value().starts_with(&prefix) {
                    break;
                }
                keys.push(k.value().to_string());
            }
            let excess = keys.len().saturating_sub(MAX_EVENTS_PER_POLICY);
            for old in &keys[..excess] {
                table.remove(old.as_str()).map_err(map_err!(Write))?;
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Most recent events for a policy, oldest first.
    pub fn list_events(&self, policy: &str, limit: usize) -> StoreResult<Vec<PolicyEvent>> {
        let prefix = format!("{policy}:");
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(EVENTS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.range(prefix.as_str()..).map_err(map_err!(Read))? {
            let (key, value) = entry.map_err(map_err!(Read))?;
            if !key.value().starts_with(&prefix) {
                break;
            }
            let event: PolicyEvent =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(event);
        }
        let skip = results.len().saturating_sub(limit);
        Ok(results.split_off(skip))
    }
}
