//! Collaborator traits the reconciler depends on.
//!
//! Each method is a potential network round-trip in a real deployment, so
//! all of them return boxed `Send` futures. That keeps the traits object
//! safe: the reconciler holds `Arc<dyn PolicyClient>` and tests swap in
//! fakes that fail on demand.
//!
//! Reads report "not found" as `Ok(None)` so callers can tell it apart from
//! transport or decoding failures.

use std::future::Future;
use std::pin::Pin;

use crate::error::StoreResult;
use crate::store::StateStore;
use crate::types::*;

/// Boxed future alias used across the collaborator traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Read policies and write their status.
pub trait PolicyClient: Send + Sync {
    /// Load a policy by `{namespace}/{name}` key.
    fn get_policy<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<CarbonAwarePolicy>>>;

    /// Keys of every known policy.
    fn list_policy_keys(&self) -> BoxFuture<'_, StoreResult<Vec<PolicyKey>>>;

    /// Overwrite a policy's status wholesale.
    fn update_status<'a>(
        &'a self,
        key: &'a str,
        status: &'a PolicyStatus,
    ) -> BoxFuture<'a, StoreResult<()>>;
}

/// Read and persist placement targets, one resolver per target shape.
pub trait TargetClient: Send + Sync {
    fn get_cluster_target<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<PlacementTarget>>>;

    fn get_namespaced_target<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<PlacementTarget>>>;

    fn update_target<'a>(&'a self, target: &'a PlacementTarget) -> BoxFuture<'a, StoreResult<()>>;
}

/// Sink for human-readable policy events.
pub trait EventRecorder: Send + Sync {
    fn record<'a>(&'a self, event: &'a PolicyEvent) -> BoxFuture<'a, StoreResult<()>>;
}

impl PolicyClient for StateStore {
    fn get_policy<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<CarbonAwarePolicy>>> {
        Box::pin(async move { StateStore::get_policy(self, key) })
    }

    fn list_policy_keys(&self) -> BoxFuture<'_, StoreResult<Vec<PolicyKey>>> {
        Box::pin(async move {
            let policies = self.list_policies()?;
            Ok(policies.iter().map(CarbonAwarePolicy::table_key).collect())
        })
    }

    fn update_status<'a>(
        &'a self,
        key: &'a str,
        status: &'a PolicyStatus,
    ) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move { self.update_policy_status(key, status) })
    }
}

impl TargetClient for StateStore {
    fn get_cluster_target<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<PlacementTarget>>> {
        Box::pin(async move { StateStore::get_cluster_target(self, name) })
    }

    fn get_namespaced_target<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<PlacementTarget>>> {
        Box::pin(async move { StateStore::get_namespaced_target(self, namespace, name) })
    }

    fn update_target<'a>(&'a self, target: &'a PlacementTarget) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move { self.put_target(target) })
    }
}

impl EventRecorder for StateStore {
    fn record<'a>(&'a self, event: &'a PolicyEvent) -> BoxFuture<'a, StoreResult<()>> {
        Box::pin(async move { self.put_event(event) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CarbonAwarePolicy {
        CarbonAwarePolicy {
            namespace: "default".to_string(),
            name: "green".to_string(),
            spec: PolicySpec {
                active_clusters: 1,
                cluster_locations: vec![],
                target_kind: CLUSTER_SCOPED_KIND.to_string(),
                target_ref: TargetRef {
                    name: "global".to_string(),
                    namespace: String::new(),
                },
            },
            status: PolicyStatus::default(),
        }
    }

    #[tokio::test]
    async fn store_serves_policy_client() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_policy(&policy()).unwrap();
        let client: &dyn PolicyClient = &store;

        assert_eq!(client.list_policy_keys().await.unwrap(), vec!["default/green"]);
        assert!(client.get_policy("default/green").await.unwrap().is_some());
        assert!(client.get_policy("default/other").await.unwrap().is_none());

        let status = PolicyStatus {
            provider: "electricitymap".to_string(),
            ..Default::default()
        };
        client.update_status("default/green", &status).await.unwrap();
        let stored = store.get_policy("default/green").unwrap().unwrap();
        assert_eq!(stored.status.provider, "electricitymap");
    }

    #[tokio::test]
    async fn store_serves_target_client() {
        let store = StateStore::open_in_memory().unwrap();
        let client: &dyn TargetClient = &store;
        let target = PlacementTarget {
            kind: TargetKind::ClusterScoped,
            name: "global".to_string(),
            namespace: None,
            placement: Placement::default(),
        };

        assert!(client.get_cluster_target("global").await.unwrap().is_none());
        client.update_target(&target).await.unwrap();
        assert_eq!(client.get_cluster_target("global").await.unwrap(), Some(target));
        assert!(client.get_namespaced_target("default", "global").await.unwrap().is_none());
    }
}
