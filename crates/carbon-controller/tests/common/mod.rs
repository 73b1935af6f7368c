//! Shared fakes for the controller integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{TimeDelta, Utc};

use carbon_controller::Reconciler;
use carbon_intensity::{FetchError, FetchResult, IntensityFetcher, ProviderError};
use carbon_metrics::OperatorMetrics;
use carbon_state::*;

/// What the fake fetcher answers for a location.
#[derive(Clone)]
pub enum Answer {
    Value(f64),
    NoData,
    Fail,
    Hang,
}

#[derive(Default)]
pub struct FakeFetcher {
    answers: Mutex<HashMap<String, Answer>>,
    pub calls: AtomicUsize,
}

impl FakeFetcher {
    pub fn new(answers: &[(&str, Answer)]) -> Self {
        let fetcher = Self::default();
        for (location, answer) in answers {
            fetcher.set(location, answer.clone());
        }
        fetcher
    }

    pub fn set(&self, location: &str, answer: Answer) {
        self.answers
            .lock()
            .unwrap()
            .insert(location.to_string(), answer);
    }
}

impl IntensityFetcher for FakeFetcher {
    fn fetch<'a>(
        &'a self,
        cluster_name: &'a str,
        location: &'a str,
    ) -> BoxFuture<'a, FetchResult<ClusterCarbonIntensity>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self
                .answers
                .lock()
                .unwrap()
                .get(location)
                .cloned()
                .unwrap_or(Answer::NoData);

            let reading = match answer {
                Answer::Value(value) => {
                    let now = Utc::now();
                    IntensityReading {
                        is_valid: true,
                        location: location.to_string(),
                        units: "gCO2e/kWh".to_string(),
                        valid_from: now,
                        valid_to: now + TimeDelta::hours(1),
                        value,
                    }
                }
                Answer::NoData => IntensityReading::invalid(location),
                Answer::Fail => {
                    return Err(FetchError {
                        provider: "fake".to_string(),
                        location: location.to_string(),
                        source: ProviderError::Request("connection reset".to_string()),
                    });
                }
                Answer::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    IntensityReading::invalid(location)
                }
            };

            Ok(ClusterCarbonIntensity {
                cluster_name: cluster_name.to_string(),
                reading,
            })
        })
    }

    fn provider(&self) -> &str {
        "fake"
    }
}

/// Policy client over a real store whose status writes can be made to fail.
pub struct FlakyPolicies {
    pub store: StateStore,
    pub fail_status: AtomicBool,
}

impl PolicyClient for FlakyPolicies {
    fn get_policy<'a>(
        &'a self,
        key: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<CarbonAwarePolicy>>> {
        PolicyClient::get_policy(&self.store, key)
    }

    fn list_policy_keys(&self) -> BoxFuture<'_, StoreResult<Vec<PolicyKey>>> {
        PolicyClient::list_policy_keys(&self.store)
    }

    fn update_status<'a>(
        &'a self,
        key: &'a str,
        status: &'a PolicyStatus,
    ) -> BoxFuture<'a, StoreResult<()>> {
        if self.fail_status.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(StoreError::Write("status subresource unavailable".to_string()))
            });
        }
        PolicyClient::update_status(&self.store, key, status)
    }
}

/// Target client over a real store whose writes can be made to fail.
pub struct FlakyTargets {
    pub store: StateStore,
    pub fail_update: AtomicBool,
}

impl TargetClient for FlakyTargets {
    fn get_cluster_target<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<PlacementTarget>>> {
        TargetClient::get_cluster_target(&self.store, name)
    }

    fn get_namespaced_target<'a>(
        &'a self,
        namespace: &'a str,
        name: &'a str,
    ) -> BoxFuture<'a, StoreResult<Option<PlacementTarget>>> {
        TargetClient::get_namespaced_target(&self.store, namespace, name)
    }

    fn update_target<'a>(&'a self, target: &'a PlacementTarget) -> BoxFuture<'a, StoreResult<()>> {
        if self.fail_update.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(StoreError::Write("admission webhook denied the update".to_string()))
            });
        }
        TargetClient::update_target(&self.store, target)
    }
}

pub struct Harness {
    pub store: StateStore,
    pub policies: Arc<FlakyPolicies>,
    pub targets: Arc<FlakyTargets>,
    pub fetcher: Arc<FakeFetcher>,
    pub metrics: Arc<OperatorMetrics>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new(fetcher: FakeFetcher) -> Self {
        let store = StateStore::open_in_memory().unwrap();
        let policies = Arc::new(FlakyPolicies {
            store: store.clone(),
            fail_status: AtomicBool::new(false),
        });
        let targets = Arc::new(FlakyTargets {
            store: store.clone(),
            fail_update: AtomicBool::new(false),
        });
        let fetcher = Arc::new(fetcher);
        let metrics = Arc::new(OperatorMetrics::new());
        let reconciler = Reconciler::new(
            policies.clone(),
            targets.clone(),
            Arc::new(store.clone()),
            fetcher.clone(),
            metrics.clone(),
        );
        Self {
            store,
            policies,
            targets,
            fetcher,
            metrics,
            reconciler,
        }
    }

    pub fn events(&self, key: &str) -> Vec<PolicyEvent> {
        self.store.list_events(key, 100).unwrap()
    }

    pub fn reasons(&self, key: &str) -> Vec<String> {
        self.events(key).into_iter().map(|e| e.reason).collect()
    }
}

pub fn policy(
    ns: &str,
    name: &str,
    desired: i32,
    clusters: &[(&str, &str)],
    target_kind: &str,
    target: TargetRef,
) -> CarbonAwarePolicy {
    CarbonAwarePolicy {
        namespace: ns.to_string(),
        name: name.to_string(),
        spec: PolicySpec {
            active_clusters: desired,
            cluster_locations: clusters
                .iter()
                .map(|(name, location)| ClusterLocation {
                    name: name.to_string(),
                    location: location.to_string(),
                })
                .collect(),
            target_kind: target_kind.to_string(),
            target_ref: target,
        },
        status: PolicyStatus::default(),
    }
}

pub fn cluster_target(name: &str) -> PlacementTarget {
    PlacementTarget {
        kind: TargetKind::ClusterScoped,
        name: name.to_string(),
        namespace: None,
        placement: Placement::default(),
    }
}

pub fn abc_policy() -> CarbonAwarePolicy {
    policy(
        "default",
        "green",
        2,
        &[("a", "loc1"), ("b", "loc2"), ("c", "loc3")],
        CLUSTER_SCOPED_KIND,
        TargetRef {
            name: "global".to_string(),
            namespace: String::new(),
        },
    )
}
