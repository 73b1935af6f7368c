//! One reconcile cycle for one carbon-aware policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use tracing::{debug, info, warn};

use carbon_intensity::IntensityFetcher;
use carbon_metrics::{IntensitySample, MetricsReporter};
use carbon_placement::{Selection, rank_clusters};
use carbon_state::{
    CarbonAwarePolicy, ClusterStatus, EventRecorder, IntensityStatus, PolicyClient, PolicyEvent,
    PolicyStatus, TargetClient, TargetKind,
};

use crate::error::ReconcileError;

/// Delay before the next cycle, on success and failure alike.
pub const DEFAULT_REQUEUE_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Upper bound on a single cycle, covering every provider and store call.
pub const DEFAULT_CYCLE_TIMEOUT: Duration = Duration::from_secs(60);

/// How a cycle ended.
#[derive(Debug)]
pub enum Outcome {
    /// Target and status were both written.
    Applied { active: Vec<String> },
    /// The policy no longer exists; nothing was done.
    PolicyNotFound,
    Failed(ReconcileError),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }
}

#[derive(Debug)]
pub struct ReconcileResult {
    pub requeue_after: Duration,
    pub outcome: Outcome,
}

/// Runs reconcile cycles against injected collaborators.
pub struct Reconciler {
    policies: Arc<dyn PolicyClient>,
    targets: Arc<dyn TargetClient>,
    events: Arc<dyn EventRecorder>,
    fetcher: Arc<dyn IntensityFetcher>,
    metrics: Arc<dyn MetricsReporter>,
    requeue_interval: Duration,
    cycle_timeout: Duration,
}

impl Reconciler {
    pub fn new(
        policies: Arc<dyn PolicyClient>,
        targets: Arc<dyn TargetClient>,
        events: Arc<dyn EventRecorder>,
        fetcher: Arc<dyn IntensityFetcher>,
        metrics: Arc<dyn MetricsReporter>,
    ) -> Self {
        Self {
            policies,
            targets,
            events,
            fetcher,
            metrics,
            requeue_interval: DEFAULT_REQUEUE_INTERVAL,
            cycle_timeout: DEFAULT_CYCLE_TIMEOUT,
        }
    }

    pub fn with_requeue_interval(mut self, interval: Duration) -> Self {
        self.requeue_interval = interval;
        self
    }

    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = timeout;
        self
    }

    pub fn requeue_interval(&self) -> Duration {
        self.requeue_interval
    }

    pub fn policies(&self) -> &Arc<dyn PolicyClient> {
        &self.policies
    }

    /// Run one cycle for `key` (`{namespace}/{name}`).
    ///
    /// Never fails: errors are logged, counted and recorded as events, and
    /// the result always carries the fixed requeue delay.
    pub async fn reconcile(&self, key: &str) -> ReconcileResult {
        self.metrics.reconcile_started(key);

        let outcome = match tokio::time::timeout(self.cycle_timeout, self.cycle(key)).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(err)) => self.fail(key, err).await,
            Err(_) => {
                self.fail(key, ReconcileError::DeadlineExceeded(self.cycle_timeout))
                    .await
            }
        };

        ReconcileResult {
            requeue_after: self.requeue_interval,
            outcome,
        }
    }

    async fn cycle(&self, key: &str) -> Result<Outcome, ReconcileError> {
        let policy = self
            .policies
            .get_policy(key)
            .await
            .map_err(|source| ReconcileError::PolicyRead {
                policy: key.to_string(),
                source,
            })?;
        let Some(policy) = policy else {
            info!(policy = %key, "policy not found, skipping");
            self.metrics.record_intensity(key, &[]);
            self.emit(PolicyEvent::warning(
                key,
                "PolicyNotFound",
                format!("policy {key} not found"),
            ))
            .await;
            return Ok(Outcome::PolicyNotFound);
        };
        debug!(
            policy = %key,
            clusters = policy.spec.cluster_locations.len(),
            desired = policy.spec.active_clusters,
            "loaded policy"
        );

        let mut readings = Vec::with_capacity(policy.spec.cluster_locations.len());
        for loc in &policy.spec.cluster_locations {
            let reading = self
                .fetcher
                .fetch(&loc.name, &loc.location)
                .await
                .map_err(|source| ReconcileError::Fetch {
                    cluster: loc.name.clone(),
                    source,
                })?;
            readings.push(reading);
        }

        for missing in readings.iter().filter(|r| !r.reading.is_valid) {
            info!(
                policy = %key,
                cluster = %missing.cluster_name,
                location = %missing.reading.location,
                "no carbon intensity data, excluding cluster"
            );
            self.emit(PolicyEvent::normal(
                key,
                "NoData",
                format!(
                    "no carbon intensity data for location {} of cluster {}",
                    missing.reading.location, missing.cluster_name
                ),
            ))
            .await;
        }

        let selection = rank_clusters(&readings, policy.spec.active_clusters);
        let active = selection.active_names();

        self.apply_target(key, &policy, &active).await?;

        let status = build_status(&selection, self.fetcher.provider(), Utc::now());
        self.policies
            .update_status(key, &status)
            .await
            .map_err(|source| ReconcileError::StatusUpdate { source })?;

        let samples: Vec<IntensitySample> = selection
            .ranked
            .iter()
            .map(|r| IntensitySample {
                cluster: r.cluster_name.clone(),
                location: r.location.clone(),
                active: r.active,
                value: r.reading.value,
            })
            .collect();
        self.metrics.record_intensity(key, &samples);

        info!(policy = %key, active = ?active, "reconciled policy");
        self.emit(PolicyEvent::normal(
            key,
            "Reconciled",
            format!("active clusters: [{}]", active.join(", ")),
        ))
        .await;

        Ok(Outcome::Applied { active })
    }

    /// Resolve the policy's target, merge the active names into its
    /// affinity and write it back.
    async fn apply_target(
        &self,
        key: &str,
        policy: &CarbonAwarePolicy,
        active: &[String],
    ) -> Result<(), ReconcileError> {
        let kind: TargetKind = policy.spec.target_kind.parse().map_err(|_| {
            ReconcileError::UnknownTargetKind {
                kind: policy.spec.target_kind.clone(),
            }
        })?;

        let target_ref = &policy.spec.target_ref;
        let (found, target_id) = match kind {
            TargetKind::ClusterScoped => (
                self.targets.get_cluster_target(&target_ref.name).await,
                target_ref.name.clone(),
            ),
            TargetKind::Namespaced => {
                let namespace = if target_ref.namespace.is_empty() {
                    policy.namespace.as_str()
                } else {
                    target_ref.namespace.as_str()
                };
                (
                    self.targets
                        .get_namespaced_target(namespace, &target_ref.name)
                        .await,
                    format!("{namespace}/{}", target_ref.name),
                )
            }
        };

        let mut target = found
            .map_err(|source| ReconcileError::TargetRead {
                kind,
                target: target_id.clone(),
                source,
            })?
            .ok_or_else(|| ReconcileError::TargetNotFound {
                kind,
                target: target_id.clone(),
            })?;

        let changed = target.cluster_names() != active;
        target.apply_active_clusters(active);
        self.targets
            .update_target(&target)
            .await
            .map_err(|source| ReconcileError::TargetUpdate {
                kind,
                target: target_id.clone(),
                source,
            })?;

        if changed {
            info!(
                policy = %key,
                target = %target_id,
                %kind,
                active = ?active,
                "updated target cluster affinity"
            );
        } else {
            debug!(policy = %key, target = %target_id, "target cluster affinity unchanged");
        }
        Ok(())
    }

    async fn fail(&self, key: &str, err: ReconcileError) -> Outcome {
        self.metrics.reconcile_failed(key);
        warn!(policy = %key, reason = err.reason(), error = %err, "reconcile failed");
        self.emit(PolicyEvent::warning(key, err.reason(), err.to_string()))
            .await;
        Outcome::Failed(err)
    }

    async fn emit(&self, event: PolicyEvent) {
        if let Err(e) = self.events.record(&event).await {
            warn!(
                policy = %event.policy,
                reason = %event.reason,
                error = %e,
                "failed to record event"
            );
        }
    }
}

/// Status for a ranked cycle: ranked clusters first, then clusters without
/// data with an empty intensity.
pub fn build_status(selection: &Selection, provider: &str, now: DateTime<Utc>) -> PolicyStatus {
    let ranked = selection.ranked.iter().map(|r| ClusterStatus {
        name: r.cluster_name.clone(),
        location: r.location.clone(),
        carbon_intensity: IntensityStatus::from_reading(&r.reading),
    });
    let excluded = selection.excluded.iter().map(|c| ClusterStatus {
        name: c.cluster_name.clone(),
        location: c.reading.location.clone(),
        carbon_intensity: IntensityStatus::from_reading(&c.reading),
    });

    PolicyStatus {
        active_clusters: selection.active_names(),
        clusters: ranked.chain(excluded).collect(),
        provider: provider.to_string(),
        last_reconciled: Some(now.to_rfc3339_opts(SecondsFormat::Secs, true)),
    }
}
