//! Periodic driver for reconcile cycles.
//!
//! Every tick (and once at start) the controller lists all policies and
//! starts a cycle for each one not already running. Cycles for distinct
//! policies run concurrently; a policy never has two cycles in flight.
//! [`ControllerHandle::trigger`] asks for an immediate cycle, which is
//! queued behind a running one for the same policy.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use carbon_state::PolicyKey;

use crate::reconciler::{Outcome, Reconciler};

/// Cheap handle for requesting cycles from outside the run loop.
#[derive(Clone)]
pub struct ControllerHandle {
    tx: mpsc::UnboundedSender<PolicyKey>,
}

impl ControllerHandle {
    /// Request an immediate cycle for `key`. Returns false once the
    /// controller has stopped.
    pub fn trigger(&self, key: &str) -> bool {
        self.tx.send(key.to_string()).is_ok()
    }
}

/// Reports a cycle's key back to the run loop when the task ends, including
/// by panic.
struct CycleGuard {
    key: PolicyKey,
    done: mpsc::UnboundedSender<PolicyKey>,
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        let _ = self.done.send(std::mem::take(&mut self.key));
    }
}

pub struct Controller {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    triggers: mpsc::UnboundedReceiver<PolicyKey>,
    done_tx: mpsc::UnboundedSender<PolicyKey>,
    done_rx: mpsc::UnboundedReceiver<PolicyKey>,
    in_flight: HashSet<PolicyKey>,
    pending: HashSet<PolicyKey>,
    tasks: JoinSet<()>,
}

impl Controller {
    /// Create a controller that resyncs every `reconciler.requeue_interval()`.
    pub fn new(reconciler: Arc<Reconciler>) -> (Self, ControllerHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let controller = Self {
            interval: reconciler.requeue_interval(),
            reconciler,
            triggers: rx,
            done_tx,
            done_rx,
            in_flight: HashSet::new(),
            pending: HashSet::new(),
            tasks: JoinSet::new(),
        };
        (controller, ControllerHandle { tx })
    }

    /// Run until `shutdown` changes, then wait for running cycles to finish.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "controller started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => self.resync().await,
                Some(key) = self.triggers.recv() => {
                    if self.in_flight.contains(&key) {
                        debug!(policy = %key, "cycle running, queueing trigger");
                        self.pending.insert(key);
                    } else {
                        self.spawn_cycle(key);
                    }
                }
                Some(key) = self.done_rx.recv() => self.finished(key),
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => {
                    if let Err(e) = joined {
                        warn!(error = %e, "reconcile task panicked");
                    }
                }
                _ = shutdown.changed() => {
                    info!(running = self.tasks.len(), "controller shutting down");
                    break;
                }
            }
        }

        while let Some(joined) = self.tasks.join_next().await {
            if let Err(e) = joined {
                warn!(error = %e, "reconcile task failed during shutdown");
            }
        }
    }

    async fn resync(&mut self) {
        let keys = match self.reconciler.policies().list_policy_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                warn!(error = %e, "failed to list policies");
                return;
            }
        };
        debug!(policies = keys.len(), "resync");

        for key in keys {
            if !self.in_flight.contains(&key) {
                self.spawn_cycle(key);
            }
        }
    }

    fn spawn_cycle(&mut self, key: PolicyKey) {
        self.in_flight.insert(key.clone());
        let reconciler = self.reconciler.clone();
        let guard = CycleGuard {
            key,
            done: self.done_tx.clone(),
        };
        self.tasks.spawn(async move {
            let result = reconciler.reconcile(&guard.key).await;
            if let Outcome::Applied { active } = &result.outcome {
                debug!(
                    policy = %guard.key,
                    active = ?active,
                    requeue_secs = result.requeue_after.as_secs(),
                    "cycle complete"
                );
            }
        });
    }

    fn finished(&mut self, key: PolicyKey) {
        self.in_flight.remove(&key);
        if self.pending.remove(&key) {
            self.spawn_cycle(key);
        }
    }
}
