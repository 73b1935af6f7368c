//! Failures that end a reconcile cycle early.

use std::time::Duration;

use thiserror::Error;

use carbon_intensity::FetchError;
use carbon_state::{StoreError, TargetKind};

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to read policy {policy}: {source}")]
    PolicyRead {
        policy: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to fetch carbon intensity for cluster {cluster}: {source}")]
    Fetch {
        cluster: String,
        #[source]
        source: FetchError,
    },

    #[error("unknown target kind {kind:?}")]
    UnknownTargetKind { kind: String },

    #[error("{kind} {target} not found")]
    TargetNotFound { kind: TargetKind, target: String },

    #[error("failed to read {kind} {target}: {source}")]
    TargetRead {
        kind: TargetKind,
        target: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to update {kind} {target}: {source}")]
    TargetUpdate {
        kind: TargetKind,
        target: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to update status: {source}")]
    StatusUpdate {
        #[source]
        source: StoreError,
    },

    #[error("cycle exceeded deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl ReconcileError {
    /// Short machine-readable reason used for events.
    pub fn reason(&self) -> &'static str {
        match self {
            ReconcileError::PolicyRead { .. } => "PolicyReadFailed",
            ReconcileError::Fetch { .. } => "FetchFailed",
            ReconcileError::UnknownTargetKind { .. } => "UnknownTargetKind",
            ReconcileError::TargetNotFound { .. } => "TargetNotFound",
            ReconcileError::TargetRead { .. } => "TargetReadFailed",
            ReconcileError::TargetUpdate { .. } => "TargetUpdateFailed",
            ReconcileError::StatusUpdate { .. } => "StatusUpdateFailed",
            ReconcileError::DeadlineExceeded(_) => "DeadlineExceeded",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_target() {
        let err = ReconcileError::TargetNotFound {
            kind: TargetKind::Namespaced,
            target: "default/web".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "propagationpolicies.policy.karmada.io default/web not found"
        );
        assert_eq!(err.reason(), "TargetNotFound");

        let err = ReconcileError::UnknownTargetKind {
            kind: "deployments.apps".to_string(),
        };
        assert_eq!(err.to_string(), "unknown target kind \"deployments.apps\"");
    }
}
