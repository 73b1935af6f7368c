//! JSON manifests of policies and placement targets for `carbond apply`.

use std::path::Path;

use anyhow::{Context, bail};
use serde::Deserialize;
use tracing::info;

use carbon_state::{CarbonAwarePolicy, PlacementTarget, StateStore, TargetKind};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub policies: Vec<CarbonAwarePolicy>,
    pub targets: Vec<PlacementTarget>,
}

impl Manifest {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        serde_json::from_slice(&content)
            .with_context(|| format!("invalid manifest {}", path.display()))
    }

    /// Write every target then every policy. Existing policy status is kept.
    /// Returns (policies, targets) written.
    pub fn apply(&self, store: &StateStore) -> anyhow::Result<(usize, usize)> {
        for target in &self.targets {
            if target.kind == TargetKind::Namespaced
                && target.namespace.as_deref().is_none_or(str::is_empty)
            {
                bail!("namespaced target {} has no namespace", target.name);
            }
            store.put_target(target)?;
            info!(target = %target.table_key(), kind = %target.kind, "target applied");
        }
        for policy in &self.policies {
            if policy.namespace.is_empty() || policy.name.is_empty() {
                bail!("policy is missing namespace or name");
            }
            store.apply_policy(policy)?;
            info!(policy = %policy.table_key(), "policy applied");
        }
        Ok((self.policies.len(), self.targets.len()))
    }
}
