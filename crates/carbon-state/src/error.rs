//! Store errors.
//!
//! redb and serde failures are flattened to strings per stage so callers
//! match on where a call broke, not on the backend's error types.

use thiserror::Error;

use crate::types::PolicyKey;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to open state database: {0}")]
    Open(String),

    #[error("state transaction failed: {0}")]
    Transaction(String),

    #[error("failed to open state table: {0}")]
    Table(String),

    #[error("state read failed: {0}")]
    Read(String),

    #[error("state write failed: {0}")]
    Write(String),

    #[error("failed to encode record: {0}")]
    Serialize(String),

    #[error("failed to decode stored record: {0}")]
    Deserialize(String),

    /// Status write for a policy that is not stored.
    #[error("policy {0} not found")]
    PolicyNotFound(PolicyKey),

    /// A namespaced placement target without a namespace can never be
    /// resolved, so it is rejected on write.
    #[error("namespaced target {name} has no namespace")]
    MissingNamespace { name: String },
}
