//! carbon-state: policies, placement targets, and events for the
//! carbon-aware operator.
//!
//! Backed by [redb](https://docs.rs/redb), provides persistent and in-memory
//! storage for carbon-aware policies (spec + status), the downstream
//! placement targets whose cluster affinity the operator rewrites, and the
//! per-policy event log.
//!
//! # Architecture
//!
//! All domain types are JSON-serialized into redb's `&[u8]` value columns.
//! Composite keys (`{namespace}/{name}`, `{policy}:{seq}`) enable prefix
//! scans for related records.
//!
//! The reconciler never touches `StateStore` directly. It talks to the
//! collaborator traits in [`client`] (`PolicyClient`, `TargetClient`,
//! `EventRecorder`), which `StateStore` implements and tests fake.

pub mod client;
pub mod error;
pub mod store;
pub mod tables;
pub mod types;

pub use client::{BoxFuture, EventRecorder, PolicyClient, TargetClient};
pub use error::{StoreError, StoreResult};
pub use store::StateStore;
pub use types::*;
