//! carbon-controller: the carbon-aware reconcile loop.
//!
//! One cycle for a policy runs:
//!
//! ```text
//! Load → Fetch-all → Rank-Select → Resolve-Target → Apply-Target → Persist-Status → Report
//! ```
//!
//! and always asks to be requeued after the same fixed interval, whatever
//! the outcome. [`Reconciler`] implements one cycle; [`Controller`] drives
//! cycles for every known policy on a timer, with at most one cycle in
//! flight per policy.

pub mod controller;
pub mod error;
pub mod reconciler;

pub use controller::{Controller, ControllerHandle};
pub use error::ReconcileError;
pub use reconciler::{
    DEFAULT_CYCLE_TIMEOUT, DEFAULT_REQUEUE_INTERVAL, Outcome, ReconcileResult, Reconciler,
};
