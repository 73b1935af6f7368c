//! Carbon-aware ranking: orders clusters by grid carbon intensity and picks
//! the greenest ones as active placement targets.
//!
//! This crate is pure computation. It does not fetch readings or touch
//! placement targets; the controller feeds it one cycle's readings and
//! applies the resulting [`Selection`].

pub mod ranking;

pub use ranking::{ClusterRanking, Selection, rank_clusters};
