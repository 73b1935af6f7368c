//! carbon-metrics: reconcile counters and carbon intensity gauges.
//!
//! # Architecture
//!
//! ```text
//! OperatorMetrics (implements MetricsReporter)
//!   ├── reconcile_started() ← once per cycle attempt
//!   ├── reconcile_failed()  ← once per failed cycle
//!   ├── record_intensity()  ← replaces a policy's gauge series per cycle
//!   └── snapshot() → MetricsSnapshot
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod collector;
pub mod prometheus;

pub use collector::{IntensitySample, MetricsReporter, MetricsSnapshot, OperatorMetrics};
pub use prometheus::render_prometheus;
