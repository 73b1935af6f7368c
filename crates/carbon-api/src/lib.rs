//! carbon-api: REST API for the carbon-aware operator.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/policies` | List policies |
//! | POST | `/api/v1/policies` | Create or replace a policy |
//! | GET | `/api/v1/policies/{namespace}/{name}` | Policy with status |
//! | GET | `/api/v1/policies/{namespace}/{name}/events` | Recent events |
//! | GET | `/api/v1/targets` | List placement targets |
//! | POST | `/api/v1/targets` | Create or replace a placement target |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use carbon_metrics::OperatorMetrics;
use carbon_state::StateStore;

/// Called with a policy key after the policy is written.
pub type PolicyTrigger = Arc<dyn Fn(&str) + Send + Sync>;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    pub metrics: Arc<OperatorMetrics>,
    pub on_policy_change: Option<PolicyTrigger>,
}

impl ApiState {
    pub fn new(store: StateStore, metrics: Arc<OperatorMetrics>) -> Self {
        Self {
            store,
            metrics,
            on_policy_change: None,
        }
    }

    pub fn with_trigger(mut self, trigger: PolicyTrigger) -> Self {
        self.on_policy_change = Some(trigger);
        self
    }
}

/// Build the complete API router (REST + metrics + health).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route(
            "/policies",
            get(handlers::list_policies).post(handlers::apply_policy),
        )
        .route("/policies/{namespace}/{name}", get(handlers::get_policy))
        .route(
            "/policies/{namespace}/{name}/events",
            get(handlers::list_events),
        )
        .route(
            "/targets",
            get(handlers::list_targets).post(handlers::apply_target),
        )
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
        .route("/healthz", get(handlers::healthz))
}
