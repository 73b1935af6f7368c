//! REST API handlers.
//!
//! Each handler reads/writes via `StateStore` and returns JSON responses.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use tracing::{debug, info};

use carbon_state::*;

use crate::ApiState;

const DEFAULT_EVENT_LIMIT: usize = 50;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Policies ───────────────────────────────────────────────────

/// GET /api/v1/policies
pub async fn list_policies(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_policies() {
        Ok(policies) => ApiResponse::ok(policies).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// GET /api/v1/policies/{namespace}/{name}
pub async fn get_policy(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
) -> impl IntoResponse {
    match state.store.get_policy(&format!("{namespace}/{name}")) {
        Ok(Some(policy)) => ApiResponse::ok(policy).into_response(),
        Ok(None) => error_response("policy not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/policies
///
/// Replaces the spec of an existing policy and keeps its status.
pub async fn apply_policy(
    State(state): State<ApiState>,
    Json(policy): Json<CarbonAwarePolicy>,
) -> impl IntoResponse {
    if policy.namespace.is_empty() || policy.name.is_empty() {
        return error_response("namespace and name are required", StatusCode::BAD_REQUEST)
            .into_response();
    }

    match state.store.apply_policy(&policy) {
        Ok(stored) => {
            let key = stored.table_key();
            info!(policy = %key, "policy applied");
            if let Some(trigger) = &state.on_policy_change {
                trigger(&key);
            }
            (StatusCode::CREATED, ApiResponse::ok(stored)).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// Query parameters for the events endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct EventsQuery {
    pub limit: Option<usize>,
}

/// GET /api/v1/policies/{namespace}/{name}/events
pub async fn list_events(
    State(state): State<ApiState>,
    Path((namespace, name)): Path<(String, String)>,
    Query(query): Query<EventsQuery>,
) -> impl IntoResponse {
    let key = format!("{namespace}/{name}");
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    match state.store.list_events(&key, limit) {
        Ok(events) => ApiResponse::ok(events).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Targets ────────────────────────────────────────────────────

/// GET /api/v1/targets
pub async fn list_targets(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.list_targets() {
        Ok(targets) => ApiResponse::ok(targets).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/targets
pub async fn apply_target(
    State(state): State<ApiState>,
    Json(mut target): Json<PlacementTarget>,
) -> impl IntoResponse {
    if target.name.is_empty() {
        return error_response("name is required", StatusCode::BAD_REQUEST).into_response();
    }
    match target.kind {
        TargetKind::Namespaced if target.namespace.as_deref().is_none_or(str::is_empty) => {
            return error_response(
                "namespace is required for namespaced targets",
                StatusCode::BAD_REQUEST,
            )
            .into_response();
        }
        TargetKind::ClusterScoped => target.namespace = None,
        TargetKind::Namespaced => {}
    }

    match state.store.put_target(&target) {
        Ok(()) => {
            debug!(target = %target.table_key(), kind = %target.kind, "target applied");
            (StatusCode::CREATED, ApiResponse::ok(target)).into_response()
        }
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Observability ──────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let body = carbon_metrics::render_prometheus(&state.metrics.snapshot());
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// GET /healthz
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    use carbon_metrics::{MetricsReporter, OperatorMetrics};

    fn test_state() -> ApiState {
        let store = StateStore::open_in_memory().unwrap();
        ApiState::new(store, Arc::new(OperatorMetrics::new()))
    }

    fn test_policy(ns: &str, name: &str) -> CarbonAwarePolicy {
        CarbonAwarePolicy {
            namespace: ns.to_string(),
            name: name.to_string(),
            spec: PolicySpec {
                active_clusters: 1,
                cluster_locations: vec![ClusterLocation {
                    name: "alpha".to_string(),
                    location: "DE".to_string(),
                }],
                target_kind: CLUSTER_SCOPED_KIND.to_string(),
                target_ref: TargetRef {
                    name: "global".to_string(),
                    namespace: String::new(),
                },
            },
            status: PolicyStatus::default(),
        }
    }

    #[tokio::test]
    async fn list_policies_empty() {
        let resp = list_policies(State(test_state())).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn apply_and_get_policy() {
        let state = test_state();
        let resp = apply_policy(State(state.clone()), Json(test_policy("default", "green")))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = get_policy(
            State(state),
            Path(("default".to_string(), "green".to_string())),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn apply_policy_fires_trigger() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let state = test_state().with_trigger(Arc::new(move |key: &str| {
            sink.lock().unwrap().push(key.to_string());
        }));

        apply_policy(State(state), Json(test_policy("prod", "web"))).await;
        assert_eq!(*seen.lock().unwrap(), vec!["prod/web".to_string()]);
    }

    #[tokio::test]
    async fn apply_policy_requires_identity() {
        let resp = apply_policy(State(test_state()), Json(test_policy("", "green")))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_nonexistent_policy() {
        let resp = get_policy(
            State(test_state()),
            Path(("default".to_string(), "nope".to_string())),
        )
        .await
        .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn namespaced_target_requires_namespace() {
        let target = PlacementTarget {
            kind: TargetKind::Namespaced,
            name: "web".to_string(),
            namespace: None,
            placement: Placement::default(),
        };
        let resp = apply_target(State(test_state()), Json(target))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn cluster_target_drops_namespace() {
        let state = test_state();
        let target = PlacementTarget {
            kind: TargetKind::ClusterScoped,
            name: "global".to_string(),
            namespace: Some("ignored".to_string()),
            placement: Placement::default(),
        };
        let resp = apply_target(State(state.clone()), Json(target))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let stored = state.store.get_cluster_target("global").unwrap().unwrap();
        assert_eq!(stored.namespace, None);
    }

    #[tokio::test]
    async fn prometheus_endpoint_returns_text() {
        let state = test_state();
        state.metrics.reconcile_started("default/green");
        let resp = prometheus_metrics(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let content_type = resp.headers().get("content-type").unwrap().to_str().unwrap();
        assert!(content_type.contains("text/plain"));
    }
}
