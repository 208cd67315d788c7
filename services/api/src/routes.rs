use crate::infra::AppState;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Extension;
use axum::Json;
use roadcall::dispatch::{
    dispatch_router, DispatchState, OfferNotifier, OfferRepository, RequestStore,
    TechnicianDirectory,
};
use serde_json::json;

/// Compose the dispatch surface with the operational endpoints.
pub(crate) fn with_dispatch_routes<D, R, O, N>(state: DispatchState<D, R, O, N>) -> axum::Router
where
    D: TechnicianDirectory + 'static,
    R: RequestStore + 'static,
    O: OfferRepository + 'static,
    N: OfferNotifier + 'static,
{
    dispatch_router(state)
        .route("/health", axum::routing::get(healthcheck))
        .route("/ready", axum::routing::get(readiness_endpoint))
        .route("/metrics", axum::routing::get(metrics_endpoint))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(std::sync::atomic::Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
