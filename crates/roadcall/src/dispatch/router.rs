use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::coverage::{AuditOptions, CoverageAuditEngine};
use super::domain::{RequestId, TechnicianId};
use super::offers::{DispatchEngine, DispatchError};
use super::repository::{
    OfferNotifier, OfferRepository, RepositoryError, RequestStore, TechnicianDirectory,
};

/// Shared state for the dispatch surface: the live offer engine plus the
/// read-only coverage auditor over the same directory.
pub struct DispatchState<D, R, O, N> {
    pub engine: Arc<DispatchEngine<D, R, O, N>>,
    pub audit: Arc<CoverageAuditEngine<D>>,
}

impl<D, R, O, N> Clone for DispatchState<D, R, O, N> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            audit: self.audit.clone(),
        }
    }
}

/// Router builder exposing the offer lifecycle and the coverage audit.
pub fn dispatch_router<D, R, O, N>(state: DispatchState<D, R, O, N>) -> Router
where
    D: TechnicianDirectory + 'static,
    R: RequestStore + 'static,
    O: OfferRepository + 'static,
    N: OfferNotifier + 'static,
{
    Router::new()
        .route(
            "/api/v1/dispatch/requests/:request_id/offers",
            post(create_offer_handler::<D, R, O, N>),
        )
        .route(
            "/api/v1/dispatch/requests/:request_id/offers/accept",
            post(accept_handler::<D, R, O, N>),
        )
        .route(
            "/api/v1/dispatch/requests/:request_id/offers/decline",
            post(decline_handler::<D, R, O, N>),
        )
        .route(
            "/api/v1/dispatch/requests/:request_id/offers/expire",
            post(expire_handler::<D, R, O, N>),
        )
        .route(
            "/api/v1/dispatch/coverage",
            post(coverage_handler::<D, R, O, N>),
        )
        .with_state(state)
}

/// Body for technician responses to a live offer.
#[derive(Debug, Deserialize)]
pub(crate) struct OfferResponseBody {
    pub(crate) technician_id: String,
}

pub(crate) async fn create_offer_handler<D, R, O, N>(
    State(state): State<DispatchState<D, R, O, N>>,
    Path(request_id): Path<String>,
) -> Response
where
    D: TechnicianDirectory + 'static,
    R: RequestStore + 'static,
    O: OfferRepository + 'static,
    N: OfferNotifier + 'static,
{
    let id = RequestId(request_id);
    match state.engine.create_offer(&id) {
        Ok(offer) => (StatusCode::CREATED, axum::Json(offer.view())).into_response(),
        Err(error) => dispatch_error_response(error),
    }
}

pub(crate) async fn accept_handler<D, R, O, N>(
    State(state): State<DispatchState<D, R, O, N>>,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<OfferResponseBody>,
) -> Response
where
    D: TechnicianDirectory + 'static,
    R: RequestStore + 'static,
    O: OfferRepository + 'static,
    N: OfferNotifier + 'static,
{
    let id = RequestId(request_id);
    let technician = TechnicianId(body.technician_id);
    match state.engine.respond_accept(&id, &technician) {
        Ok(offer) => (StatusCode::OK, axum::Json(offer.view())).into_response(),
        Err(error) => dispatch_error_response(error),
    }
}

pub(crate) async fn decline_handler<D, R, O, N>(
    State(state): State<DispatchState<D, R, O, N>>,
    Path(request_id): Path<String>,
    axum::Json(body): axum::Json<OfferResponseBody>,
) -> Response
where
    D: TechnicianDirectory + 'static,
    R: RequestStore + 'static,
    O: OfferRepository + 'static,
    N: OfferNotifier + 'static,
{
    let id = RequestId(request_id);
    let technician = TechnicianId(body.technician_id);
    match state.engine.respond_decline(&id, &technician) {
        Ok(offer) => (StatusCode::OK, axum::Json(offer.view())).into_response(),
        Err(error) => dispatch_error_response(error),
    }
}

pub(crate) async fn expire_handler<D, R, O, N>(
    State(state): State<DispatchState<D, R, O, N>>,
    Path(request_id): Path<String>,
) -> Response
where
    D: TechnicianDirectory + 'static,
    R: RequestStore + 'static,
    O: OfferRepository + 'static,
    N: OfferNotifier + 'static,
{
    let id = RequestId(request_id);
    match state.engine.on_expire(&id) {
        Ok(offer) => (StatusCode::OK, axum::Json(offer.view())).into_response(),
        Err(error) => dispatch_error_response(error),
    }
}

pub(crate) async fn coverage_handler<D, R, O, N>(
    State(state): State<DispatchState<D, R, O, N>>,
    axum::Json(options): axum::Json<AuditOptions>,
) -> Response
where
    D: TechnicianDirectory + 'static,
    R: RequestStore + 'static,
    O: OfferRepository + 'static,
    N: OfferNotifier + 'static,
{
    match state.audit.run_audit(&options) {
        Ok(report) => (StatusCode::OK, axum::Json(report)).into_response(),
        Err(error) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

/// Map engine failures onto the HTTP surface. Exhaustion is an expected
/// business outcome and reports the unmatched request rather than an error.
fn dispatch_error_response(error: DispatchError) -> Response {
    match &error {
        DispatchError::ExhaustedCandidates {
            request_id,
            attempts,
        } => {
            let payload = json!({
                "request_id": request_id.0,
                "status": "unmatched",
                "attempts": attempts,
            });
            (StatusCode::OK, axum::Json(payload)).into_response()
        }
        DispatchError::ConcurrentOfferConflict { .. } | DispatchError::InvalidTransition { .. } => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::CONFLICT, axum::Json(payload)).into_response()
        }
        DispatchError::UnknownRequest(_)
        | DispatchError::Repository(RepositoryError::NotFound) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        DispatchError::Repository(_) => {
            let payload = json!({ "error": error.to_string() });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}
