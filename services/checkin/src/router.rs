use axum::{
    Router,
    routing::{get, post},
};
use tower_http::request_id::PropagateRequestIdLayer;
use tower_http::trace::TraceLayer;

use campus_core::health::healthz;
use campus_core::middleware::{X_REQUEST_ID, request_id_layer};

use crate::handlers::{
    admin::sweep_expired_codes,
    code::{get_code_status, issue_code, issue_codes_bulk},
    health::readyz,
    scan::scan_code,
};
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        // Health
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // Codes
        .route("/attendance/codes", post(issue_code))
        .route("/attendance/codes/bulk", post(issue_codes_bulk))
        .route("/attendance/codes/sweep", post(sweep_expired_codes))
        .route("/attendance/codes/{schedule_id}", get(get_code_status))
        // Scans
        .route("/attendance/scans", post(scan_code))
        .layer(PropagateRequestIdLayer::new(
            axum::http::HeaderName::from_static(X_REQUEST_ID),
        ))
        .layer(TraceLayer::new_for_http())
        .layer(request_id_layer())
        .with_state(state)
}
