use std::sync::Arc;

use axum::{
    http::{header, HeaderValue},
    routing::{get, post},
    Router,
};
use tower_http::set_header::SetResponseHeaderLayer;

use crate::rest;
use crate::AppState;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/", get(|| async { "ok" }))
        // Alerts
        .route("/api/alerts", get(rest::list_alerts))
        .route("/api/alerts/{id}", get(rest::get_alert))
        .route("/api/alerts/{id}/reports", get(rest::get_alert_reports))
        // Ground-truth reports
        .route("/api/reports", get(rest::list_reports))
        .route("/api/reports/{id}", get(rest::get_report))
        // Operations
        .route("/api/operations", get(rest::list_operations))
        .route("/api/operations/{kind}/run", post(rest::run_operation))
        .route("/api/status", get(rest::service_status))
        .with_state(state)
        // CORS
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        // Alert state changes between polls; keep responses uncached
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::PRAGMA,
            HeaderValue::from_static("no-cache"),
        ))
        // Logging layer: method + path + status + latency only
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}
