//! Read-side JSON API plus the admin-guarded manual operation trigger.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::error;

use stormcheck_common::{AlertStatus, OperationKind, ReportCategory};
use stormcheck_store::{AlertFilter, ReportFilter};

use crate::auth::check_admin_auth;
use crate::AppState;

const DEFAULT_PAGE: i64 = 100;
const MAX_PAGE: i64 = 500;

fn page_limit(requested: Option<i64>) -> i64 {
    requested.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE)
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({"error": message}))).into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({"error": message}))).into_response()
}

fn internal_error(error: &anyhow::Error, message: &str) -> Response {
    error!(error = %error, "{message}");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": message})),
    )
        .into_response()
}

fn unauthorized() -> Response {
    axum::response::Response::builder()
        .status(StatusCode::UNAUTHORIZED)
        .header(header::WWW_AUTHENTICATE, "Basic realm=\"admin\"")
        .body(axum::body::Body::from("Unauthorized"))
        .unwrap()
        .into_response()
}

// --- Alerts ---

#[derive(Debug, Deserialize)]
pub struct AlertsQuery {
    status: Option<String>,
    event: Option<String>,
    active: Option<bool>,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> Response {
    let status = match query.status.as_deref() {
        None => None,
        Some(raw) => match AlertStatus::parse(raw) {
            Some(status) => Some(status),
            None => return bad_request(format!("Unknown status '{raw}'")),
        },
    };

    let filter = AlertFilter {
        status,
        event: query.event,
        active_only: query.active.unwrap_or(false),
        limit: page_limit(query.limit),
        offset: query.offset.unwrap_or(0).max(0),
    };

    match state.store.list_alerts(&filter).await {
        Ok(alerts) => Json(alerts).into_response(),
        Err(error) => internal_error(&error, "Failed to list alerts"),
    }
}

pub async fn get_alert(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_alert(&id).await {
        Ok(Some(alert)) => Json(alert).into_response(),
        Ok(None) => not_found("Alert not found"),
        Err(error) => internal_error(&error, "Failed to load alert"),
    }
}

/// The ground-truth reports an alert was verified against.
pub async fn get_alert_reports(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    let alert = match state.store.get_alert(&id).await {
        Ok(Some(alert)) => alert,
        Ok(None) => return not_found("Alert not found"),
        Err(error) => return internal_error(&error, "Failed to load alert"),
    };

    match state.store.reports_by_ids(&alert.matched_report_ids).await {
        Ok(reports) => Json(reports).into_response(),
        Err(error) => internal_error(&error, "Failed to load matched reports"),
    }
}

// --- Reports ---

#[derive(Debug, Deserialize)]
pub struct ReportsQuery {
    date: Option<String>,
    category: Option<String>,
    state: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

pub async fn list_reports(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReportsQuery>,
) -> Response {
    let date = match query.date.as_deref() {
        None => None,
        Some(raw) => match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => return bad_request(format!("Invalid date '{raw}', expected YYYY-MM-DD")),
        },
    };
    let category = match query.category.as_deref() {
        None => None,
        Some(raw) => match ReportCategory::parse(raw) {
            Some(category) => Some(category),
            None => return bad_request(format!("Unknown category '{raw}'")),
        },
    };

    let filter = ReportFilter {
        date,
        category,
        state: query.state.map(|s| s.trim().to_uppercase()),
        limit: page_limit(query.limit),
        offset: query.offset.unwrap_or(0).max(0),
    };

    match state.store.list_reports(&filter).await {
        Ok(reports) => Json(reports).into_response(),
        Err(error) => internal_error(&error, "Failed to list reports"),
    }
}

pub async fn get_report(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.store.get_report(&id).await {
        Ok(Some(report)) => Json(report).into_response(),
        Ok(None) => not_found("Report not found"),
        Err(error) => internal_error(&error, "Failed to load report"),
    }
}

// --- Operations ---

#[derive(Debug, Deserialize)]
pub struct OperationsQuery {
    kind: Option<String>,
    limit: Option<i64>,
}

pub async fn list_operations(
    State(state): State<Arc<AppState>>,
    Query(query): Query<OperationsQuery>,
) -> Response {
    let kind = match query.kind.as_deref() {
        None => None,
        Some(raw) => match OperationKind::parse(raw) {
            Some(kind) => Some(kind),
            None => return bad_request(format!("Unknown operation kind '{raw}'")),
        },
    };

    match state
        .store
        .recent_operations(kind, page_limit(query.limit))
        .await
    {
        Ok(entries) => Json(entries).into_response(),
        Err(error) => internal_error(&error, "Failed to list operations"),
    }
}

/// Per-kind scheduler view: last run, outcome, whether a run is in flight,
/// and when the next scheduled run is due.
pub async fn service_status(State(state): State<Arc<AppState>>) -> Response {
    Json(state.scheduler.status().await).into_response()
}

pub async fn run_operation(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    headers: HeaderMap,
) -> Response {
    let Some(kind) = OperationKind::parse(&kind) else {
        return not_found("Unknown operation kind");
    };

    if !check_admin_auth(&headers, &state.admin_username, &state.admin_password) {
        return unauthorized();
    }

    if state.scheduler.run_now(kind) {
        (StatusCode::ACCEPTED, Json(json!({"status": "started"}))).into_response()
    } else {
        (
            StatusCode::CONFLICT,
            Json(json!({"error": format!("{kind} already in progress")})),
        )
            .into_response()
    }
}
