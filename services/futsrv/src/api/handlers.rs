//! API handlers

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json},
};
use chrono::Utc;
use common::{AppError, SuccessResponse};
use errors::ServiceErrorTrait;
use tracing::{error, info, warn, Level};

use super::dto::{HealthResponse, WriteResponse};
use super::AppState;
use crate::codec::DecodedRecord;
use crate::connection::ConnectionState;
use crate::error::FutSrvError;
use crate::writer::WritePayload;

const EDIT_PAGE: &str = include_str!("../../static/edit.html");

/// Redirect the root to the editor
///
/// @route GET /
/// @status 302 - Location: /edit
pub async fn index() -> impl IntoResponse {
    (StatusCode::FOUND, [(header::LOCATION, "/edit")])
}

/// Register editor page
///
/// @route GET /edit
/// @output text/html
pub async fn edit_page() -> Html<&'static str> {
    Html(EDIT_PAGE)
}

/// Service health, device link and last poll
///
/// Reports `degraded` while the device link is not open. Always 200.
///
/// @route GET /health
/// @output Json<SuccessResponse<HealthResponse>>
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> Json<SuccessResponse<HealthResponse>> {
    let device = state.service.connection().snapshot();
    let status = if device.state == ConnectionState::Open {
        "healthy"
    } else {
        "degraded"
    };
    let now = Utc::now();

    Json(SuccessResponse::new(HealthResponse {
        status,
        service: "futsrv",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (now - state.started_at).num_seconds(),
        device,
        poll: state.poll_status.read().clone(),
        timestamp: now,
    }))
}

/// Prometheus text exposition
///
/// @route GET /metrics
/// @output text/plain; version=0.0.4
/// @status 500 - Registry could not be encoded
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let body = state.metrics.render().map_err(|e| {
        error!("Metrics encoding failed: {}", e);
        AppError::from(e)
    })?;
    Ok((
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        body,
    ))
}

/// On-demand input read, external sensor and button fields taken from the
/// holding registers
///
/// @route GET /api/read-input
/// @output Json<SuccessResponse<DecodedRecord>>
pub async fn read_input(
    State(state): State<Arc<AppState>>,
) -> Json<SuccessResponse<DecodedRecord>> {
    let snapshot = state.service.read_input().await;
    Json(
        SuccessResponse::new(snapshot.record)
            .with_metadata("input_registers", snapshot.input_registers.into())
            .with_metadata("holding_registers", snapshot.holding_registers.into()),
    )
}

/// On-demand holding read
///
/// @route GET /api/read-holding
/// @output Json<SuccessResponse<DecodedRecord>>
pub async fn read_holding(
    State(state): State<Arc<AppState>>,
) -> Json<SuccessResponse<DecodedRecord>> {
    Json(SuccessResponse::new(state.service.read_holding().await))
}

/// Write one field or apply a bulk update
///
/// @route POST /api/write-holding
/// @input JSON object of field name to number; one key writes that field,
///        several keys run the bulk update
/// @output Json<SuccessResponse<WriteResponse>>
/// @status 400 - Invalid JSON, unknown or read-only field, value out of range
/// @status 502 - Device rejected or failed the write
/// @status 504 - Device did not answer
pub async fn write_holding(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<SuccessResponse<WriteResponse>>, AppError> {
    let value: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| FutSrvError::invalid_payload(format!("Invalid JSON: {}", e)))?;
    let payload = WritePayload::from_json(&value)?;

    let outcome = state.service.write(payload).await.map_err(|e| {
        match e.log_level() {
            Level::ERROR => error!("Write error: {}", e),
            Level::WARN => warn!("Write error: {}", e),
            _ => info!("Write rejected: {}", e),
        }
        e
    })?;

    Ok(Json(SuccessResponse::new(WriteResponse {
        message: outcome.message,
        written: outcome.written,
    })))
}
