//! Shared admin endpoints
//!
//! Runtime log level inspection and change, mounted by each service under
//! `/api/admin/logs/level`.

use axum::{http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use crate::logging;

/// Current or newly applied log filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogLevelResponse {
    pub level: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Request to set log level
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLogLevelRequest {
    /// A level ("debug") or a full filter spec ("info,futsrv=trace")
    pub level: String,
}

/// Read the active log filter
///
/// @route GET /api/admin/logs/level
/// @output Json<LogLevelResponse>
pub async fn get_log_level() -> Json<LogLevelResponse> {
    Json(LogLevelResponse {
        level: logging::get_log_level(),
        status: None,
        error: None,
    })
}

/// Replace the active log filter
///
/// @route POST /api/admin/logs/level
/// @input Json<SetLogLevelRequest>
/// @output Json<LogLevelResponse>
/// @status 200 - Filter applied
/// @status 400 - Invalid filter or logging not initialized
pub async fn set_log_level(
    Json(request): Json<SetLogLevelRequest>,
) -> (StatusCode, Json<LogLevelResponse>) {
    match logging::set_log_level(&request.level) {
        Ok(()) => (
            StatusCode::OK,
            Json(LogLevelResponse {
                level: request.level,
                status: Some("ok".to_string()),
                error: None,
            }),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Json(LogLevelResponse {
                level: logging::get_log_level(),
                status: Some("error".to_string()),
                error: Some(e),
            }),
        ),
    }
}
