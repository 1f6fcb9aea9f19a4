//! Basic library shared by the bridge services
//!
//! Provides:
//! - logging setup with runtime level changes
//! - admin endpoints for the log level
//! - unified API response envelopes and `AppError`
//! - graceful shutdown helpers
//! - service bootstrap (banner, logging init, port resolution)

pub mod admin_api;
pub mod api_types;
pub mod logging;
pub mod service_bootstrap;
pub mod shutdown;

pub use api_types::{AppError, ErrorInfo, ErrorResponse, SuccessResponse};
