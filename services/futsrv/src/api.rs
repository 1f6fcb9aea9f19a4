//! HTTP API
//!
//! Metrics, the register editor page and the JSON read/write endpoints.

pub mod dto;
pub mod handlers;
pub mod routes;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::metrics::DeviceMetrics;
use crate::poller::PollStatus;
use crate::service::DeviceService;

pub use routes::create_routes;

/// State shared by all handlers
pub struct AppState {
    pub service: DeviceService,
    pub metrics: DeviceMetrics,
    pub poll_status: Arc<RwLock<PollStatus>>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        service: DeviceService,
        metrics: DeviceMetrics,
        poll_status: Arc<RwLock<PollStatus>>,
    ) -> Self {
        Self {
            service,
            metrics,
            poll_status,
            started_at: Utc::now(),
        }
    }
}
