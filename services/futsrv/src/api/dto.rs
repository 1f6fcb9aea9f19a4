//! Response bodies

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::connection::ConnectionSnapshot;
use crate::poller::PollStatus;

/// `GET /health` body
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
    pub device: ConnectionSnapshot,
    pub poll: PollStatus,
    pub timestamp: DateTime<Utc>,
}

/// `POST /api/write-holding` body on success
#[derive(Debug, Clone, Serialize)]
pub struct WriteResponse {
    pub message: String,
    pub written: usize,
}
