//! Periodic device poll
//!
//! One task reads both register kinds on a fixed interval, merges aliases,
//! refreshes the gauges and records a [`PollStatus`] for the health endpoint.
//! A cycle in progress is never interrupted; cancellation is observed
//! between cycles.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::metrics::DeviceMetrics;
use crate::service::DeviceService;

/// Outcome of the most recent poll cycles
#[derive(Debug, Clone, Default, Serialize)]
pub struct PollStatus {
    pub cycles: u64,
    pub last_cycle: Option<DateTime<Utc>>,
    pub last_duration_ms: Option<u64>,
    pub input_registers: usize,
    pub holding_registers: usize,
}

#[derive(Debug, Clone)]
pub struct Poller {
    service: DeviceService,
    metrics: DeviceMetrics,
    interval: Duration,
    status: Arc<RwLock<PollStatus>>,
}

impl Poller {
    pub fn new(service: DeviceService, metrics: DeviceMetrics, interval: Duration) -> Self {
        Self {
            service,
            metrics,
            interval,
            status: Arc::new(RwLock::new(PollStatus::default())),
        }
    }

    /// Shared handle to the poll status
    pub fn status(&self) -> Arc<RwLock<PollStatus>> {
        Arc::clone(&self.status)
    }

    /// Run one full cycle
    pub async fn poll_once(&self) -> PollStatus {
        let started = Instant::now();
        let snapshot = self.service.read_input().await;
        self.metrics.update(&snapshot.record);
        self.metrics
            .record_poll(snapshot.input_registers, snapshot.holding_registers);

        info!(
            "Poll complete: inputs={}, holdings={}",
            snapshot.input_registers, snapshot.holding_registers
        );

        let mut status = self.status.write();
        status.cycles += 1;
        status.last_cycle = Some(Utc::now());
        status.last_duration_ms = Some(started.elapsed().as_millis() as u64);
        status.input_registers = snapshot.input_registers;
        status.holding_registers = snapshot.holding_registers;
        status.clone()
    }

    /// Poll until `token` is cancelled
    pub async fn run(self, token: CancellationToken) {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("Poller started: every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let status = self.poll_once().await;
                    debug!("Poll cycle {} took {:?} ms", status.cycles, status.last_duration_ms);
                }
                () = token.cancelled() => {
                    info!("Poller received cancellation signal, shutting down");
                    break;
                }
            }
        }

        info!("Poller terminated");
    }

    /// Spawn [`Poller::run`] on the runtime
    pub fn spawn(self, token: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(self.run(token))
    }
}
