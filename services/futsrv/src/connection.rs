//! Shared device connection
//!
//! The device speaks one logical session, so every request goes through a
//! single async mutex. A [`Session`] holds that lock for one logical exchange
//! (a block read and its retry, or one register write).
//!
//! State transitions:
//!
//! ```text
//! Closed --connect ok--> Open --request fails, link dropped--> Closed
//! Open --reopen--> Closed --backoff--> Reopening --connect ok--> Open
//!                                                \--connect err--> Closed
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::address_map::RegisterKind;
use crate::error::Result;
use crate::protocol::RegisterTransport;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Open,
    Closed,
    Reopening,
}

/// Request counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConnectionStats {
    pub reads: u64,
    pub writes: u64,
    pub failures: u64,
    pub reopens: u64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub connected_since: Option<DateTime<Utc>>,
}

/// Point-in-time copy of state and counters for health reporting
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionSnapshot {
    pub endpoint: String,
    pub state: ConnectionState,
    pub stats: ConnectionStats,
}

#[derive(Debug)]
struct Status {
    state: ConnectionState,
    stats: ConnectionStats,
}

impl Status {
    fn mark_open(&mut self) {
        self.state = ConnectionState::Open;
        self.stats.connected_since = Some(Utc::now());
    }

    fn mark_closed(&mut self) {
        self.state = ConnectionState::Closed;
        self.stats.connected_since = None;
    }

    fn record_failure(&mut self, error: &crate::error::FutSrvError) {
        self.stats.failures += 1;
        self.stats.last_error = Some(error.to_string());
        self.stats.last_error_at = Some(Utc::now());
    }
}

/// Cheaply cloneable handle to the one device link
#[derive(Clone)]
pub struct DeviceConnection {
    transport: Arc<Mutex<Box<dyn RegisterTransport>>>,
    status: Arc<RwLock<Status>>,
    endpoint: Arc<str>,
}

impl std::fmt::Debug for DeviceConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceConnection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

impl DeviceConnection {
    /// Wrap a transport; the connection starts `Closed`
    pub fn new(transport: Box<dyn RegisterTransport>) -> Self {
        let endpoint: Arc<str> = Arc::from(transport.endpoint());
        Self {
            transport: Arc::new(Mutex::new(transport)),
            status: Arc::new(RwLock::new(Status {
                state: ConnectionState::Closed,
                stats: ConnectionStats::default(),
            })),
            endpoint,
        }
    }

    /// Lock the connection for one logical exchange
    pub async fn session(&self) -> Session<'_> {
        Session {
            transport: self.transport.lock().await,
            status: &self.status,
            endpoint: &self.endpoint,
        }
    }

    /// Open the link if it is not open yet
    pub async fn connect(&self) -> Result<()> {
        self.session().await.ensure_open().await
    }

    /// Close the link
    pub async fn disconnect(&self) -> Result<()> {
        let mut session = self.session().await;
        let result = session.transport.disconnect().await;
        session.status.write().mark_closed();
        result
    }

    pub fn state(&self) -> ConnectionState {
        self.status.read().state
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Current state and counters; does not wait for in-flight requests
    pub fn snapshot(&self) -> ConnectionSnapshot {
        let status = self.status.read();
        ConnectionSnapshot {
            endpoint: self.endpoint.to_string(),
            state: status.state,
            stats: status.stats.clone(),
        }
    }
}

/// Exclusive access to the device for one exchange
pub struct Session<'a> {
    transport: MutexGuard<'a, Box<dyn RegisterTransport>>,
    status: &'a RwLock<Status>,
    endpoint: &'a str,
}

impl Session<'_> {
    pub fn state(&self) -> ConnectionState {
        self.status.read().state
    }

    /// Lazily open a closed connection
    async fn ensure_open(&mut self) -> Result<()> {
        if self.state() == ConnectionState::Open && self.transport.is_connected() {
            return Ok(());
        }
        match self.transport.connect().await {
            Ok(()) => {
                self.status.write().mark_open();
                Ok(())
            },
            Err(e) => {
                let mut status = self.status.write();
                status.mark_closed();
                status.record_failure(&e);
                Err(e)
            },
        }
    }

    /// Bookkeeping after a failed request
    fn after_failure(&mut self, error: &crate::error::FutSrvError) {
        let mut status = self.status.write();
        status.record_failure(error);
        if !self.transport.is_connected() {
            status.mark_closed();
        }
    }

    pub async fn read_registers(
        &mut self,
        kind: RegisterKind,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        self.ensure_open().await?;
        match self.transport.read_registers(kind, start, count).await {
            Ok(values) => {
                self.status.write().stats.reads += 1;
                Ok(values)
            },
            Err(e) => {
                self.after_failure(&e);
                Err(e)
            },
        }
    }

    pub async fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        self.ensure_open().await?;
        match self.transport.write_register(address, value).await {
            Ok(()) => {
                self.status.write().stats.writes += 1;
                Ok(())
            },
            Err(e) => {
                self.after_failure(&e);
                Err(e)
            },
        }
    }

    /// Close, wait `backoff`, and open the link again
    pub async fn reopen(&mut self, backoff: Duration) -> Result<()> {
        if let Err(e) = self.transport.disconnect().await {
            debug!("Disconnect before reopen failed: {}", e);
        }
        self.status.write().mark_closed();

        tokio::time::sleep(backoff).await;

        {
            let mut status = self.status.write();
            status.state = ConnectionState::Reopening;
            status.stats.reopens += 1;
        }
        info!("Reopening connection to {}", self.endpoint);

        match self.transport.connect().await {
            Ok(()) => {
                self.status.write().mark_open();
                Ok(())
            },
            Err(e) => {
                warn!("Reopen of {} failed: {}", self.endpoint, e);
                let mut status = self.status.write();
                status.mark_closed();
                status.record_failure(&e);
                Err(e)
            },
        }
    }
}
