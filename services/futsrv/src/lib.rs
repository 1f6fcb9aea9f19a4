//! Futura Bridge Service Library (futsrv)
//!
//! Polls a Futura ventilation unit over Modbus TCP, decodes its fixed-point
//! registers into named physical values, exports them as Prometheus gauges
//! and accepts writes to the writable holding registers.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │   AddressMap    │───►│     Codec       │◄───│  RangeReader    │
//! │ (fields/ranges) │    │ (decode/encode) │    │ (blocks, retry) │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//!          │                       │                       │
//!          ▼                       ▼                       ▼
//! ┌─────────────────┐    ┌─────────────────┐    ┌─────────────────┐
//! │ WriteDispatcher │───►│DeviceConnection │───►│ModbusTcpTransport│
//! │ (single / bulk) │    │ (one session)   │    │   (MBAP/TCP)    │
//! └─────────────────┘    └─────────────────┘    └─────────────────┘
//! ```
//!
//! The [`poller::Poller`] and the HTTP handlers in [`api`] both go through
//! [`service::DeviceService`].
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use futsrv::address_map::AddressMap;
//! use futsrv::connection::DeviceConnection;
//! use futsrv::protocol::ModbusTcpTransport;
//! use futsrv::reader::RangeReader;
//! use futsrv::service::DeviceService;
//!
//! # async fn run() -> futsrv::error::Result<()> {
//! let map = Arc::new(AddressMap::futura()?);
//! let transport = ModbusTcpTransport::new("192.168.1.50", 502, 1, Duration::from_secs(5));
//! let connection = DeviceConnection::new(Box::new(transport));
//! let reader = RangeReader::new(connection.clone(), 125, Duration::from_millis(500))?;
//! let service = DeviceService::new(map, connection, reader);
//!
//! let snapshot = service.read_input().await;
//! println!("{}", serde_json::to_string(&snapshot.record).unwrap_or_default());
//! # Ok(())
//! # }
//! ```

pub mod address_map;
pub mod api;
pub mod bootstrap;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod metrics;
pub mod poller;
pub mod protocol;
pub mod reader;
pub mod service;
pub mod writer;

pub use error::{FutSrvError, Result};
