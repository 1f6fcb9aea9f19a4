//! Register transport abstraction
//!
//! The read and write primitives the polling engine is built on. One
//! implementation speaks Modbus TCP; tests substitute scripted transports.

use async_trait::async_trait;

use crate::address_map::RegisterKind;
use crate::error::Result;

/// Register-level access to one device
///
/// Implementations keep a single logical session and are not expected to
/// handle concurrent requests; callers serialize access through
/// [`crate::connection::DeviceConnection`].
#[async_trait]
pub trait RegisterTransport: Send + Sync {
    /// Open the underlying link
    async fn connect(&mut self) -> Result<()>;

    /// Close the underlying link; closing a closed link is not an error
    async fn disconnect(&mut self) -> Result<()>;

    /// Whether the link is currently open
    fn is_connected(&self) -> bool;

    /// Read `count` consecutive registers of `kind` starting at `start`
    ///
    /// # Returns
    /// * `Result<Vec<u16>>` - exactly `count` register values
    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>>;

    /// Write one holding register
    async fn write_register(&mut self, address: u16, value: u16) -> Result<()>;

    /// Human-readable endpoint for logs and health output
    fn endpoint(&self) -> String;
}
