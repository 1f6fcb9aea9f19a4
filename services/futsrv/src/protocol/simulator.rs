//! Modbus TCP simulator for testing
//!
//! In-memory server for FC03/FC04/FC06 with 0-based addressing. Reads can be
//! made to fail by dropping the client connection, and every accepted write
//! is recorded.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::RwLock;
use tracing::{debug, error, info};

use super::constants::{
    EXCEPTION_FLAG, EXCEPTION_ILLEGAL_DATA_ADDRESS, EXCEPTION_ILLEGAL_DATA_VALUE,
    EXCEPTION_ILLEGAL_FUNCTION, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS,
    FC_WRITE_SINGLE_REGISTER, MAX_MBAP_LENGTH, MBAP_HEADER_LEN, MODBUS_MAX_READ_REGISTERS,
};
use crate::address_map::RegisterKind;

type Registers = Arc<RwLock<HashMap<u16, u16>>>;

/// Simple Modbus TCP simulator
///
/// Cloning shares the register banks, so a test can keep a handle after
/// [`ModbusSimulator::start`].
#[derive(Debug, Clone, Default)]
pub struct ModbusSimulator {
    holding_registers: Registers,
    input_registers: Registers,
    /// Number of upcoming read requests answered by closing the connection
    fail_reads: Arc<AtomicUsize>,
    /// Accepted FC06 writes in arrival order
    write_history: Arc<RwLock<Vec<(u16, u16)>>>,
    /// Addresses whose writes are rejected with an exception
    read_only: Arc<RwLock<Vec<u16>>>,
    requests: Arc<AtomicUsize>,
}

impl ModbusSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    fn bank(&self, kind: RegisterKind) -> &Registers {
        match kind {
            RegisterKind::Input => &self.input_registers,
            RegisterKind::Holding => &self.holding_registers,
        }
    }

    /// Set a register value
    pub async fn set(&self, kind: RegisterKind, address: u16, value: u16) {
        self.bank(kind).write().await.insert(address, value);
    }

    /// Set consecutive registers starting at `start`
    pub async fn set_block(&self, kind: RegisterKind, start: u16, values: &[u16]) {
        let mut bank = self.bank(kind).write().await;
        for (offset, value) in (0u16..).zip(values) {
            let Some(address) = start.checked_add(offset) else {
                break;
            };
            bank.insert(address, *value);
        }
    }

    pub async fn get(&self, kind: RegisterKind, address: u16) -> Option<u16> {
        self.bank(kind).read().await.get(&address).copied()
    }

    /// Drop the connection instead of answering the next `count` reads
    pub fn fail_next_reads(&self, count: usize) {
        self.fail_reads.store(count, Ordering::SeqCst);
    }

    /// Reject writes to `address` with an illegal-address exception
    pub async fn protect(&self, address: u16) {
        self.read_only.write().await.push(address);
    }

    pub async fn write_history(&self) -> Vec<(u16, u16)> {
        self.write_history.read().await.clone()
    }

    /// Total requests received, including failed ones
    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Bind to `127.0.0.1:port` (0 for an ephemeral port) and serve in the
    /// background
    pub async fn start(&self, port: u16) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(("127.0.0.1", port)).await?;
        let local_addr = listener.local_addr()?;
        info!("Modbus simulator listening on {}", local_addr);

        let sim = self.clone();
        tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        debug!("New connection from {}", addr);
                        let sim = sim.clone();
                        tokio::spawn(async move {
                            if let Err(e) = sim.handle_connection(stream).await {
                                debug!("Connection error: {}", e);
                            }
                        });
                    },
                    Err(e) => {
                        error!("Accept error: {}", e);
                        break;
                    },
                }
            }
        });

        Ok(local_addr)
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> std::io::Result<()> {
        loop {
            let mut header = [0u8; MBAP_HEADER_LEN + 1];
            match stream.read_exact(&mut header).await {
                Ok(_) => {},
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(()),
                Err(e) => return Err(e),
            }

            let transaction_id = u16::from_be_bytes([header[0], header[1]]);
            let protocol_id = u16::from_be_bytes([header[2], header[3]]);
            let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
            let unit_id = header[6];

            if protocol_id != 0 || !(2..=MAX_MBAP_LENGTH).contains(&length) {
                debug!("Dropping connection after malformed header");
                return Ok(());
            }

            let mut pdu = vec![0u8; length - 1];
            stream.read_exact(&mut pdu).await?;
            self.requests.fetch_add(1, Ordering::SeqCst);

            let function_code = pdu[0];
            let is_read =
                function_code == FC_READ_HOLDING_REGISTERS || function_code == FC_READ_INPUT_REGISTERS;
            if is_read && self.take_failure() {
                debug!("Injected failure: closing connection on tid {}", transaction_id);
                return Ok(());
            }

            let reply = self.process(&pdu).await;
            let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + 1 + reply.len());
            frame.extend_from_slice(&transaction_id.to_be_bytes());
            frame.extend_from_slice(&[0x00, 0x00]);
            frame.extend_from_slice(&(reply.len() as u16 + 1).to_be_bytes());
            frame.push(unit_id);
            frame.extend_from_slice(&reply);
            stream.write_all(&frame).await?;
        }
    }

    fn take_failure(&self) -> bool {
        self.fail_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Build the response PDU for a request PDU
    async fn process(&self, pdu: &[u8]) -> Vec<u8> {
        let function_code = pdu[0];
        if pdu.len() < 5 {
            return Self::exception(function_code, EXCEPTION_ILLEGAL_DATA_VALUE);
        }
        let first = u16::from_be_bytes([pdu[1], pdu[2]]);
        let second = u16::from_be_bytes([pdu[3], pdu[4]]);

        match function_code {
            FC_READ_HOLDING_REGISTERS | FC_READ_INPUT_REGISTERS => {
                let kind = if function_code == FC_READ_HOLDING_REGISTERS {
                    RegisterKind::Holding
                } else {
                    RegisterKind::Input
                };
                self.read_registers(function_code, kind, first, second).await
            },
            FC_WRITE_SINGLE_REGISTER => self.write_single_register(first, second).await,
            _ => Self::exception(function_code, EXCEPTION_ILLEGAL_FUNCTION),
        }
    }

    async fn read_registers(&self, fc: u8, kind: RegisterKind, start: u16, count: u16) -> Vec<u8> {
        if count == 0 || usize::from(count) > MODBUS_MAX_READ_REGISTERS {
            return Self::exception(fc, EXCEPTION_ILLEGAL_DATA_VALUE);
        }
        if u32::from(start) + u32::from(count) > 0x1_0000 {
            return Self::exception(fc, EXCEPTION_ILLEGAL_DATA_ADDRESS);
        }

        let bank = self.bank(kind).read().await;
        let mut response = Vec::with_capacity(2 + usize::from(count) * 2);
        response.push(fc);
        response.push((count * 2) as u8);
        for addr in start..=start + (count - 1) {
            let value = bank.get(&addr).copied().unwrap_or(0);
            response.extend_from_slice(&value.to_be_bytes());
        }
        response
    }

    async fn write_single_register(&self, addr: u16, value: u16) -> Vec<u8> {
        if self.read_only.read().await.contains(&addr) {
            return Self::exception(FC_WRITE_SINGLE_REGISTER, EXCEPTION_ILLEGAL_DATA_ADDRESS);
        }
        self.holding_registers.write().await.insert(addr, value);
        self.write_history.write().await.push((addr, value));

        // Echo back the request as response
        let mut response = vec![FC_WRITE_SINGLE_REGISTER];
        response.extend_from_slice(&addr.to_be_bytes());
        response.extend_from_slice(&value.to_be_bytes());
        response
    }

    fn exception(func: u8, code: u8) -> Vec<u8> {
        vec![func | EXCEPTION_FLAG, code]
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_read_registers_is_zero_based() {
        let sim = ModbusSimulator::new();
        sim.set_block(RegisterKind::Input, 0, &[7, 8, 9]).await;

        let reply = sim.process(&[0x04, 0x00, 0x00, 0x00, 0x03]).await;
        assert_eq!(reply, vec![0x04, 6, 0, 7, 0, 8, 0, 9]);
    }

    #[tokio::test]
    async fn test_write_is_recorded_and_echoed() {
        let sim = ModbusSimulator::new();
        let reply = sim.process(&[0x06, 0x00, 0x0A, 0x00, 0xD7]).await;
        assert_eq!(reply, vec![0x06, 0x00, 0x0A, 0x00, 0xD7]);
        assert_eq!(sim.get(RegisterKind::Holding, 10).await, Some(215));
        assert_eq!(sim.write_history().await, vec![(10, 215)]);
    }

    #[tokio::test]
    async fn test_exceptions() {
        let sim = ModbusSimulator::new();
        assert_eq!(sim.process(&[0x10, 0, 0, 0, 1]).await, vec![0x90, 0x01]);
        assert_eq!(sim.process(&[0x03, 0, 0, 0, 126]).await, vec![0x83, 0x03]);
        assert_eq!(sim.process(&[0x04, 0xFF, 0xFF, 0, 2]).await, vec![0x84, 0x02]);

        sim.protect(900).await;
        assert_eq!(sim.process(&[0x06, 0x03, 0x84, 0, 1]).await, vec![0x86, 0x02]);
        assert!(sim.write_history().await.is_empty());
    }

    #[test]
    fn test_failure_budget() {
        let sim = ModbusSimulator::new();
        sim.fail_next_reads(2);
        assert!(sim.take_failure());
        assert!(sim.take_failure());
        assert!(!sim.take_failure());
    }
}
