//! Shared test support: a scripted in-memory transport and service builders

#![allow(dead_code)]
#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use futsrv::address_map::{AddressMap, RegisterKind};
use futsrv::connection::DeviceConnection;
use futsrv::error::{FutSrvError, Result};
use futsrv::protocol::{ModbusSimulator, ModbusTcpTransport, RegisterTransport};
use futsrv::reader::RangeReader;
use futsrv::service::DeviceService;

/// Backoff short enough to keep retry tests fast
pub const TEST_BACKOFF: Duration = Duration::from_millis(1);

#[derive(Debug, Default)]
struct Script {
    connected: bool,
    input: HashMap<u16, u16>,
    holding: HashMap<u16, u16>,
    /// Upcoming reads that fail and drop the link
    fail_reads: usize,
    /// Block starts whose reads always fail
    broken_blocks: HashSet<(RegisterKind, u16)>,
    /// Upcoming connects that fail
    fail_connects: usize,
    /// Addresses whose writes fail
    broken_writes: HashSet<u16>,
    reads: Vec<(RegisterKind, u16, u16)>,
    writes: Vec<(u16, u16)>,
    connects: usize,
}

/// In-memory transport; clones share the same script so a test keeps a
/// handle after boxing one copy into a [`DeviceConnection`].
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    script: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, kind: RegisterKind, address: u16, value: u16) {
        let mut script = self.script.lock();
        match kind {
            RegisterKind::Input => script.input.insert(address, value),
            RegisterKind::Holding => script.holding.insert(address, value),
        };
    }

    pub fn holding(&self, address: u16) -> Option<u16> {
        self.script.lock().holding.get(&address).copied()
    }

    pub fn fail_next_reads(&self, count: usize) {
        self.script.lock().fail_reads = count;
    }

    pub fn break_block(&self, kind: RegisterKind, start: u16) {
        self.script.lock().broken_blocks.insert((kind, start));
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.script.lock().fail_connects = count;
    }

    pub fn break_write(&self, address: u16) {
        self.script.lock().broken_writes.insert(address);
    }

    pub fn reads(&self) -> Vec<(RegisterKind, u16, u16)> {
        self.script.lock().reads.clone()
    }

    pub fn writes(&self) -> Vec<(u16, u16)> {
        self.script.lock().writes.clone()
    }

    pub fn connects(&self) -> usize {
        self.script.lock().connects
    }
}

#[async_trait]
impl RegisterTransport for ScriptedTransport {
    async fn connect(&mut self) -> Result<()> {
        let mut script = self.script.lock();
        script.connects += 1;
        if script.fail_connects > 0 {
            script.fail_connects -= 1;
            script.connected = false;
            return Err(FutSrvError::transport("connection refused"));
        }
        script.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.script.lock().connected = false;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.script.lock().connected
    }

    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        let mut script = self.script.lock();
        script.reads.push((kind, start, count));
        if !script.connected {
            return Err(FutSrvError::transport("not connected"));
        }
        if script.fail_reads > 0 || script.broken_blocks.contains(&(kind, start)) {
            script.fail_reads = script.fail_reads.saturating_sub(1);
            script.connected = false;
            return Err(FutSrvError::transport("connection reset by peer"));
        }
        let bank = match kind {
            RegisterKind::Input => &script.input,
            RegisterKind::Holding => &script.holding,
        };
        Ok((0..count)
            .map(|offset| bank.get(&(start + offset)).copied().unwrap_or(0))
            .collect())
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        let mut script = self.script.lock();
        if !script.connected {
            return Err(FutSrvError::transport("not connected"));
        }
        if script.broken_writes.contains(&address) {
            return Err(FutSrvError::Exception {
                function: 0x06,
                code: 0x02,
            });
        }
        script.holding.insert(address, value);
        script.writes.push((address, value));
        Ok(())
    }

    fn endpoint(&self) -> String {
        "scripted:502".to_string()
    }
}

/// Connection, reader and service over a scripted transport
pub fn scripted_service(transport: &ScriptedTransport, max_block_size: u16) -> DeviceService {
    let connection = DeviceConnection::new(Box::new(transport.clone()));
    let reader = RangeReader::new(connection.clone(), max_block_size, TEST_BACKOFF).unwrap();
    DeviceService::new(Arc::new(AddressMap::futura().unwrap()), connection, reader)
}

/// Start a simulator on an ephemeral port and build a service talking to it
/// over real TCP
pub async fn simulator_service(max_block_size: u16) -> (ModbusSimulator, DeviceService) {
    let simulator = ModbusSimulator::new();
    let addr = simulator.start(0).await.unwrap();

    let transport =
        ModbusTcpTransport::new(addr.ip().to_string(), addr.port(), 1, Duration::from_secs(2));
    let connection = DeviceConnection::new(Box::new(transport));
    let reader = RangeReader::new(connection.clone(), max_block_size, TEST_BACKOFF).unwrap();
    let service = DeviceService::new(Arc::new(AddressMap::futura().unwrap()), connection, reader);
    (simulator, service)
}
