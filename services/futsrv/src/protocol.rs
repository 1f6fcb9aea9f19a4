//! Modbus TCP plumbing
//!
//! Frame constants, PDU construction, the transport trait the rest of the
//! service talks to, its TCP implementation and an in-memory simulator.

pub mod constants;
pub mod pdu;
pub mod simulator;
pub mod tcp;
pub mod transport;

pub use pdu::{ModbusPdu, PduBuilder};
pub use simulator::ModbusSimulator;
pub use tcp::ModbusTcpTransport;
pub use transport::RegisterTransport;
