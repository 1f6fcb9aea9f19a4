//! Modbus TCP transport
//!
//! MBAP framing over a tokio `TcpStream`. Every request is bounded by the
//! configured timeout. Any I/O or framing failure drops the stream, so the
//! next request starts from a clean connection.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info, trace};

use super::constants::{
    FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_SINGLE_REGISTER, MAX_MBAP_LENGTH,
    MBAP_HEADER_LEN, MODBUS_MAX_READ_REGISTERS, MODBUS_PROTOCOL_ID,
};
use super::pdu::{ModbusPdu, PduBuilder};
use super::transport::RegisterTransport;
use crate::address_map::RegisterKind;
use crate::error::{FutSrvError, Result};

/// Function code used to read a register kind
pub fn read_function_code(kind: RegisterKind) -> u8 {
    match kind {
        RegisterKind::Holding => FC_READ_HOLDING_REGISTERS,
        RegisterKind::Input => FC_READ_INPUT_REGISTERS,
    }
}

/// Modbus TCP client transport
#[derive(Debug)]
pub struct ModbusTcpTransport {
    host: String,
    port: u16,
    unit_id: u8,
    timeout: Duration,
    stream: Option<TcpStream>,
    next_transaction_id: u16,
}

impl ModbusTcpTransport {
    pub fn new(host: impl Into<String>, port: u16, unit_id: u8, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            unit_id,
            timeout,
            stream: None,
            next_transaction_id: 1,
        }
    }

    fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        if self.next_transaction_id == 0 {
            self.next_transaction_id = 1;
        }
        id
    }

    /// Send one request PDU and return the response PDU
    async fn request(&mut self, pdu: &ModbusPdu) -> Result<ModbusPdu> {
        let transaction_id = self.next_transaction_id();
        let unit_id = self.unit_id;
        let limit = self.timeout;
        let endpoint = self.endpoint();

        let mut frame = BytesMut::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
        frame.put_u16(transaction_id);
        frame.put_u16(MODBUS_PROTOCOL_ID);
        frame.put_u16(pdu.len() as u16 + 1);
        frame.put_u8(unit_id);
        frame.put_slice(pdu.as_slice());

        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| FutSrvError::transport("not connected"))?;

        trace!("TX tid={} {:02X?}", transaction_id, &frame[..]);

        let exchange = async {
            stream.write_all(&frame).await?;

            let mut header = [0u8; MBAP_HEADER_LEN + 1];
            stream.read_exact(&mut header).await?;

            let length = usize::from(u16::from_be_bytes([header[4], header[5]]));
            if !(2..=MAX_MBAP_LENGTH).contains(&length) {
                return Err(FutSrvError::protocol(format!(
                    "invalid MBAP length {}",
                    length
                )));
            }
            let mut body = vec![0u8; length - 1];
            stream.read_exact(&mut body).await?;
            Ok::<_, FutSrvError>((header, body))
        };

        let result = match timeout(limit, exchange).await {
            Ok(result) => result,
            Err(_) => Err(FutSrvError::Timeout(format!(
                "no response from {} within {:?}",
                endpoint, limit
            ))),
        };

        let (header, body) = match result {
            Ok(frame) => frame,
            Err(e) => {
                // the stream may hold a partial frame; never reuse it
                self.stream = None;
                return Err(match e {
                    FutSrvError::Io(msg) => FutSrvError::Transport(msg),
                    other => other,
                });
            },
        };

        trace!("RX tid={} {:02X?}", transaction_id, &body[..]);

        let rx_transaction = u16::from_be_bytes([header[0], header[1]]);
        let rx_protocol = u16::from_be_bytes([header[2], header[3]]);
        let rx_unit = header[6];
        if rx_transaction != transaction_id || rx_protocol != MODBUS_PROTOCOL_ID || rx_unit != unit_id
        {
            self.stream = None;
            return Err(FutSrvError::protocol(format!(
                "unexpected MBAP header: tid={} (expected {}), protocol={}, unit={} (expected {})",
                rx_transaction, transaction_id, rx_protocol, rx_unit, unit_id
            )));
        }

        let response = ModbusPdu::from_slice(&body)?;
        if let Some(code) = response.exception_code() {
            return Err(FutSrvError::Exception {
                function: response.function_code().unwrap_or(0) & 0x7F,
                code,
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl RegisterTransport for ModbusTcpTransport {
    async fn connect(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let addr = self.endpoint();
        let stream = match timeout(self.timeout, TcpStream::connect(addr.as_str())).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(FutSrvError::transport(format!(
                    "connect {} failed: {}",
                    addr, e
                )))
            },
            Err(_) => {
                return Err(FutSrvError::Timeout(format!(
                    "connect {} timed out after {:?}",
                    addr, self.timeout
                )))
            },
        };
        if let Err(e) = stream.set_nodelay(true) {
            debug!("set_nodelay failed on {}: {}", addr, e);
        }
        self.stream = Some(stream);
        info!("Connected to {} (unit {})", addr, self.unit_id);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Shutdown of {} failed: {}", self.endpoint(), e);
            }
            info!("Disconnected from {}", self.endpoint());
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn read_registers(
        &mut self,
        kind: RegisterKind,
        start: u16,
        count: u16,
    ) -> Result<Vec<u16>> {
        if count == 0 || usize::from(count) > MODBUS_MAX_READ_REGISTERS {
            return Err(FutSrvError::protocol(format!(
                "register count {} outside 1..={}",
                count, MODBUS_MAX_READ_REGISTERS
            )));
        }

        let fc = read_function_code(kind);
        let request = PduBuilder::new()
            .function_code(fc)?
            .address(start)?
            .quantity(count)?
            .build();
        let response = self.request(&request).await?;

        if response.function_code() != Some(fc) {
            return Err(FutSrvError::protocol(format!(
                "function code mismatch: expected {:02X}, got {:02X?}",
                fc,
                response.function_code()
            )));
        }
        let data = response.as_slice();
        let byte_count = usize::from(data.get(1).copied().unwrap_or(0));
        if byte_count != usize::from(count) * 2 || data.len() != 2 + byte_count {
            return Err(FutSrvError::protocol(format!(
                "byte count mismatch: expected {}, got {} ({} bytes in PDU)",
                usize::from(count) * 2,
                byte_count,
                data.len()
            )));
        }

        (0..usize::from(count))
            .map(|i| {
                response
                    .u16_at(2 + i * 2)
                    .ok_or_else(|| FutSrvError::protocol("truncated register data"))
            })
            .collect()
    }

    async fn write_register(&mut self, address: u16, value: u16) -> Result<()> {
        let request = PduBuilder::new()
            .function_code(FC_WRITE_SINGLE_REGISTER)?
            .address(address)?
            .value(value)?
            .build();
        let response = self.request(&request).await?;

        if response.as_slice() != request.as_slice() {
            return Err(FutSrvError::protocol(format!(
                "write echo mismatch for register {}: {:02X?}",
                address,
                response.as_slice()
            )));
        }
        Ok(())
    }

    fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
