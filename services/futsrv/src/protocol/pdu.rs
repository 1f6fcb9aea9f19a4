//! Modbus PDU buffer
//!
//! Fixed-size stack array, no heap allocation per request.

use tracing::trace;

use super::constants::{
    EXCEPTION_FLAG, FC_READ_HOLDING_REGISTERS, FC_READ_INPUT_REGISTERS, FC_WRITE_SINGLE_REGISTER,
    MAX_PDU_SIZE,
};
use crate::error::{FutSrvError, Result};

/// PDU with stack-allocated fixed array
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    /// Create an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from a byte slice
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(FutSrvError::protocol(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }

        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();

        if let Some(fc) = pdu.function_code() {
            trace!(
                "PDU parsed: FC={:02X} ({}), len={}",
                fc,
                Self::function_code_description(fc),
                pdu.len
            );
        }

        Ok(pdu)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(FutSrvError::protocol("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> Result<()> {
        let [hi, lo] = value.to_be_bytes();
        self.push(hi)?;
        self.push(lo)
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Function code (first byte)
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        (self.len > 0).then_some(self.data[0])
    }

    /// Check if exception response
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .map(|fc| fc & EXCEPTION_FLAG != 0)
            .unwrap_or(false)
    }

    /// Exception code of an exception response
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        if self.is_exception() && self.len > 1 {
            Some(self.data[1])
        } else {
            None
        }
    }

    /// Big-endian u16 at byte offset `at`
    #[inline]
    pub fn u16_at(&self, at: usize) -> Option<u16> {
        if at + 1 < self.len {
            Some(u16::from_be_bytes([self.data[at], self.data[at + 1]]))
        } else {
            None
        }
    }

    fn function_code_description(fc: u8) -> &'static str {
        match fc & !EXCEPTION_FLAG {
            FC_READ_HOLDING_REGISTERS => "Read Holding Registers",
            FC_READ_INPUT_REGISTERS => "Read Input Registers",
            FC_WRITE_SINGLE_REGISTER => "Write Single Register",
            _ => "Unknown Function",
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

/// PDU builder - fluent API
pub struct PduBuilder {
    pdu: ModbusPdu,
}

impl Default for PduBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PduBuilder {
    #[inline]
    pub fn new() -> Self {
        Self {
            pdu: ModbusPdu::new(),
        }
    }

    /// Set function code
    #[inline]
    pub fn function_code(mut self, fc: u8) -> Result<Self> {
        self.pdu.push(fc)?;
        Ok(self)
    }

    /// Add address
    #[inline]
    pub fn address(mut self, addr: u16) -> Result<Self> {
        self.pdu.push_u16(addr)?;
        Ok(self)
    }

    /// Add quantity
    #[inline]
    pub fn quantity(mut self, qty: u16) -> Result<Self> {
        self.pdu.push_u16(qty)?;
        Ok(self)
    }

    /// Add a register value
    #[inline]
    pub fn value(mut self, value: u16) -> Result<Self> {
        self.pdu.push_u16(value)?;
        Ok(self)
    }

    /// Build the PDU
    #[inline]
    pub fn build(self) -> ModbusPdu {
        if let Some(fc) = self.pdu.function_code() {
            trace!(
                "PDU built: FC={:02X} ({}), total_len={}",
                fc,
                ModbusPdu::function_code_description(fc),
                self.pdu.len()
            );
        }
        self.pdu
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_pdu_builder() {
        let pdu = PduBuilder::new()
            .function_code(0x04)
            .unwrap()
            .address(0x0064)
            .unwrap()
            .quantity(0x0037)
            .unwrap()
            .build();

        assert_eq!(pdu.len(), 5);
        assert_eq!(pdu.as_slice(), &[0x04, 0x00, 0x64, 0x00, 0x37]);
        assert_eq!(pdu.u16_at(1), Some(100));
        assert_eq!(pdu.u16_at(4), None);
    }

    #[test]
    fn test_write_single_register_pdu() {
        let pdu = PduBuilder::new()
            .function_code(FC_WRITE_SINGLE_REGISTER)
            .unwrap()
            .address(10)
            .unwrap()
            .value(215)
            .unwrap()
            .build();
        assert_eq!(pdu.as_slice(), &[0x06, 0x00, 0x0A, 0x00, 0xD7]);
    }

    #[test]
    fn test_exception_response() {
        let pdu = ModbusPdu::from_slice(&[0x83, 0x02]).unwrap();
        assert!(pdu.is_exception());
        assert_eq!(pdu.exception_code(), Some(0x02));

        let normal = ModbusPdu::from_slice(&[0x03, 0x02, 0x00, 0x01]).unwrap();
        assert!(!normal.is_exception());
        assert_eq!(normal.exception_code(), None);
    }

    #[test]
    fn test_pdu_from_slice_too_large() {
        let result = ModbusPdu::from_slice(&vec![0xFF; MAX_PDU_SIZE + 1]);
        assert!(result.unwrap_err().to_string().contains("PDU too large"));
    }

    #[test]
    fn test_pdu_push_until_full() {
        let mut pdu = ModbusPdu::new();
        for i in 0..MAX_PDU_SIZE {
            assert!(pdu.push(i as u8).is_ok(), "Push #{} should succeed", i);
        }
        assert!(pdu.push(0).is_err());
        assert!(pdu.push_u16(0).is_err());
    }

    #[test]
    fn test_empty_pdu() {
        let pdu = ModbusPdu::from_slice(&[]).unwrap();
        assert!(pdu.is_empty());
        assert_eq!(pdu.function_code(), None);
        assert!(!pdu.is_exception());
    }
}
