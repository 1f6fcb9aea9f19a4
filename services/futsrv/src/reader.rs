//! Batched range reader
//!
//! Reads register ranges in blocks no larger than the device's per-request
//! limit. A failed block gets one reconnect and one retry; if the retry
//! fails too the block is skipped and its addresses stay absent. Read
//! failures never propagate to the caller.

use std::time::Duration;

use tracing::{debug, error, warn};

use crate::address_map::{Block, RegisterKind, RegisterRange};
use crate::codec::RawRegisterMap;
use crate::connection::DeviceConnection;
use crate::error::{FutSrvError, Result};
use crate::protocol::constants::MODBUS_MAX_READ_REGISTERS;

/// Retries allowed per block after the first attempt
const BLOCK_RETRIES: usize = 1;

/// Default pause between closing and reopening the link
pub const DEFAULT_RECONNECT_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct RangeReader {
    connection: DeviceConnection,
    max_block_size: u16,
    reconnect_backoff: Duration,
}

impl RangeReader {
    /// `max_block_size` must be within `1..=125`
    pub fn new(
        connection: DeviceConnection,
        max_block_size: u16,
        reconnect_backoff: Duration,
    ) -> Result<Self> {
        validate_block_size(max_block_size)?;
        Ok(Self {
            connection,
            max_block_size,
            reconnect_backoff,
        })
    }

    pub fn max_block_size(&self) -> u16 {
        self.max_block_size
    }

    /// Read every range of `kind` and merge the results
    ///
    /// Output keys are always a subset of the union of `ranges`.
    pub async fn read_ranges(&self, ranges: &[RegisterRange], kind: RegisterKind) -> RawRegisterMap {
        let mut out = RawRegisterMap::new();
        for range in ranges {
            for block in range.blocks(self.max_block_size) {
                if let Some(values) = self.read_block(kind, block).await {
                    out.insert_block(block.start, &values[..values.len().min(usize::from(block.count))]);
                }
            }
        }
        debug!("Read {} {} registers from {} ranges", out.len(), kind, ranges.len());
        out
    }

    /// One block with at most one reconnect-and-retry
    async fn read_block(&self, kind: RegisterKind, block: Block) -> Option<Vec<u16>> {
        let mut session = self.connection.session().await;

        for attempt in 0..=BLOCK_RETRIES {
            match session.read_registers(kind, block.start, block.count).await {
                Ok(values) => return Some(values),
                Err(e) if attempt < BLOCK_RETRIES => {
                    warn!(
                        "ReadRegisters error for {} {}-{}: {}",
                        kind,
                        block.start,
                        block.last(),
                        e
                    );
                    if let Err(e) = session.reopen(self.reconnect_backoff).await {
                        error!("Re-open failed: {}", e);
                        return None;
                    }
                },
                Err(e) => {
                    warn!(
                        "ReadRegisters retry failed for {} {}-{}: {}",
                        kind,
                        block.start,
                        block.last(),
                        e
                    );
                },
            }
        }
        None
    }
}

/// Block size must fit one request
pub fn validate_block_size(max_block_size: u16) -> Result<()> {
    if max_block_size == 0 || usize::from(max_block_size) > MODBUS_MAX_READ_REGISTERS {
        return Err(FutSrvError::config(format!(
            "max_block_size must be within 1..={}, got {}",
            MODBUS_MAX_READ_REGISTERS, max_block_size
        )));
    }
    Ok(())
}
