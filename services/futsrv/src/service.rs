//! Device service
//!
//! Ties the reader, codec and write dispatcher to one address map and one
//! connection. The poll loop and the HTTP handlers both go through here, so
//! the alias merge is applied the same way on every read path.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};

use crate::address_map::{AddressMap, RegisterKind};
use crate::codec::{Codec, DecodedRecord, RawRegisterMap};
use crate::connection::DeviceConnection;
use crate::error::Result;
use crate::reader::RangeReader;
use crate::writer::{WriteDispatcher, WritePayload};

/// Merged input record plus the register counts behind it
#[derive(Debug, Clone)]
pub struct InputSnapshot {
    pub record: DecodedRecord,
    pub input_registers: usize,
    pub holding_registers: usize,
    pub merged_aliases: usize,
}

/// Outcome of a write request
#[derive(Debug, Clone, Serialize)]
pub struct WriteOutcome {
    pub message: String,
    pub written: usize,
}

#[derive(Debug, Clone)]
pub struct DeviceService {
    map: Arc<AddressMap>,
    connection: DeviceConnection,
    reader: RangeReader,
    codec: Codec,
    writer: WriteDispatcher,
}

impl DeviceService {
    pub fn new(map: Arc<AddressMap>, connection: DeviceConnection, reader: RangeReader) -> Self {
        let codec = Codec::new(map.clone());
        let writer = WriteDispatcher::new(map.clone(), connection.clone(), reader.clone());
        Self {
            map,
            connection,
            reader,
            codec,
            writer,
        }
    }

    pub fn address_map(&self) -> &Arc<AddressMap> {
        &self.map
    }

    pub fn connection(&self) -> &DeviceConnection {
        &self.connection
    }

    /// Read every configured range of `kind`
    pub async fn read_raw(&self, kind: RegisterKind) -> RawRegisterMap {
        self.reader.read_ranges(self.map.ranges(kind), kind).await
    }

    /// Read both kinds and return the input record with aliases merged
    pub async fn read_input(&self) -> InputSnapshot {
        let input_raw = self.read_raw(RegisterKind::Input).await;
        let holding_raw = self.read_raw(RegisterKind::Holding).await;

        let mut record = self.codec.decode(RegisterKind::Input, &input_raw);
        let merged_aliases = self.codec.merge_aliases(&mut record, &holding_raw);
        debug!(
            "Input read: {} input, {} holding registers, {} aliases merged",
            input_raw.len(),
            holding_raw.len(),
            merged_aliases
        );

        InputSnapshot {
            record,
            input_registers: input_raw.len(),
            holding_registers: holding_raw.len(),
            merged_aliases,
        }
    }

    /// Read and decode the holding kind
    pub async fn read_holding(&self) -> DecodedRecord {
        let raw = self.read_raw(RegisterKind::Holding).await;
        self.codec.decode(RegisterKind::Holding, &raw)
    }

    /// Route a validated payload to the single or bulk write path
    pub async fn write(&self, payload: WritePayload) -> Result<WriteOutcome> {
        match payload {
            WritePayload::Single { field, value } => {
                info!("Single write requested: {} = {}", field, value);
                let receipt = self.writer.write_field(&field, value).await?;
                Ok(WriteOutcome {
                    message: format!("{} updated", receipt.field),
                    written: 1,
                })
            },
            WritePayload::Bulk(fields) => {
                info!("Bulk write requested for {} fields", fields.len());
                let report = self.writer.bulk_update(&fields).await?;
                let message = if report.written.is_empty() {
                    "No writable fields in request".to_string()
                } else {
                    "Registers updated successfully".to_string()
                };
                Ok(WriteOutcome {
                    message,
                    written: report.written.len(),
                })
            },
        }
    }
}
