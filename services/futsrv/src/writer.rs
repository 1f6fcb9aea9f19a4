//! Holding register write dispatch
//!
//! A single named field becomes exactly one FC06 write. Bulk updates decode
//! the current holding state, apply the overrides in memory and write every
//! affected writable register one at a time, stopping at the first failure.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::address_map::{AddressMap, FieldSpec, RegisterKind};
use crate::codec::{Codec, FieldValue};
use crate::connection::DeviceConnection;
use crate::error::{FutSrvError, Result};
use crate::reader::RangeReader;

/// Write request decoded from an untyped JSON object
#[derive(Debug, Clone, PartialEq)]
pub enum WritePayload {
    /// Exactly one `{field: value}` pair
    Single { field: String, value: f64 },
    /// Several fields applied through the bulk path
    Bulk(BTreeMap<String, f64>),
}

impl WritePayload {
    /// Validate the shape of a JSON body: a non-empty object of numbers
    pub fn from_json(body: &Value) -> Result<Self> {
        let object = body
            .as_object()
            .ok_or_else(|| FutSrvError::invalid_payload("expected a JSON object"))?;
        if object.is_empty() {
            return Err(FutSrvError::invalid_payload("no fields given"));
        }

        let mut fields = BTreeMap::new();
        for (name, value) in object {
            let number = value.as_f64().ok_or_else(|| {
                FutSrvError::invalid_payload(format!("value for {} must be a number", name))
            })?;
            fields.insert(name.clone(), number);
        }

        if fields.len() == 1 {
            if let Some((field, value)) = fields.into_iter().next() {
                return Ok(Self::Single { field, value });
            }
            return Err(FutSrvError::invalid_payload("no fields given"));
        }
        Ok(Self::Bulk(fields))
    }
}

/// Result of a single-field write
#[derive(Debug, Clone, Serialize)]
pub struct WriteReceipt {
    pub field: String,
    pub address: u16,
    pub encoded: u16,
}

/// Result of a bulk update
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkWriteReport {
    /// Registers written, in address order
    pub written: Vec<u16>,
    /// Recognized overrides that were applied
    pub applied: Vec<String>,
    /// Payload names that are not writable fields
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct WriteDispatcher {
    map: Arc<AddressMap>,
    connection: DeviceConnection,
    reader: RangeReader,
    codec: Codec,
}

impl WriteDispatcher {
    pub fn new(map: Arc<AddressMap>, connection: DeviceConnection, reader: RangeReader) -> Self {
        let codec = Codec::new(map.clone());
        Self {
            map,
            connection,
            reader,
            codec,
        }
    }

    /// Encode and write one field. No confirmation read is issued.
    pub async fn write_field(&self, name: &str, value: f64) -> Result<WriteReceipt> {
        let spec = self
            .map
            .writable(name)
            .ok_or_else(|| FutSrvError::UnknownOrNotWritable(name.to_string()))?;
        let encoded = Codec::encode_value(spec, value)?;

        info!(
            "WriteSingleRegister: {} -> {} (addr {}, encoded 0x{:04X})",
            name, value, spec.address, encoded
        );
        self.connection
            .session()
            .await
            .write_register(spec.address, encoded)
            .await
            .map_err(|e| FutSrvError::write_failed(spec.address, &e))?;
        debug!(
            "WriteSingleRegister success: {} (addr {}, encoded 0x{:04X})",
            name, spec.address, encoded
        );

        Ok(WriteReceipt {
            field: name.to_string(),
            address: spec.address,
            encoded,
        })
    }

    /// Apply several overrides on top of the current holding state.
    ///
    /// Only writable fields are written, and only those whose register was
    /// read in this pass or that were overridden; registers the poll ranges
    /// never cover are left alone. Every value is encoded before the first
    /// write, so an out-of-range override writes nothing. Writes go out in
    /// ascending address order; the first failure aborts the rest and
    /// earlier writes stay applied.
    pub async fn bulk_update(&self, overrides: &BTreeMap<String, f64>) -> Result<BulkWriteReport> {
        let mut report = BulkWriteReport::default();
        let mut targets = BTreeSet::new();
        for name in overrides.keys() {
            if self.map.writable(name).is_some() {
                targets.insert(name.as_str());
            } else {
                report.ignored.push(name.clone());
            }
        }
        if !report.ignored.is_empty() {
            warn!("Bulk update ignoring unknown or read-only fields: {:?}", report.ignored);
        }
        if targets.is_empty() {
            info!("Bulk update has no writable fields; nothing to write");
            return Ok(report);
        }

        let raw = self
            .reader
            .read_ranges(self.map.ranges(RegisterKind::Holding), RegisterKind::Holding)
            .await;
        let mut record = self.codec.decode(RegisterKind::Holding, &raw);

        for name in &targets {
            if let (Some(spec), Some(value)) = (self.map.writable(name), overrides.get(*name)) {
                let full = FieldSpec::from(spec);
                record.set(spec.key, FieldValue::for_spec(&full, *value));
                report.applied.push(name.to_string());
            }
        }

        let mut encoded = BTreeMap::new();
        for spec in self.map.writable_fields() {
            let name = spec.key.external_name();
            let overridden = targets.contains(name.as_str());
            if !overridden && !raw.contains(spec.address) {
                continue;
            }
            let value = record
                .get_key(&spec.key)
                .map(|v| v.as_f64())
                .unwrap_or_default();
            encoded.insert(spec.address, Codec::encode_value(spec, value)?);
        }

        let mut session = self.connection.session().await;
        for (address, value) in encoded {
            debug!("Writing register {} = 0x{:04X}", address, value);
            if let Err(e) = session.write_register(address, value).await {
                warn!(
                    "Bulk update stopped at register {} after {} writes: {}",
                    address,
                    report.written.len(),
                    e
                );
                return Err(FutSrvError::write_failed(address, &e));
            }
            report.written.push(address);
        }

        info!("Bulk write completed: {} registers written", report.written.len());
        Ok(report)
    }
}
