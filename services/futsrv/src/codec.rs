//! Register codec
//!
//! Converts between sparse raw register maps and typed, named records.
//! Decoding never fails: absent registers read as zero. Encoding rejects any
//! value whose register form would not fit in 16 bits (or 32 bits for
//! two-register fields).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::trace;

use crate::address_map::{
    AddressMap, FieldKey, FieldSpec, RegisterKind, RegisterSpan, Signedness, WritableFieldSpec,
};
use crate::error::{FutSrvError, Result};

/// Smallest encodable register value (signed view)
pub const REGISTER_MIN: i64 = i16::MIN as i64;
/// Largest encodable register value (unsigned view)
pub const REGISTER_MAX: i64 = u16::MAX as i64;

/// Address to raw value map produced by one read operation
///
/// Addresses that were not read are absent, not zero.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRegisterMap(BTreeMap<u16, u16>);

impl RawRegisterMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: u16, value: u16) {
        self.0.insert(address, value);
    }

    /// Insert consecutive values starting at `start`; values that would run
    /// past the address space are dropped
    pub fn insert_block(&mut self, start: u16, values: &[u16]) {
        for (offset, value) in values.iter().enumerate() {
            let Some(address) = u16::try_from(offset)
                .ok()
                .and_then(|offset| start.checked_add(offset))
            else {
                break;
            };
            self.0.insert(address, *value);
        }
    }

    pub fn get(&self, address: u16) -> Option<u16> {
        self.0.get(&address).copied()
    }

    /// Raw value with the decode-boundary default of zero
    pub fn value_or_zero(&self, address: u16) -> u16 {
        self.get(address).unwrap_or(0)
    }

    pub fn contains(&self, address: u16) -> bool {
        self.0.contains_key(&address)
    }

    /// Whether every register of `spec` was read
    pub fn covers(&self, spec: &FieldSpec) -> bool {
        spec.addresses().all(|addr| self.contains(addr))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Entries in ascending address order
    pub fn iter(&self) -> impl Iterator<Item = (u16, u16)> + '_ {
        self.0.iter().map(|(a, v)| (*a, *v))
    }
}

impl FromIterator<(u16, u16)> for RawRegisterMap {
    fn from_iter<I: IntoIterator<Item = (u16, u16)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Decoded physical value
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Unscaled words, flags, counters and 32-bit values
    Integer(i64),
    /// Scaled physical quantities
    Real(f64),
}

impl FieldValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Integer(v) => *v as f64,
            Self::Real(v) => *v,
        }
    }

    /// Represent a physical value the way decoding would for `spec`
    pub fn for_spec(spec: &FieldSpec, value: f64) -> Self {
        if spec.is_integral() && value.fract() == 0.0 {
            Self::Integer(value as i64)
        } else {
            Self::Real(value)
        }
    }
}

/// Typed snapshot of one register kind
///
/// Entries keep schema order. JSON output groups instance fields into
/// arrays named by their base name, e.g. `"UITemp": [21.5, 0.0, 0.0]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRecord {
    kind: RegisterKind,
    entries: Vec<(FieldKey, FieldValue)>,
}

impl DecodedRecord {
    pub fn new(kind: RegisterKind) -> Self {
        Self {
            kind,
            entries: Vec::new(),
        }
    }

    pub fn kind(&self) -> RegisterKind {
        self.kind
    }

    /// Value by external name (`CfgTempSet`, `ExtSensTemp3`)
    pub fn get(&self, name: &str) -> Option<FieldValue> {
        self.entries
            .iter()
            .find(|(key, _)| key.external_name() == name)
            .map(|(_, value)| *value)
    }

    pub fn get_key(&self, key: &FieldKey) -> Option<FieldValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, value)| *value)
    }

    /// Set a value, appending the field if it is not present yet
    pub fn set(&mut self, key: FieldKey, value: FieldValue) {
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &(FieldKey, FieldValue)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum Group {
    Scalar(FieldValue),
    Array(Vec<FieldValue>),
}

impl Serialize for Group {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Scalar(value) => value.serialize(serializer),
            Self::Array(values) => values.serialize(serializer),
        }
    }
}

impl Serialize for DecodedRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut groups: Vec<(&str, Group)> = Vec::new();
        for (key, value) in &self.entries {
            match key.index {
                None => groups.push((key.base, Group::Scalar(*value))),
                Some(index) => {
                    let index = usize::from(index);
                    let pos = groups
                        .iter()
                        .position(|(base, group)| *base == key.base && matches!(group, Group::Array(_)));
                    let pos = match pos {
                        Some(pos) => pos,
                        None => {
                            groups.push((key.base, Group::Array(Vec::new())));
                            groups.len() - 1
                        },
                    };
                    if let Group::Array(values) = &mut groups[pos].1 {
                        if values.len() <= index {
                            values.resize(index + 1, FieldValue::Integer(0));
                        }
                        values[index] = *value;
                    }
                },
            }
        }

        let mut map = serializer.serialize_map(Some(groups.len()))?;
        for (base, group) in &groups {
            map.serialize_entry(base, group)?;
        }
        map.end()
    }
}

/// Apply a scale factor. Reciprocal-integer scales (0.1, 0.01) divide instead
/// of multiply so 215 * 0.1 prints as 21.5.
fn apply_scale(raw: f64, scale: f64) -> f64 {
    let inverse = 1.0 / scale;
    let rounded = inverse.round();
    if rounded >= 1.0 && (inverse - rounded).abs() < 1e-9 {
        raw / rounded
    } else {
        raw * scale
    }
}

/// Inverse of [`apply_scale`], before rounding
fn remove_scale(value: f64, scale: f64) -> f64 {
    let inverse = 1.0 / scale;
    let rounded = inverse.round();
    if rounded >= 1.0 && (inverse - rounded).abs() < 1e-9 {
        value * rounded
    } else {
        value / scale
    }
}

/// Bidirectional register codec bound to one address map
#[derive(Debug, Clone)]
pub struct Codec {
    map: Arc<AddressMap>,
}

impl Codec {
    pub fn new(map: Arc<AddressMap>) -> Self {
        Self { map }
    }

    pub fn address_map(&self) -> &Arc<AddressMap> {
        &self.map
    }

    /// Decode one field from a raw map; absent registers read as zero
    pub fn decode_field(spec: &FieldSpec, raw: &RawRegisterMap) -> FieldValue {
        match spec.span {
            RegisterSpan::Double => {
                let hi = u32::from(raw.value_or_zero(spec.address));
                let lo = u32::from(raw.value_or_zero(spec.address.wrapping_add(1)));
                let value = (hi << 16) | lo;
                if spec.scale == 1.0 {
                    FieldValue::Integer(i64::from(value))
                } else {
                    FieldValue::Real(apply_scale(f64::from(value), spec.scale))
                }
            },
            RegisterSpan::Single => {
                let word = raw.value_or_zero(spec.address);
                let value = match spec.signedness {
                    Signedness::Signed => i64::from(word as i16),
                    Signedness::Unsigned => i64::from(word),
                };
                if spec.scale == 1.0 {
                    FieldValue::Integer(value)
                } else {
                    FieldValue::Real(apply_scale(value as f64, spec.scale))
                }
            },
        }
    }

    /// Decode every field of `kind`
    pub fn decode(&self, kind: RegisterKind, raw: &RawRegisterMap) -> DecodedRecord {
        let fields = self.map.fields(kind);
        let mut record = DecodedRecord {
            kind,
            entries: Vec::with_capacity(fields.len()),
        };
        for spec in fields {
            record
                .entries
                .push((spec.key, Self::decode_field(spec, raw)));
        }
        trace!("Decoded {} {} fields from {} registers", record.len(), kind, raw.len());
        record
    }

    /// Overwrite aliased input fields with their holding values.
    ///
    /// Only holding registers that were actually read take part; a failed
    /// holding block leaves the input value untouched. Returns the number of
    /// fields replaced.
    pub fn merge_aliases(&self, input: &mut DecodedRecord, holding_raw: &RawRegisterMap) -> usize {
        let mut merged = 0;
        for alias in self.map.aliases() {
            if !holding_raw.covers(&alias.holding) {
                continue;
            }
            input.set(alias.input, Self::decode_field(&alias.holding, holding_raw));
            merged += 1;
        }
        merged
    }

    /// Encode a physical value into one register word.
    ///
    /// `round(value / scale)` must lie within `-32768..=65535`; the result is
    /// the 16-bit two's-complement pattern.
    pub fn encode_value(spec: &WritableFieldSpec, value: f64) -> Result<u16> {
        let name = spec.key.external_name();
        if !value.is_finite() {
            return Err(FutSrvError::invalid_payload(format!(
                "value for {} is not a finite number",
                name
            )));
        }
        let scaled = remove_scale(value, spec.scale).round();
        // saturating float-to-int cast keeps huge inputs out of range
        let scaled_int = scaled as i64;
        if !(REGISTER_MIN..=REGISTER_MAX).contains(&scaled_int) {
            return Err(FutSrvError::OutOfRange {
                field: name,
                value,
                scaled: scaled_int,
            });
        }
        Ok(scaled_int as u16)
    }

    fn encode_dword(spec: &FieldSpec, value: f64) -> Result<(u16, u16)> {
        let scaled = remove_scale(value, spec.scale).round();
        let scaled_int = scaled as i64;
        if !value.is_finite() || !(0..=i64::from(u32::MAX)).contains(&scaled_int) {
            return Err(FutSrvError::OutOfRange {
                field: spec.key.external_name(),
                value,
                scaled: scaled_int,
            });
        }
        let dword = scaled_int as u32;
        Ok(((dword >> 16) as u16, (dword & 0xFFFF) as u16))
    }

    /// Encode every field present in `record` back into registers
    pub fn encode(&self, record: &DecodedRecord) -> Result<RawRegisterMap> {
        let mut raw = RawRegisterMap::new();
        for spec in self.map.fields(record.kind()) {
            let Some(value) = record.get_key(&spec.key) else {
                continue;
            };
            match spec.span {
                RegisterSpan::Single => {
                    let writable = WritableFieldSpec::try_from(spec)?;
                    raw.insert(spec.address, Self::encode_value(&writable, value.as_f64())?);
                },
                RegisterSpan::Double => {
                    let (hi, lo) = Self::encode_dword(spec, value.as_f64())?;
                    raw.insert(spec.address, hi);
                    raw.insert(spec.address.wrapping_add(1), lo);
                },
            }
        }
        Ok(raw)
    }
}
