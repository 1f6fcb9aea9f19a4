//! Register address map
//!
//! Static layout of the device: which named field lives at which register,
//! how it is scaled, and which ranges are read on a full poll. The tables are
//! built once at startup and shared read-only afterwards.

pub mod futura;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FutSrvError, Result};

/// Hard upper bound of the 16-bit register address space
pub const ADDRESS_SPACE_MAX: u16 = u16::MAX;

/// Register address space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterKind {
    /// Read-only registers (FC04)
    Input,
    /// Read/write registers (FC03 / FC06)
    Holding,
}

impl RegisterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Holding => "holding",
        }
    }
}

impl fmt::Display for RegisterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive register range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterRange {
    pub start: u16,
    pub end: u16,
}

impl RegisterRange {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Parse a `[start, end]` pair from configuration
    pub fn from_bounds(kind: RegisterKind, index: usize, bounds: &[u16]) -> Result<Self> {
        match bounds {
            [start, end] => Ok(Self::new(*start, *end)),
            _ => Err(FutSrvError::schema(format!(
                "{} range {} must have exactly 2 values, got {}",
                kind,
                index,
                bounds.len()
            ))),
        }
    }

    /// Number of registers covered, `end - start + 1`
    ///
    /// Returns 0 for an inverted range; such ranges are rejected by
    /// [`AddressMap::validate`].
    pub fn len(&self) -> u32 {
        if self.start > self.end {
            0
        } else {
            u32::from(self.end) - u32::from(self.start) + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, address: u16) -> bool {
        (self.start..=self.end).contains(&address)
    }

    /// Split the range into consecutive blocks of at most `max_block_size`
    /// registers. The last block may be shorter.
    pub fn blocks(&self, max_block_size: u16) -> Blocks {
        Blocks {
            next: u32::from(self.start),
            end: if self.is_empty() {
                0
            } else {
                u32::from(self.end) + 1
            },
            max: u32::from(max_block_size.max(1)),
        }
    }
}

impl fmt::Display for RegisterRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// One bounded read request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: u16,
    pub count: u16,
}

impl Block {
    /// Last address covered by the block
    pub fn last(&self) -> u16 {
        self.start.saturating_add(self.count.saturating_sub(1))
    }
}

/// Iterator over the blocks of a [`RegisterRange`]
#[derive(Debug, Clone)]
pub struct Blocks {
    next: u32,
    end: u32,
    max: u32,
}

impl Iterator for Blocks {
    type Item = Block;

    fn next(&mut self) -> Option<Block> {
        if self.next >= self.end {
            return None;
        }
        let count = self.max.min(self.end - self.next);
        let block = Block {
            start: self.next as u16,
            count: count as u16,
        };
        self.next += count;
        Some(block)
    }
}

/// How a single register word is interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signedness {
    Signed,
    Unsigned,
}

/// Number of registers a field occupies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RegisterSpan {
    /// One 16-bit word
    Single,
    /// Two consecutive words, high word first, forming an unsigned 32-bit value
    Double,
}

impl RegisterSpan {
    pub fn register_count(&self) -> u16 {
        match self {
            Self::Single => 1,
            Self::Double => 2,
        }
    }
}

/// Field identity: a base name plus an optional 0-based instance index
///
/// Instance fields are named 1-based externally, so `UITemp` index 0 is
/// exposed as `UITemp1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldKey {
    pub base: &'static str,
    pub index: Option<u8>,
}

impl FieldKey {
    pub const fn scalar(base: &'static str) -> Self {
        Self { base, index: None }
    }

    pub const fn instance(base: &'static str, index: u8) -> Self {
        Self {
            base,
            index: Some(index),
        }
    }

    /// Name used in JSON payloads, logs and lookups
    pub fn external_name(&self) -> String {
        match self.index {
            Some(index) => format!("{}{}", self.base, u16::from(index) + 1),
            None => self.base.to_string(),
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}{}", self.base, u16::from(index) + 1),
            None => f.write_str(self.base),
        }
    }
}

/// Layout of one named field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    pub key: FieldKey,
    pub address: u16,
    pub scale: f64,
    pub span: RegisterSpan,
    pub signedness: Signedness,
}

impl FieldSpec {
    /// Unsigned 16-bit raw value
    pub const fn word(base: &'static str, address: u16) -> Self {
        Self {
            key: FieldKey::scalar(base),
            address,
            scale: 1.0,
            span: RegisterSpan::Single,
            signedness: Signedness::Unsigned,
        }
    }

    /// Unsigned 32-bit value over two registers
    pub const fn dword(base: &'static str, address: u16) -> Self {
        Self {
            key: FieldKey::scalar(base),
            address,
            scale: 1.0,
            span: RegisterSpan::Double,
            signedness: Signedness::Unsigned,
        }
    }

    /// Signed 16-bit value multiplied by `scale`
    pub const fn signed(base: &'static str, address: u16, scale: f64) -> Self {
        Self {
            key: FieldKey::scalar(base),
            address,
            scale,
            span: RegisterSpan::Single,
            signedness: Signedness::Signed,
        }
    }

    /// Unsigned 16-bit value multiplied by `scale`
    pub const fn unsigned(base: &'static str, address: u16, scale: f64) -> Self {
        Self {
            key: FieldKey::scalar(base),
            address,
            scale,
            span: RegisterSpan::Single,
            signedness: Signedness::Unsigned,
        }
    }

    /// Same layout, assigned to instance `index`
    pub const fn at_instance(mut self, index: u8) -> Self {
        self.key = FieldKey::instance(self.key.base, index);
        self
    }

    pub fn register_count(&self) -> u16 {
        self.span.register_count()
    }

    /// Addresses occupied by this field
    pub fn addresses(&self) -> impl Iterator<Item = u16> {
        let start = u32::from(self.address);
        (start..start + u32::from(self.register_count()))
            .filter_map(|addr| u16::try_from(addr).ok())
    }

    /// Whether values are carried as plain integers rather than scaled reals
    pub fn is_integral(&self) -> bool {
        self.span == RegisterSpan::Double || self.scale == 1.0
    }
}

/// A field accepted by the single-register write path
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WritableFieldSpec {
    pub key: FieldKey,
    pub address: u16,
    pub scale: f64,
    pub signedness: Signedness,
}

impl TryFrom<&FieldSpec> for WritableFieldSpec {
    type Error = FutSrvError;

    fn try_from(spec: &FieldSpec) -> Result<Self> {
        if spec.span != RegisterSpan::Single {
            return Err(FutSrvError::UnknownOrNotWritable(format!(
                "{} requires {} registers; single-register write not supported",
                spec.key,
                spec.register_count()
            )));
        }
        Ok(Self {
            key: spec.key,
            address: spec.address,
            scale: spec.scale,
            signedness: spec.signedness,
        })
    }
}

impl From<&WritableFieldSpec> for FieldSpec {
    fn from(spec: &WritableFieldSpec) -> Self {
        Self {
            key: spec.key,
            address: spec.address,
            scale: spec.scale,
            span: RegisterSpan::Single,
            signedness: spec.signedness,
        }
    }
}

/// Per-kind part of the map
#[derive(Debug, Clone)]
struct KindLayout {
    fields: Vec<FieldSpec>,
    ranges: Vec<RegisterRange>,
    max_addr: u16,
    by_name: HashMap<String, usize>,
}

impl KindLayout {
    fn new(fields: Vec<FieldSpec>, ranges: Vec<RegisterRange>, max_addr: u16) -> Self {
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(idx, spec)| (spec.key.external_name(), idx))
            .collect();
        Self {
            fields,
            ranges,
            max_addr,
            by_name,
        }
    }

    fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.by_name.get(name).map(|&idx| &self.fields[idx])
    }
}

/// Cross-kind alias: an input field whose authoritative value lives in the
/// holding field of the same name
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alias {
    pub input: FieldKey,
    pub holding: FieldSpec,
}

/// Complete device layout for both register kinds
#[derive(Debug, Clone)]
pub struct AddressMap {
    input: KindLayout,
    holding: KindLayout,
    writable: HashMap<String, WritableFieldSpec>,
    aliases: Vec<Alias>,
}

impl AddressMap {
    /// Build a map from field tables.
    ///
    /// `writable` names holding fields by external name; `aliased` lists the
    /// base names mirrored from holding into input records.
    pub fn new(
        input: (Vec<FieldSpec>, Vec<RegisterRange>, u16),
        holding: (Vec<FieldSpec>, Vec<RegisterRange>, u16),
        writable: &[String],
        aliased: &[&str],
    ) -> Result<Self> {
        let input = KindLayout::new(input.0, input.1, input.2);
        let holding = KindLayout::new(holding.0, holding.1, holding.2);

        let mut writable_specs = HashMap::with_capacity(writable.len());
        for name in writable {
            let spec = holding.get(name).ok_or_else(|| {
                FutSrvError::schema(format!("writable field {} is not a holding field", name))
            })?;
            let spec = WritableFieldSpec::try_from(spec)
                .map_err(|e| FutSrvError::schema(e.to_string()))?;
            writable_specs.insert(name.clone(), spec);
        }

        let aliases = input
            .fields
            .iter()
            .filter(|spec| aliased.contains(&spec.key.base))
            .filter_map(|spec| {
                holding
                    .get(&spec.key.external_name())
                    .map(|holding_spec| Alias {
                        input: spec.key,
                        holding: *holding_spec,
                    })
            })
            .collect();

        Ok(Self {
            input,
            holding,
            writable: writable_specs,
            aliases,
        })
    }

    fn layout(&self, kind: RegisterKind) -> &KindLayout {
        match kind {
            RegisterKind::Input => &self.input,
            RegisterKind::Holding => &self.holding,
        }
    }

    fn layout_mut(&mut self, kind: RegisterKind) -> &mut KindLayout {
        match kind {
            RegisterKind::Input => &mut self.input,
            RegisterKind::Holding => &mut self.holding,
        }
    }

    /// Look up a field by its external name
    pub fn field(&self, kind: RegisterKind, name: &str) -> Result<&FieldSpec> {
        self.layout(kind)
            .get(name)
            .ok_or_else(|| FutSrvError::UnknownField(format!("{} ({})", name, kind)))
    }

    /// All fields of a kind, in schema order
    pub fn fields(&self, kind: RegisterKind) -> &[FieldSpec] {
        &self.layout(kind).fields
    }

    /// Ranges read on a full poll
    pub fn ranges(&self, kind: RegisterKind) -> &[RegisterRange] {
        &self.layout(kind).ranges
    }

    pub fn max_addr(&self, kind: RegisterKind) -> u16 {
        self.layout(kind).max_addr
    }

    /// Writable spec for `name`, if the field accepts single-register writes
    pub fn writable(&self, name: &str) -> Option<&WritableFieldSpec> {
        self.writable.get(name)
    }

    /// All writable fields, ordered by address
    pub fn writable_fields(&self) -> Vec<&WritableFieldSpec> {
        let mut fields: Vec<_> = self.writable.values().collect();
        fields.sort_by_key(|spec| spec.address);
        fields
    }

    pub fn aliases(&self) -> &[Alias] {
        &self.aliases
    }

    /// Replace the poll ranges of a kind
    pub fn with_ranges(mut self, kind: RegisterKind, ranges: Vec<RegisterRange>) -> Self {
        self.layout_mut(kind).ranges = ranges;
        self
    }

    /// Replace the maximum address accepted for a kind's ranges
    pub fn with_max_addr(mut self, kind: RegisterKind, max_addr: u16) -> Self {
        self.layout_mut(kind).max_addr = max_addr;
        self
    }

    /// Check bounds and ordering of every configured range and the scale of
    /// every field. Overlapping ranges are allowed.
    pub fn validate(&self) -> Result<()> {
        for kind in [RegisterKind::Input, RegisterKind::Holding] {
            let layout = self.layout(kind);
            for (idx, range) in layout.ranges.iter().enumerate() {
                if range.start > range.end {
                    return Err(FutSrvError::schema(format!(
                        "{} range {} has start > end ({} > {})",
                        kind, idx, range.start, range.end
                    )));
                }
                if range.end > layout.max_addr {
                    return Err(FutSrvError::schema(format!(
                        "{} range {} exceeds max address {} (end={})",
                        kind, idx, layout.max_addr, range.end
                    )));
                }
            }

            if let Some(spec) = layout
                .fields
                .iter()
                .find(|spec| spec.scale == 0.0 || !spec.scale.is_finite())
            {
                return Err(FutSrvError::schema(format!(
                    "{} field {} has invalid scale {}",
                    kind, spec.key, spec.scale
                )));
            }

            if let Some(spec) = layout.fields.iter().find(|spec| {
                u32::from(spec.address) + u32::from(spec.register_count()) - 1
                    > u32::from(ADDRESS_SPACE_MAX)
            }) {
                return Err(FutSrvError::schema(format!(
                    "{} field {} runs past the end of the address space",
                    kind, spec.key
                )));
            }
        }
        Ok(())
    }

    /// Parse configured `[start, end]` pairs
    pub fn parse_ranges(kind: RegisterKind, pairs: &[Vec<u16>]) -> Result<Vec<RegisterRange>> {
        pairs
            .iter()
            .enumerate()
            .map(|(idx, pair)| RegisterRange::from_bounds(kind, idx, pair))
            .collect()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_blocks_split_evenly_and_with_remainder() {
        let blocks: Vec<_> = RegisterRange::new(0, 249).blocks(125).collect();
        assert_eq!(
            blocks,
            vec![
                Block {
                    start: 0,
                    count: 125
                },
                Block {
                    start: 125,
                    count: 125
                },
            ]
        );

        let blocks: Vec<_> = RegisterRange::new(100, 154).blocks(20).collect();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[2], Block {
            start: 140,
            count: 15
        });
        assert_eq!(blocks[2].last(), 154);
    }

    #[test]
    fn test_block_count_matches_ceiling_division() {
        for (start, end) in [(0u16, 0u16), (0, 21), (30, 38), (100, 154), (0, 1023)] {
            let range = RegisterRange::new(start, end);
            for max in [1u16, 2, 7, 10, 125] {
                let blocks: Vec<_> = range.blocks(max).collect();
                let len = range.len();
                assert_eq!(blocks.len() as u32, len.div_ceil(u32::from(max)));
                assert!(blocks.iter().all(|b| b.count <= max && b.count > 0));
                let expected_last = if len % u32::from(max) == 0 {
                    u32::from(max)
                } else {
                    len % u32::from(max)
                };
                assert_eq!(u32::from(blocks.last().unwrap().count), expected_last);
                let covered: u32 = blocks.iter().map(|b| u32::from(b.count)).sum();
                assert_eq!(covered, len);
            }
        }
    }

    #[test]
    fn test_blocks_at_top_of_address_space() {
        let blocks: Vec<_> = RegisterRange::new(65530, 65535).blocks(4).collect();
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[1], Block {
            start: 65534,
            count: 2
        });
    }

    #[test]
    fn test_inverted_range_has_no_blocks() {
        let range = RegisterRange::new(10, 5);
        assert!(range.is_empty());
        assert_eq!(range.blocks(10).count(), 0);
    }

    #[test]
    fn test_from_bounds_requires_two_values() {
        assert_eq!(
            RegisterRange::from_bounds(RegisterKind::Input, 0, &[3, 9]).unwrap(),
            RegisterRange::new(3, 9)
        );
        let err = RegisterRange::from_bounds(RegisterKind::Holding, 4, &[1, 2, 3]).unwrap_err();
        assert!(matches!(err, FutSrvError::SchemaValidation(_)));
        assert!(err.to_string().contains("holding range 4"));
        assert!(RegisterRange::from_bounds(RegisterKind::Input, 0, &[7]).is_err());
    }

    #[test]
    fn test_external_names_are_one_based() {
        assert_eq!(FieldKey::instance("UITemp", 0).external_name(), "UITemp1");
        assert_eq!(FieldKey::instance("ExtSensCo2", 7).to_string(), "ExtSensCo28");
        assert_eq!(FieldKey::scalar("CfgTempSet").external_name(), "CfgTempSet");
    }

    #[test]
    fn test_dword_fields_are_not_writable() {
        let spec = FieldSpec::dword("FuncAwayBegin", 6);
        let err = WritableFieldSpec::try_from(&spec).unwrap_err();
        assert!(matches!(err, FutSrvError::UnknownOrNotWritable(_)));
        assert_eq!(spec.addresses().collect::<Vec<_>>(), vec![6, 7]);
    }

    #[test]
    fn test_validate_rejects_bad_ranges() {
        let map = AddressMap::futura().unwrap();
        assert!(map.validate().is_ok());

        let bad = map
            .clone()
            .with_ranges(RegisterKind::Input, vec![RegisterRange::new(20, 10)]);
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("start > end"));

        let bad = map.clone().with_max_addr(RegisterKind::Holding, 100);
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("exceeds max address 100"));
    }

    #[test]
    fn test_validate_allows_overlap() {
        let map = AddressMap::futura().unwrap().with_ranges(
            RegisterKind::Input,
            vec![RegisterRange::new(0, 20), RegisterRange::new(10, 30)],
        );
        assert!(map.validate().is_ok());
    }

    #[test]
    fn test_unknown_field_lookup() {
        let map = AddressMap::futura().unwrap();
        let err = map.field(RegisterKind::Input, "CfgTempSet").unwrap_err();
        assert!(matches!(err, FutSrvError::UnknownField(_)));
        assert_eq!(map.field(RegisterKind::Holding, "CfgTempSet").unwrap().address, 10);
    }
}
