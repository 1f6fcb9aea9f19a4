//! Register tables of the Futura ventilation unit (CS40 register map)

use super::{AddressMap, FieldSpec, RegisterKind, RegisterRange};
use crate::error::Result;

const TEMP_SCALE: f64 = 0.1;

/// Default maximum input address accepted in poll ranges
pub const DEFAULT_INPUT_MAX_ADDR: u16 = 255;
/// Default maximum holding address accepted in poll ranges
pub const DEFAULT_HOLDING_MAX_ADDR: u16 = 1024;

// Repeated blocks: (base address, stride, instances)
const UI: (u16, u16, u8) = (100, 5, 3);
const SENS: (u16, u16, u8) = (115, 5, 8);
const ALFA: (u16, u16, u8) = (160, 10, 8);
const EXT_SENS: (u16, u16, u8) = (300, 10, 8);
const EXT_BTN: (u16, u16, u8) = (400, 10, 8);

// Holding-only correction blocks
const UI_TEMP_CORR: (u16, u16, u8) = (100, 5, 3);
const EXT_SENS_TEMP_CORR: (u16, u16, u8) = (115, 5, 8);
const ALFA_TEMP_CORR: (u16, u16, u8) = (160, 5, 8);
const ALFA_NTC_TEMP_CORR: (u16, u16, u8) = (162, 5, 8);

/// Input fields mirrored from the holding kind
pub const ALIASED_BASES: [&str; 10] = [
    "ExtSensPresent",
    "ExtSensInvalidate",
    "ExtSensTemp",
    "ExtSensRH",
    "ExtSensCo2",
    "ExtSensTFloor",
    "ExtBtnPresent",
    "ExtBtnMode",
    "ExtBtnTm",
    "ExtBtnActive",
];

/// Single-register holding fields accepted by the write path
const WRITABLE_SCALARS: [&str; 18] = [
    "FuncVentilation",
    "FuncBoostTm",
    "FuncCirculationTm",
    "FuncOverpressureTm",
    "FuncNightTm",
    "FuncPartyTm",
    "CfgTempSet",
    "CfgHumiSet",
    "FuncTimeProg",
    "FuncAntiradon",
    "CfgBypassEnable",
    "CfgHeatingEnable",
    "CfgCoolingEnable",
    "CfgComfortEnable",
    "VzvCBPriorityControl",
    "VzvKitchenhoodNormallyOpen",
    "VzvBoostVolumePerRun",
    "VzvKitchenhoodNormallyOpenVolume",
];

/// Instance fields accepted by the write path, for every instance
const WRITABLE_INSTANCES: [(&str, u8); 7] = [
    ("ExtSensTempCorr", EXT_SENS_TEMP_CORR.2),
    ("ExtSensPresent", EXT_SENS.2),
    ("ExtSensInvalidate", EXT_SENS.2),
    ("ExtSensTemp", EXT_SENS.2),
    ("ExtSensRH", EXT_SENS.2),
    ("ExtSensCo2", EXT_SENS.2),
    ("ExtSensTFloor", EXT_SENS.2),
];

/// Expand a repeated block: `layout` gives each member relative to the
/// instance base address.
fn repeated(
    (base, stride, instances): (u16, u16, u8),
    layout: &[fn(u16) -> FieldSpec],
) -> Vec<FieldSpec> {
    let mut fields = Vec::with_capacity(usize::from(instances) * layout.len());
    for idx in 0..instances {
        let instance_base = base + u16::from(idx) * stride;
        fields.extend(layout.iter().map(|make| make(instance_base).at_instance(idx)));
    }
    fields
}

fn input_fields() -> Vec<FieldSpec> {
    let mut fields = vec![
        FieldSpec::word("FactDeviceID", 0),
        FieldSpec::dword("FactSerialNum", 1),
    ];
    fields.extend((0..3u8).map(|i| FieldSpec::word("FactEthernetMAC", 3 + u16::from(i)).at_instance(i)));
    fields.extend([
        FieldSpec::dword("FactHWRevision", 6),
        FieldSpec::dword("FirmRevision", 8),
        FieldSpec::dword("SysBuildNumber", 10),
        FieldSpec::dword("SysRegmapVersion", 12),
        FieldSpec::word("SysOptions", 14),
        FieldSpec::word("FutConfig", 15),
        FieldSpec::dword("FutMode", 16),
        FieldSpec::dword("FutError", 18),
        FieldSpec::dword("FutWarning", 20),
        // temperatures and humidities
        FieldSpec::signed("TempAmbient", 30, TEMP_SCALE),
        FieldSpec::signed("TempFresh", 31, TEMP_SCALE),
        FieldSpec::signed("TempIndoor", 32, TEMP_SCALE),
        FieldSpec::signed("TempWaste", 33, TEMP_SCALE),
        FieldSpec::signed("HumiAmbient", 34, TEMP_SCALE),
        FieldSpec::signed("HumiFresh", 35, TEMP_SCALE),
        FieldSpec::signed("HumiIndoor", 36, TEMP_SCALE),
        FieldSpec::signed("HumiWaste", 37, TEMP_SCALE),
        FieldSpec::signed("TOut", 38, TEMP_SCALE),
        FieldSpec::word("FilterWear", 40),
        FieldSpec::word("PowerConsumption", 41),
        FieldSpec::word("HeatRecovering", 42),
        FieldSpec::word("HeatingPower", 43),
        FieldSpec::word("AirFlow", 44),
        FieldSpec::word("FanPWMSupply", 45),
        FieldSpec::word("FanPWMExhaust", 46),
        FieldSpec::word("FanRPMSupply", 47),
        FieldSpec::word("FanRPMExhaust", 48),
        FieldSpec::word("Uin1Voltage", 49),
        FieldSpec::word("Uin2Voltage", 50),
        FieldSpec::word("DigInputs", 51),
        FieldSpec::word("SysBatteryVoltage", 52),
        // bus statistics
        FieldSpec::dword("MBDevStatReads", 60),
        FieldSpec::dword("MBDevStatWrites", 62),
        FieldSpec::dword("MBDevStatFails", 64),
        FieldSpec::word("MBDevConnectedMkUI", 66),
        FieldSpec::dword("MBDevConnectedMkSens", 67),
        FieldSpec::word("MBDevConnectedCoolBreeze", 69),
        FieldSpec::dword("MBDevConnectedValveSupply", 70),
        FieldSpec::dword("MBDevConnectedValveExhaust", 72),
        FieldSpec::word("MBDevConnectedButton", 74),
        FieldSpec::word("MBDevConnectedAlfa", 75),
        FieldSpec::word("VzvIdentify", 80),
    ]);

    fields.extend(repeated(UI, &[
        |b| FieldSpec::word("UIAddress", b),
        |b| FieldSpec::word("UIOptions", b + 1),
        |b| FieldSpec::word("UICo2", b + 2),
        |b| FieldSpec::signed("UITemp", b + 3, TEMP_SCALE),
        |b| FieldSpec::unsigned("UIHumi", b + 4, TEMP_SCALE),
    ]));
    fields.extend(repeated(SENS, &[
        |b| FieldSpec::word("SensMBAddress", b),
        |b| FieldSpec::word("SensOptions", b + 1),
        |b| FieldSpec::word("SensCo2", b + 2),
        |b| FieldSpec::signed("SensTemp", b + 3, TEMP_SCALE),
        |b| FieldSpec::unsigned("SensHumi", b + 4, TEMP_SCALE),
    ]));
    fields.extend(repeated(ALFA, &[
        |b| FieldSpec::word("AlfaMBAddress", b),
        |b| FieldSpec::word("AlfaOptions", b + 1),
        |b| FieldSpec::word("AlfaCo2", b + 2),
        |b| FieldSpec::signed("AlfaTemp", b + 3, TEMP_SCALE),
        |b| FieldSpec::unsigned("AlfaHumi", b + 4, TEMP_SCALE),
        |b| FieldSpec::unsigned("AlfaNTCTemp", b + 5, TEMP_SCALE),
    ]));
    fields.extend(external_sensors());
    fields.extend(external_buttons());
    fields
}

fn holding_fields() -> Vec<FieldSpec> {
    let mut fields = vec![
        FieldSpec::word("FuncVentilation", 0),
        FieldSpec::word("FuncBoostTm", 1),
        FieldSpec::word("FuncCirculationTm", 2),
        FieldSpec::word("FuncOverpressureTm", 3),
        FieldSpec::word("FuncNightTm", 4),
        FieldSpec::word("FuncPartyTm", 5),
        FieldSpec::dword("FuncAwayBegin", 6),
        FieldSpec::dword("FuncAwayEnd", 8),
        FieldSpec::signed("CfgTempSet", 10, TEMP_SCALE),
        FieldSpec::unsigned("CfgHumiSet", 11, TEMP_SCALE),
        FieldSpec::word("FuncTimeProg", 12),
        FieldSpec::word("FuncAntiradon", 13),
        FieldSpec::word("CfgBypassEnable", 14),
        FieldSpec::word("CfgHeatingEnable", 15),
        FieldSpec::word("CfgCoolingEnable", 16),
        FieldSpec::word("CfgComfortEnable", 17),
        FieldSpec::word("VzvCBPriorityControl", 20),
        FieldSpec::word("VzvKitchenhoodNormallyOpen", 21),
        FieldSpec::word("VzvBoostVolumePerRun", 22),
        FieldSpec::word("VzvKitchenhoodNormallyOpenVolume", 23),
    ];

    fields.extend(repeated(UI_TEMP_CORR, &[|b| {
        FieldSpec::signed("UITempCorr", b, TEMP_SCALE)
    }]));
    fields.extend(repeated(EXT_SENS_TEMP_CORR, &[|b| {
        FieldSpec::signed("ExtSensTempCorr", b, TEMP_SCALE)
    }]));
    fields.extend(repeated(ALFA_TEMP_CORR, &[|b| {
        FieldSpec::signed("AlfaTempCorr", b, TEMP_SCALE)
    }]));
    fields.extend(repeated(ALFA_NTC_TEMP_CORR, &[|b| {
        FieldSpec::signed("AlfaNTCTempCorr", b, TEMP_SCALE)
    }]));
    fields.extend(external_sensors());
    fields.extend(external_buttons());
    fields.extend([
        FieldSpec::word("AccessCode", 900),
        FieldSpec::word("UserPassword", 920),
        FieldSpec::word("PasswordTimeout", 922),
    ]);
    fields
}

// Same layout in both kinds; the holding copy is authoritative
fn external_sensors() -> Vec<FieldSpec> {
    repeated(EXT_SENS, &[
        |b| FieldSpec::word("ExtSensPresent", b),
        |b| FieldSpec::word("ExtSensInvalidate", b + 1),
        |b| FieldSpec::signed("ExtSensTemp", b + 2, TEMP_SCALE),
        |b| FieldSpec::unsigned("ExtSensRH", b + 3, 1.0),
        |b| FieldSpec::word("ExtSensCo2", b + 4),
        |b| FieldSpec::signed("ExtSensTFloor", b + 5, TEMP_SCALE),
    ])
}

fn external_buttons() -> Vec<FieldSpec> {
    repeated(EXT_BTN, &[
        |b| FieldSpec::word("ExtBtnPresent", b),
        |b| FieldSpec::word("ExtBtnMode", b + 1),
        |b| FieldSpec::word("ExtBtnTm", b + 2),
        |b| FieldSpec::word("ExtBtnActive", b + 3),
    ])
}

/// Input ranges read on a full poll
pub fn default_input_ranges() -> Vec<RegisterRange> {
    let mut ranges = vec![
        RegisterRange::new(0, 21),
        RegisterRange::new(30, 38),
        RegisterRange::new(40, 52),
        RegisterRange::new(60, 75),
        RegisterRange::new(100, 154),
    ];
    // ALFA panels, six registers each
    ranges.extend((0..ALFA.2).map(|i| {
        let base = ALFA.0 + u16::from(i) * ALFA.1;
        RegisterRange::new(base, base + 5)
    }));
    ranges
}

/// Holding ranges read on a full poll
pub fn default_holding_ranges() -> Vec<RegisterRange> {
    let mut ranges = vec![RegisterRange::new(0, 17), RegisterRange::new(20, 23)];
    ranges.extend((0..EXT_SENS.2).map(|i| {
        let base = EXT_SENS.0 + u16::from(i) * EXT_SENS.1;
        RegisterRange::new(base, base + 5)
    }));
    ranges.extend((0..EXT_BTN.2).map(|i| {
        let base = EXT_BTN.0 + u16::from(i) * EXT_BTN.1;
        RegisterRange::new(base, base + 3)
    }));
    ranges
}

fn writable_names() -> Vec<String> {
    let mut names: Vec<String> = WRITABLE_SCALARS.iter().map(|s| s.to_string()).collect();
    for (base, instances) in WRITABLE_INSTANCES {
        names.extend((1..=instances).map(|n| format!("{}{}", base, n)));
    }
    names
}

impl AddressMap {
    /// Layout of the Futura unit with its default poll ranges and limits
    pub fn futura() -> Result<Self> {
        AddressMap::new(
            (input_fields(), default_input_ranges(), DEFAULT_INPUT_MAX_ADDR),
            (holding_fields(), default_holding_ranges(), DEFAULT_HOLDING_MAX_ADDR),
            &writable_names(),
            &ALIASED_BASES,
        )
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::address_map::{RegisterSpan, Signedness};
    use std::collections::HashSet;

    #[test]
    fn test_default_ranges_match_device_layout() {
        let inputs = default_input_ranges();
        assert_eq!(inputs.len(), 13);
        assert_eq!(inputs[5], RegisterRange::new(160, 165));
        assert_eq!(inputs[12], RegisterRange::new(230, 235));

        let holdings = default_holding_ranges();
        assert_eq!(holdings.len(), 18);
        assert_eq!(holdings[2], RegisterRange::new(300, 305));
        assert_eq!(holdings[17], RegisterRange::new(470, 473));
    }

    #[test]
    fn test_field_addresses_are_unique_per_kind() {
        let map = AddressMap::futura().unwrap();
        for kind in [RegisterKind::Input, RegisterKind::Holding] {
            let mut seen = HashSet::new();
            for spec in map.fields(kind) {
                for addr in spec.addresses() {
                    assert!(seen.insert(addr), "{} address {} used twice", kind, addr);
                }
            }
        }
    }

    #[test]
    fn test_instance_layout() {
        let map = AddressMap::futura().unwrap();
        let ui3 = map.field(RegisterKind::Input, "UITemp3").unwrap();
        assert_eq!(ui3.address, 113);
        assert_eq!(ui3.signedness, Signedness::Signed);

        let alfa8 = map.field(RegisterKind::Input, "AlfaNTCTemp8").unwrap();
        assert_eq!(alfa8.address, 235);
        assert_eq!(alfa8.signedness, Signedness::Unsigned);

        let corr = map.field(RegisterKind::Holding, "AlfaNTCTempCorr2").unwrap();
        assert_eq!(corr.address, 167);

        let serial = map.field(RegisterKind::Input, "FactSerialNum").unwrap();
        assert_eq!(serial.span, RegisterSpan::Double);
    }

    #[test]
    fn test_writable_set() {
        let map = AddressMap::futura().unwrap();
        assert_eq!(map.writable_fields().len(), 18 + 7 * 8);

        let temp = map.writable("CfgTempSet").unwrap();
        assert_eq!(temp.address, 10);
        assert_eq!(temp.scale, 0.1);

        assert_eq!(map.writable("ExtSensTempCorr8").unwrap().address, 150);
        assert_eq!(map.writable("ExtSensCo23").unwrap().address, 324);
        assert!(map.writable("FuncAwayBegin").is_none());
        assert!(map.writable("AccessCode").is_none());
        assert!(map.writable("UITempCorr1").is_none());
    }

    #[test]
    fn test_aliases_cover_external_sensors_and_buttons() {
        let map = AddressMap::futura().unwrap();
        assert_eq!(map.aliases().len(), 6 * 8 + 4 * 8);
        let temp1 = map
            .aliases()
            .iter()
            .find(|a| a.input.to_string() == "ExtSensTemp1")
            .unwrap();
        assert_eq!(temp1.holding.address, 302);
    }
}
