//! Prometheus exposition for decoded device values
//!
//! Each gauge is bound to one decoded input field; instance gauges carry a
//! 1-based `idx` label. The registry is owned by [`DeviceMetrics`] rather
//! than the process-global default so tests can build independent copies.

use std::collections::HashMap;

use prometheus::{
    Encoder, Gauge, GaugeVec, IntCounter, IntGaugeVec, Opts, Registry, TextEncoder,
};
use tracing::trace;

use crate::address_map::RegisterKind;
use crate::codec::DecodedRecord;
use crate::error::Result;

/// (metric name, help, input field)
const FIELD_GAUGES: &[(&str, &str, &str)] = &[
    ("fut_temp_ambient_celsius", "Ambient temperature (°C)", "TempAmbient"),
    ("fut_temp_fresh_celsius", "Fresh air temperature (°C)", "TempFresh"),
    ("fut_temp_indoor_celsius", "Indoor temperature (°C)", "TempIndoor"),
    ("fut_temp_waste_celsius", "Waste air temperature (°C)", "TempWaste"),
    ("fut_humi_ambient_percent", "Ambient humidity (%)", "HumiAmbient"),
    ("fut_humi_fresh_percent", "Fresh air humidity (%)", "HumiFresh"),
    ("fut_humi_indoor_percent", "Indoor humidity (%)", "HumiIndoor"),
    ("fut_humi_waste_percent", "Waste air humidity (%)", "HumiWaste"),
    ("fut_filter_wear_percent", "Filter wear (%)", "FilterWear"),
    ("fut_power_consumption_watts", "Power consumption (W)", "PowerConsumption"),
    ("fut_heat_recovering_watts", "Heat recovering (W)", "HeatRecovering"),
    ("fut_heating_power_watts", "Heating power (W)", "HeatingPower"),
    ("fut_air_flow_m3h", "Air flow (m3/h)", "AirFlow"),
    ("fut_fan_pwm_supply_percent", "Supply fan PWM (%)", "FanPWMSupply"),
    ("fut_fan_pwm_exhaust_percent", "Exhaust fan PWM (%)", "FanPWMExhaust"),
    ("fut_fan_rpm_supply", "Supply fan RPM", "FanRPMSupply"),
    ("fut_fan_rpm_exhaust", "Exhaust fan RPM", "FanRPMExhaust"),
    ("fut_uint1_voltage_mv", "UIN1 voltage (mV)", "Uin1Voltage"),
    ("fut_uint2_voltage_mv", "UIN2 voltage (mV)", "Uin2Voltage"),
];

/// (metric name, help, instance field base)
const INSTANCE_GAUGES: &[(&str, &str, &str)] = &[
    ("ui_temp_celsius", "Wall controller temperature (°C)", "UITemp"),
    ("ui_humi_percent", "Wall controller humidity (%)", "UIHumi"),
    ("sens_temp_celsius", "Wall sensor temperature (°C)", "SensTemp"),
    ("sens_humi_percent", "Wall sensor humidity (%)", "SensHumi"),
    ("alfa_temp_celsius", "ALFA temperature (°C)", "AlfaTemp"),
    ("alfa_humi_percent", "ALFA humidity (%)", "AlfaHumi"),
    ("alfa_ntc_temp_celsius", "ALFA NTC temperature (°C)", "AlfaNTCTemp"),
    ("ext_sens_temp_celsius", "External sensor temperature (°C)", "ExtSensTemp"),
    ("ext_sens_rh_percent", "External sensor relative humidity (%)", "ExtSensRH"),
    ("ext_sens_co2_ppm", "External sensor CO2 (ppm)", "ExtSensCo2"),
    ("ext_sens_t_floor_celsius", "External sensor floor temperature (°C)", "ExtSensTFloor"),
];

/// Device gauges plus service counters
#[derive(Clone)]
pub struct DeviceMetrics {
    registry: Registry,
    fields: Vec<(&'static str, Gauge)>,
    instances: HashMap<&'static str, GaugeVec>,
    poll_cycles: IntCounter,
    registers_read: IntGaugeVec,
}

impl std::fmt::Debug for DeviceMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceMetrics")
            .field("fields", &self.fields.len())
            .field("instances", &self.instances.len())
            .finish()
    }
}

impl DeviceMetrics {
    pub fn new() -> Result<Self> {
        let registry = Registry::new();

        let mut fields = Vec::with_capacity(FIELD_GAUGES.len());
        for (name, help, field) in FIELD_GAUGES {
            let gauge = Gauge::new(*name, *help)?;
            registry.register(Box::new(gauge.clone()))?;
            fields.push((*field, gauge));
        }

        let mut instances = HashMap::with_capacity(INSTANCE_GAUGES.len());
        for (name, help, base) in INSTANCE_GAUGES {
            let vec = GaugeVec::new(Opts::new(*name, *help), &["idx"])?;
            registry.register(Box::new(vec.clone()))?;
            instances.insert(*base, vec);
        }

        let poll_cycles = IntCounter::new("futsrv_poll_cycles_total", "Completed poll cycles")?;
        registry.register(Box::new(poll_cycles.clone()))?;

        let registers_read = IntGaugeVec::new(
            Opts::new(
                "futsrv_registers_read",
                "Registers read in the last poll cycle",
            ),
            &["kind"],
        )?;
        registry.register(Box::new(registers_read.clone()))?;

        Ok(Self {
            registry,
            fields,
            instances,
            poll_cycles,
            registers_read,
        })
    }

    /// Set gauges from a merged input record
    pub fn update(&self, record: &DecodedRecord) {
        for (field, gauge) in &self.fields {
            if let Some(value) = record.get(field) {
                gauge.set(value.as_f64());
            }
        }

        for (key, value) in record.iter() {
            let (Some(index), Some(vec)) = (key.index, self.instances.get(key.base)) else {
                continue;
            };
            let idx = (u16::from(index) + 1).to_string();
            vec.with_label_values(&[idx.as_str()]).set(value.as_f64());
        }
        trace!("Metrics updated from {} fields", record.len());
    }

    /// Count one finished poll cycle
    pub fn record_poll(&self, input_registers: usize, holding_registers: usize) {
        self.poll_cycles.inc();
        self.registers_read
            .with_label_values(&[RegisterKind::Input.as_str()])
            .set(input_registers as i64);
        self.registers_read
            .with_label_values(&[RegisterKind::Holding.as_str()])
            .set(holding_registers as i64);
    }

    /// Text exposition format
    pub fn render(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer)
            .map_err(|e| crate::error::FutSrvError::Io(format!("metrics not UTF-8: {}", e)))
    }
}
