//! Service configuration
//!
//! Priority (highest to lowest):
//! 1. Command-line overrides
//! 2. Environment variables (`FUTSRV_` prefix, `__` separates sections,
//!    e.g. `FUTSRV_DEVICE__HOST`)
//! 3. Config file (yaml, yml, toml or json)
//! 4. Built-in defaults

use std::path::Path;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::address_map::futura::{DEFAULT_HOLDING_MAX_ADDR, DEFAULT_INPUT_MAX_ADDR};
use crate::address_map::{AddressMap, RegisterKind};
use crate::error::{FutSrvError, Result};
use crate::reader::validate_block_size;

/// Environment variable prefix
pub const ENV_PREFIX: &str = "FUTSRV_";
/// Default HTTP port
pub const DEFAULT_HTTP_PORT: u16 = 9090;
/// Default Modbus TCP port
pub const DEFAULT_MODBUS_PORT: u16 = 502;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub device: DeviceConfig,
    pub polling: PollingConfig,
    pub registers: RegistersConfig,
    pub api: ApiConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DeviceConfig {
    pub host: String,
    pub port: u16,
    pub slave_id: u8,
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_MODBUS_PORT,
            slave_id: 1,
            timeout_ms: 5000,
        }
    }
}

impl DeviceConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_secs: u64,
    pub max_block_size: u16,
    pub reconnect_backoff_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_secs: 5,
            max_block_size: 125,
            reconnect_backoff_ms: 500,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RegistersConfig {
    pub input_max_addr: u16,
    pub holding_max_addr: u16,
    /// `[start, end]` pairs replacing the built-in input ranges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_ranges: Option<Vec<Vec<u16>>>,
    /// `[start, end]` pairs replacing the built-in holding ranges
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holding_ranges: Option<Vec<Vec<u16>>>,
}

impl Default for RegistersConfig {
    fn default() -> Self {
        Self {
            input_max_addr: DEFAULT_INPUT_MAX_ADDR,
            holding_max_addr: DEFAULT_HOLDING_MAX_ADDR,
            input_ranges: None,
            holding_ranges: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_HTTP_PORT,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: None,
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Values given on the command line; `None` keeps the loaded value
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub slave_id: Option<u8>,
    pub max_block_size: Option<u16>,
    pub input_max_addr: Option<u16>,
    pub holding_max_addr: Option<u16>,
    pub http_port: Option<u16>,
}

impl AppConfig {
    /// Merge defaults, the optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

        if let Some(path) = path {
            if !path.exists() {
                return Err(FutSrvError::config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            let extension = path
                .extension()
                .and_then(|s| s.to_str())
                .ok_or_else(|| FutSrvError::config("Config file must have an extension"))?;

            figment = match extension {
                "yaml" | "yml" => figment.merge(Yaml::file(path)),
                "toml" => figment.merge(Toml::file(path)),
                "json" => figment.merge(Json::file(path)),
                _ => {
                    return Err(FutSrvError::config(format!(
                        "Unsupported config format: {}",
                        extension
                    )))
                },
            };
            debug!("Config file: {}", path.display());
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        figment
            .extract()
            .map_err(|e| FutSrvError::config(format!("Failed to parse config: {}", e)))
    }

    pub fn apply_overrides(&mut self, overrides: &CliOverrides) {
        if let Some(host) = &overrides.host {
            self.device.host = host.clone();
        }
        if let Some(port) = overrides.port {
            self.device.port = port;
        }
        if let Some(slave_id) = overrides.slave_id {
            self.device.slave_id = slave_id;
        }
        if let Some(size) = overrides.max_block_size {
            self.polling.max_block_size = size;
        }
        if let Some(addr) = overrides.input_max_addr {
            self.registers.input_max_addr = addr;
        }
        if let Some(addr) = overrides.holding_max_addr {
            self.registers.holding_max_addr = addr;
        }
        if let Some(port) = overrides.http_port {
            self.api.port = port;
        }
    }

    /// Reject settings the service cannot start with
    pub fn validate(&self) -> Result<()> {
        if self.device.host.trim().is_empty() {
            return Err(FutSrvError::config(
                "device.host is required (set it in the config file, FUTSRV_DEVICE__HOST or --host)",
            ));
        }
        if self.device.port == 0 {
            return Err(FutSrvError::config("device.port must not be 0"));
        }
        if self.device.timeout_ms == 0 {
            return Err(FutSrvError::config("device.timeout_ms must be greater than 0"));
        }
        if self.polling.interval_secs == 0 {
            return Err(FutSrvError::config("polling.interval_secs must be greater than 0"));
        }
        validate_block_size(self.polling.max_block_size)?;
        Ok(())
    }

    /// Device layout with the configured limits and ranges, validated
    pub fn address_map(&self) -> Result<AddressMap> {
        let mut map = AddressMap::futura()?
            .with_max_addr(RegisterKind::Input, self.registers.input_max_addr)
            .with_max_addr(RegisterKind::Holding, self.registers.holding_max_addr);

        if let Some(pairs) = &self.registers.input_ranges {
            let ranges = AddressMap::parse_ranges(RegisterKind::Input, pairs)?;
            map = map.with_ranges(RegisterKind::Input, ranges);
        }
        if let Some(pairs) = &self.registers.holding_ranges {
            let ranges = AddressMap::parse_ranges(RegisterKind::Holding, pairs)?;
            map = map.with_ranges(RegisterKind::Holding, ranges);
        }

        map.validate()?;
        Ok(map)
    }
}
