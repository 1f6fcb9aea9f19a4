//! Service Bootstrap and Initialization
//!
//! Command-line arguments, logging setup and configuration loading for the
//! `futsrv` binary.

use std::path::PathBuf;

use clap::Parser;
use common::service_bootstrap::{self, ServiceInfo};
use tracing::info;

use crate::address_map::RegisterKind;
use crate::config::{AppConfig, CliOverrides, DEFAULT_HTTP_PORT};
use crate::error::{FutSrvError, Result};

/// Command-line arguments for futsrv
#[derive(Parser, Debug, Clone)]
#[command(
    name = "futsrv",
    version = env!("CARGO_PKG_VERSION"),
    about = "Futura ventilation unit bridge: Modbus TCP polling, metrics and write API",
    long_about = None
)]
pub struct Args {
    /// Config file (yaml, yml, toml or json)
    #[arg(short, long, value_name = "FILE", env = "FUTSRV_CONFIG")]
    pub config: Option<PathBuf>,

    /// Device IP address or hostname
    #[arg(long)]
    pub host: Option<String>,

    /// Device Modbus TCP port
    #[arg(long)]
    pub port: Option<u16>,

    /// Modbus unit id
    #[arg(long)]
    pub slave_id: Option<u8>,

    /// Registers per read request (1..=125)
    #[arg(long)]
    pub max_block_size: Option<u16>,

    /// Highest input register address the poll ranges may reach
    #[arg(long)]
    pub input_max_addr: Option<u16>,

    /// Highest holding register address the poll ranges may reach
    #[arg(long)]
    pub holding_max_addr: Option<u16>,

    /// HTTP port for metrics, editor and API
    #[arg(long)]
    pub http_port: Option<u16>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long)]
    pub log_level: Option<String>,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,

    /// Validation mode - only validate configuration and register map, then exit
    #[arg(long)]
    pub validate: bool,
}

impl Args {
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            host: self.host.clone(),
            port: self.port,
            slave_id: self.slave_id,
            max_block_size: self.max_block_size,
            input_max_addr: self.input_max_addr,
            holding_max_addr: self.holding_max_addr,
            http_port: self.http_port,
        }
    }
}

pub fn create_service_info() -> ServiceInfo {
    ServiceInfo::new(
        "futsrv",
        "Futura Bridge - Modbus TCP polling, metrics and register editor",
        DEFAULT_HTTP_PORT,
    )
    .with_version(env!("CARGO_PKG_VERSION"))
}

/// Load the configuration and apply command-line overrides
pub fn load_configuration(args: &Args) -> Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    config.apply_overrides(&args.overrides());
    Ok(config)
}

/// Initialize logging with command-line arguments
///
/// Log root directory priority:
/// 1. FUTSRV_LOG_DIR environment variable
/// 2. logging.dir from the config file
/// 3. Default "logs"
pub fn initialize_logging(
    args: &Args,
    service_info: &ServiceInfo,
    config: &AppConfig,
) -> Result<()> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(config.logging.level.as_str());

    service_bootstrap::init_logging(
        service_info,
        config.logging.dir.as_deref(),
        service_bootstrap::parse_log_level(level),
        config.logging.json,
        !args.no_color,
    )
    .map_err(|e| FutSrvError::config(format!("Failed to init logging: {}", e)))
}

/// Validate configuration and register map, print the effective settings
pub fn validate_configuration(config: &AppConfig) -> Result<()> {
    config.validate()?;
    let map = config.address_map()?;

    for kind in [RegisterKind::Input, RegisterKind::Holding] {
        info!(
            "{} map: {} fields, {} ranges, max address {}",
            kind,
            map.fields(kind).len(),
            map.ranges(kind).len(),
            map.max_addr(kind)
        );
    }
    info!(
        "{} writable fields, {} aliased fields",
        map.writable_fields().len(),
        map.aliases().len()
    );

    let effective = serde_yaml::to_string(config)
        .map_err(|e| FutSrvError::config(format!("Failed to render config: {}", e)))?;
    println!("{}", effective);
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_command_line() {
        let args = Args::try_parse_from([
            "futsrv",
            "--host",
            "10.0.0.7",
            "--port",
            "1502",
            "--slave-id",
            "3",
            "--max-block-size",
            "60",
            "--http-port",
            "8088",
            "-l",
            "debug",
            "--no-color",
            "--validate",
        ])
        .unwrap();

        assert_eq!(args.host.as_deref(), Some("10.0.0.7"));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
        assert!(args.no_color && args.validate);

        let overrides = args.overrides();
        assert_eq!(overrides.port, Some(1502));
        assert_eq!(overrides.slave_id, Some(3));
        assert_eq!(overrides.max_block_size, Some(60));
        assert_eq!(overrides.http_port, Some(8088));
        assert_eq!(overrides.input_max_addr, None);
    }

    #[test]
    fn test_slave_id_must_fit_u8() {
        assert!(Args::try_parse_from(["futsrv", "--slave-id", "300"]).is_err());
    }
}
