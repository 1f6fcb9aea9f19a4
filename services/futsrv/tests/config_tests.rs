//! Layered configuration loading from files and the environment

#![allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable

use std::io::Write;
use std::time::Duration;

use futsrv::address_map::{RegisterKind, RegisterRange};
use futsrv::config::{AppConfig, CliOverrides};
use futsrv::error::FutSrvError;
use tempfile::Builder;

fn config_file(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_yaml() {
    let file = config_file(
        ".yaml",
        r#"
device:
  host: 10.0.0.7
  slave_id: 3
polling:
  interval_secs: 10
  max_block_size: 60
registers:
  holding_ranges:
    - [0, 17]
api:
  port: 9191
logging:
  level: debug
"#,
    );

    let config = AppConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.device.host, "10.0.0.7");
    assert_eq!(config.device.slave_id, 3);
    // Unset keys keep their defaults
    assert_eq!(config.device.port, 502);
    assert_eq!(config.polling.interval(), Duration::from_secs(10));
    assert_eq!(config.polling.max_block_size, 60);
    assert_eq!(config.api.port, 9191);
    assert_eq!(config.logging.level, "debug");
    config.validate().unwrap();

    let map = config.address_map().unwrap();
    assert_eq!(map.ranges(RegisterKind::Holding), &[RegisterRange::new(0, 17)]);
    assert!(map.ranges(RegisterKind::Input).len() > 1);
}

#[test]
fn test_load_toml() {
    let file = config_file(
        ".toml",
        r#"
[device]
host = "fut.local"
port = 1502

[polling]
max_block_size = 125
"#,
    );

    let config = AppConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.device.host, "fut.local");
    assert_eq!(config.device.port, 1502);
    assert_eq!(config.polling.max_block_size, 125);
}

#[test]
fn test_load_json() {
    let file = config_file(
        ".json",
        r#"{"device": {"host": "192.168.5.5", "timeout_ms": 2500}, "logging": {"json": true}}"#,
    );

    let config = AppConfig::load(Some(file.path())).unwrap();

    assert_eq!(config.device.host, "192.168.5.5");
    assert_eq!(config.device.timeout(), Duration::from_millis(2500));
    assert!(config.logging.json);
}

#[test]
fn test_unsupported_extension() {
    let file = config_file(".ini", "host=1.2.3.4");

    let err = AppConfig::load(Some(file.path())).unwrap_err();

    assert!(matches!(err, FutSrvError::Config(ref msg) if msg.contains("ini")));
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.yaml");

    let err = AppConfig::load(Some(&path)).unwrap_err();

    assert!(matches!(err, FutSrvError::Config(_)));
}

#[test]
fn test_malformed_file_is_config_error() {
    let file = config_file(".yaml", "device: [unterminated");

    assert!(AppConfig::load(Some(file.path())).is_err());
}

#[test]
fn test_environment_overrides_file() {
    let file = config_file(
        ".yaml",
        "device:\n  host: 10.0.0.1\npolling:\n  reconnect_backoff_ms: 100\n",
    );
    std::env::set_var("FUTSRV_POLLING__RECONNECT_BACKOFF_MS", "750");

    let config = AppConfig::load(Some(file.path())).unwrap();
    std::env::remove_var("FUTSRV_POLLING__RECONNECT_BACKOFF_MS");

    assert_eq!(config.polling.reconnect_backoff(), Duration::from_millis(750));
    assert_eq!(config.device.host, "10.0.0.1");
}

#[test]
fn test_cli_overrides_win() {
    let file = config_file(".yaml", "device:\n  host: 10.0.0.1\n  port: 502\n");
    let mut config = AppConfig::load(Some(file.path())).unwrap();

    config.apply_overrides(&CliOverrides {
        host: Some("10.0.0.2".into()),
        max_block_size: Some(32),
        http_port: Some(8088),
        ..Default::default()
    });

    assert_eq!(config.device.host, "10.0.0.2");
    assert_eq!(config.device.port, 502);
    assert_eq!(config.polling.max_block_size, 32);
    assert_eq!(config.api.port, 8088);
}

#[test]
fn test_invalid_ranges_rejected_when_building_map() {
    let file = config_file(
        ".yaml",
        "device:\n  host: h\nregisters:\n  input_max_addr: 100\n  input_ranges:\n    - [90, 120]\n",
    );
    let config = AppConfig::load(Some(file.path())).unwrap();

    assert!(config.address_map().is_err());
}
