//! Unified service bootstrap utilities
//!
//! Startup banner, logging initialization and port resolution shared by the
//! bridge services.

use crate::logging::{self, LogConfig};
use tracing::{info, Level};

/// Service metadata for startup
#[derive(Debug, Clone)]
pub struct ServiceInfo {
    /// Service name (e.g., "futsrv")
    pub name: String,
    /// Service version, normally the binary's `CARGO_PKG_VERSION`
    pub version: String,
    /// Service description
    pub description: String,
    /// Default HTTP port
    pub default_port: u16,
}

impl ServiceInfo {
    /// Create new service info
    pub fn new(name: impl Into<String>, description: impl Into<String>, default_port: u16) -> Self {
        Self {
            name: name.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            description: description.into(),
            default_port,
        }
    }

    /// Override the reported version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }
}

/// Print unified startup banner for any service
pub fn print_startup_banner(service: &ServiceInfo) {
    let banner = r#"
 ███████╗██╗   ██╗████████╗███████╗██████╗ ██╗   ██╗
 ██╔════╝██║   ██║╚══██╔══╝██╔════╝██╔══██╗██║   ██║
 █████╗  ██║   ██║   ██║   ███████╗██████╔╝██║   ██║
 ██╔══╝  ██║   ██║   ██║   ╚════██║██╔══██╗╚██╗ ██╔╝
 ██║     ╚██████╔╝   ██║   ███████║██║  ██║ ╚████╔╝
 ╚═╝      ╚═════╝    ╚═╝   ╚══════╝╚═╝  ╚═╝  ╚═══╝
    "#;

    info!("{}", banner);
    info!("");
    info!(" {} v{}", service.name.to_uppercase(), service.version);
    info!(" {}", service.description);
    info!(" Default Port: {}", service.default_port);
    info!("");
}

/// Initialize logging for a service with standard configuration
///
/// Log root directory priority:
/// 1. FUTSRV_LOG_DIR environment variable
/// 2. `log_dir` argument (from the config file)
/// 3. Default "logs"
pub fn init_logging(
    service: &ServiceInfo,
    log_dir: Option<&str>,
    console_level: Level,
    enable_json: bool,
    ansi: bool,
) -> anyhow::Result<()> {
    logging::init_log_root(log_dir);

    let log_config = LogConfig {
        service_name: service.name.clone(),
        log_dir: logging::get_log_root().join(&service.name),
        console_level,
        enable_json,
        ansi,
    };

    logging::init_with_config(log_config).map_err(|e| anyhow::anyhow!("{}", e))?;

    Ok(())
}

/// Parse a log level string, falling back to INFO
pub fn parse_log_level(level: &str) -> Level {
    level.parse::<Level>().unwrap_or(Level::INFO)
}

/// Resolve the HTTP port: an explicit non-default config value wins, then
/// `{SERVICE}_PORT` from the environment, then the service default.
pub fn get_service_port(config_port: u16, service: &ServiceInfo) -> u16 {
    let is_default = config_port == 0 || config_port == service.default_port;

    if is_default {
        let env_var = format!("{}_PORT", service.name.to_uppercase());
        if let Ok(port) = std::env::var(&env_var) {
            if let Ok(p) = port.parse::<u16>() {
                return p;
            }
        }
    }

    if config_port > 0 {
        config_port
    } else {
        service.default_port
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_service_info_creation() {
        let service = ServiceInfo::new("test_service", "Test Service", 8080).with_version("1.2.3");
        assert_eq!(service.name, "test_service");
        assert_eq!(service.description, "Test Service");
        assert_eq!(service.default_port, 8080);
        assert_eq!(service.version, "1.2.3");
    }

    #[test]
    fn test_parse_log_level() {
        assert_eq!(parse_log_level("debug"), Level::DEBUG);
        assert_eq!(parse_log_level("WARN"), Level::WARN);
        assert_eq!(parse_log_level("nonsense"), Level::INFO);
    }

    #[test]
    fn test_explicit_port_wins() {
        let service = ServiceInfo::new("portcheck", "Test", 9090);
        assert_eq!(get_service_port(8088, &service), 8088);
    }

    #[test]
    fn test_zero_port_falls_back_to_default() {
        let service = ServiceInfo::new("portcheck_zero", "Test", 9090);
        assert_eq!(get_service_port(0, &service), 9090);
    }
}
