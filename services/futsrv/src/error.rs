//! Error handling for the Futura bridge service
//!
//! One domain error enum for the whole crate. Read-path failures are absorbed
//! by the range reader; write-path failures are surfaced to the caller.

use common::AppError;
use errors::{ErrorCategory, ServiceErrorTrait};
use thiserror::Error;

/// Bridge service error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FutSrvError {
    /// Transport layer failure (socket I/O, connection refused, closed link)
    #[error("Transport error: {0}")]
    Transport(String),

    /// Request did not complete within the transport timeout
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// Device answered with a Modbus exception
    #[error("Device exception: function 0x{function:02X}, code 0x{code:02X}")]
    Exception { function: u8, code: u8 },

    /// Malformed or unexpected frame
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Field name not present in the address map for the requested kind
    #[error("Unknown field: {0}")]
    UnknownField(String),

    /// Field is unknown, read-only, or spans more than one register
    #[error("Unknown or not-writable field: {0}")]
    UnknownOrNotWritable(String),

    /// Physical value does not fit the 16-bit register representation
    #[error("Value out of range for field {field}: {value} encodes to {scaled}")]
    OutOfRange {
        field: String,
        value: f64,
        scaled: i64,
    },

    /// Single register write failed at the transport layer
    #[error("Write register {address} failed: {reason}")]
    WriteFailed { address: u16, reason: String },

    /// Configured register ranges violate bounds or ordering
    #[error("Schema validation error: {0}")]
    SchemaValidation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Write request body has an unusable shape
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    Io(String),
}

/// Result type alias for the bridge service
pub type Result<T> = std::result::Result<T, FutSrvError>;

impl FutSrvError {
    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a schema validation error
    pub fn schema(msg: impl Into<String>) -> Self {
        Self::SchemaValidation(msg.into())
    }

    /// Create an invalid payload error
    pub fn invalid_payload(msg: impl Into<String>) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Wrap a transport-level failure of a register write
    pub fn write_failed(address: u16, cause: &FutSrvError) -> Self {
        Self::WriteFailed {
            address,
            reason: cause.to_string(),
        }
    }

    /// Whether the failure came from the link rather than from the request
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Timeout(_) | Self::Exception { .. } | Self::Protocol(_)
        )
    }
}

impl From<std::io::Error> for FutSrvError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<figment::Error> for FutSrvError {
    fn from(err: figment::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<prometheus::Error> for FutSrvError {
    fn from(err: prometheus::Error) -> Self {
        Self::Config(format!("metrics registry: {}", err))
    }
}

impl ServiceErrorTrait for FutSrvError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Transport(_) => "TRANSPORT_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Exception { .. } => "DEVICE_EXCEPTION",
            Self::Protocol(_) => "PROTOCOL_ERROR",
            Self::UnknownField(_) => "UNKNOWN_FIELD",
            Self::UnknownOrNotWritable(_) => "UNKNOWN_OR_NOT_WRITABLE",
            Self::OutOfRange { .. } => "OUT_OF_RANGE",
            Self::WriteFailed { .. } => "WRITE_FAILED",
            Self::SchemaValidation(_) => "SCHEMA_VALIDATION_ERROR",
            Self::Config(_) => "CONFIGURATION_ERROR",
            Self::InvalidPayload(_) => "INVALID_PAYLOAD",
            Self::Io(_) => "IO_ERROR",
        }
    }

    fn category(&self) -> ErrorCategory {
        match self {
            Self::Transport(_) | Self::WriteFailed { .. } => ErrorCategory::Connection,
            Self::Timeout(_) => ErrorCategory::Timeout,
            Self::Exception { .. } | Self::Protocol(_) => ErrorCategory::Protocol,
            Self::UnknownField(_) | Self::UnknownOrNotWritable(_) => ErrorCategory::NotFound,
            Self::OutOfRange { .. } | Self::InvalidPayload(_) => ErrorCategory::Validation,
            Self::SchemaValidation(_) | Self::Config(_) => ErrorCategory::Configuration,
            Self::Io(_) => ErrorCategory::Internal,
        }
    }

    fn status_code(&self) -> u16 {
        match self {
            // A bad field name is a client mistake, not a missing resource
            Self::UnknownField(_) | Self::UnknownOrNotWritable(_) => 400,
            _ => match self.category() {
                ErrorCategory::Validation => 400,
                ErrorCategory::Protocol | ErrorCategory::Connection => 502,
                ErrorCategory::Timeout => 504,
                _ => 500,
            },
        }
    }
}

impl From<FutSrvError> for AppError {
    fn from(err: FutSrvError) -> Self {
        AppError::from_service_error(&err)
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_error_codes_and_status() {
        let err = FutSrvError::UnknownOrNotWritable("NoSuchField".into());
        assert_eq!(err.error_code(), "UNKNOWN_OR_NOT_WRITABLE");
        assert_eq!(err.status_code(), 400);

        let err = FutSrvError::WriteFailed {
            address: 10,
            reason: "broken pipe".into(),
        };
        assert_eq!(err.status_code(), 502);
        assert!(err.to_string().contains("register 10"));

        assert_eq!(FutSrvError::Timeout("read".into()).status_code(), 504);
        assert_eq!(FutSrvError::config("bad").status_code(), 500);
    }

    #[test]
    fn test_retryable_follows_category() {
        assert!(FutSrvError::transport("reset").is_retryable());
        assert!(FutSrvError::Timeout("slow".into()).is_retryable());
        assert!(!FutSrvError::invalid_payload("not an object").is_retryable());
    }

    #[test]
    fn test_app_error_conversion() {
        let app: AppError = FutSrvError::OutOfRange {
            field: "CfgTempSet".into(),
            value: 999999.0,
            scaled: 9999990,
        }
        .into();
        assert_eq!(app.status, StatusCode::BAD_REQUEST);
        assert_eq!(app.error.error_code.as_deref(), Some("OUT_OF_RANGE"));
        assert!(app.error.message.contains("CfgTempSet"));
    }

    #[test]
    fn test_write_failed_wraps_cause() {
        let cause = FutSrvError::transport("connection reset by peer");
        let err = FutSrvError::write_failed(922, &cause);
        match err {
            FutSrvError::WriteFailed { address, reason } => {
                assert_eq!(address, 922);
                assert!(reason.contains("connection reset"));
            },
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_is_transport() {
        assert!(FutSrvError::Exception {
            function: 0x04,
            code: 0x02
        }
        .is_transport());
        assert!(!FutSrvError::UnknownField("x".into()).is_transport());
    }
}
