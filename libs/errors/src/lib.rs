//! Shared error vocabulary for the device bridge services
//!
//! Each service keeps its own domain error enum and gains a common outward
//! interface (codes, categories, HTTP mapping, log levels) by implementing
//! [`ServiceErrorTrait`].

use serde::{Deserialize, Serialize};

// ============================================================================
// ErrorInfo - API error payload
// ============================================================================

/// Standard error information for API responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Error code (HTTP status or custom)
    pub code: u16,
    /// Error message
    pub message: String,
    /// Machine readable error code (e.g. `OUT_OF_RANGE`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl ErrorInfo {
    /// Create a new ErrorInfo with just a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: 500,
            message: message.into(),
            error_code: None,
        }
    }

    /// Set the error code
    pub fn with_code(mut self, code: u16) -> Self {
        self.code = code;
        self
    }

    /// Set the machine readable error code
    pub fn with_error_code(mut self, error_code: impl Into<String>) -> Self {
        self.error_code = Some(error_code.into());
        self
    }
}

// ============================================================================
// Error categories
// ============================================================================

/// Error category enum - used for classification and metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorCategory {
    // Infrastructure layer
    Configuration,
    Network,
    Timeout,

    // Business logic layer
    Validation,
    NotFound,

    // Protocol/communication layer
    Protocol,
    Connection,

    // System level
    Internal,
    ResourceBusy,

    // Others
    Unknown,
}

/// Common capability trait for service error types
///
/// Services keep their domain-specific variants and expose a uniform
/// interface through this trait. Only `error_code` and `category` are
/// required; everything else has category-based defaults.
pub trait ServiceErrorTrait: std::error::Error + Send + Sync + 'static {
    /// Get error code (for API, logs, monitoring)
    fn error_code(&self) -> &'static str;

    /// Get error category (for classification/metrics)
    fn category(&self) -> ErrorCategory;

    /// Whether the error is retryable (default implementation is category-based)
    fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Connection
                | ErrorCategory::ResourceBusy
        )
    }

    /// HTTP status code as a plain number
    fn status_code(&self) -> u16 {
        match self.category() {
            ErrorCategory::Validation => 400,
            ErrorCategory::NotFound => 404,
            ErrorCategory::Protocol | ErrorCategory::Connection | ErrorCategory::Network => 502,
            ErrorCategory::ResourceBusy => 503,
            ErrorCategory::Timeout => 504,
            _ => 500,
        }
    }

    /// Convert to API ErrorInfo for HTTP responses
    fn to_error_info(&self) -> ErrorInfo {
        ErrorInfo::new(self.to_string())
            .with_code(self.status_code())
            .with_error_code(self.error_code())
    }

    /// Get log level
    fn log_level(&self) -> tracing::Level {
        use tracing::Level;
        match self.category() {
            ErrorCategory::Internal | ErrorCategory::Configuration => Level::ERROR,
            ErrorCategory::Network
            | ErrorCategory::Timeout
            | ErrorCategory::Connection
            | ErrorCategory::Protocol => Level::WARN,
            ErrorCategory::Validation | ErrorCategory::NotFound => Level::INFO,
            _ => Level::WARN,
        }
    }
}

// Tests
#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    enum SampleError {
        #[error("link down")]
        LinkDown,
        #[error("bad value")]
        BadValue,
        #[error("slow device")]
        Slow,
    }

    impl ServiceErrorTrait for SampleError {
        fn error_code(&self) -> &'static str {
            match self {
                Self::LinkDown => "LINK_DOWN",
                Self::BadValue => "BAD_VALUE",
                Self::Slow => "SLOW",
            }
        }

        fn category(&self) -> ErrorCategory {
            match self {
                Self::LinkDown => ErrorCategory::Connection,
                Self::BadValue => ErrorCategory::Validation,
                Self::Slow => ErrorCategory::Timeout,
            }
        }
    }

    #[test]
    fn test_default_status_codes() {
        assert_eq!(SampleError::LinkDown.status_code(), 502);
        assert_eq!(SampleError::BadValue.status_code(), 400);
        assert_eq!(SampleError::Slow.status_code(), 504);
    }

    #[test]
    fn test_default_retryable() {
        assert!(SampleError::LinkDown.is_retryable());
        assert!(SampleError::Slow.is_retryable());
        assert!(!SampleError::BadValue.is_retryable());
    }

    #[test]
    fn test_error_info() {
        let info = SampleError::BadValue.to_error_info();
        assert_eq!(info.code, 400);
        assert_eq!(info.error_code.as_deref(), Some("BAD_VALUE"));
        assert_eq!(info.message, "bad value");

        let value = serde_json::to_value(ErrorInfo::new("Internal")).unwrap();
        assert!(value.get("error_code").is_none());
    }

    #[test]
    fn test_log_levels() {
        assert_eq!(SampleError::BadValue.log_level(), tracing::Level::INFO);
        assert_eq!(SampleError::LinkDown.log_level(), tracing::Level::WARN);
    }
}
