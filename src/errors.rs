//! # Application Error Types
//!
//! This module defines common error types used throughout the repair-scan service.
//! It provides structured error handling for configuration, image handling and
//! the provider fallback chain.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Vehicle document scan errors
    Scan(String),
    /// Network/communication errors
    Network(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Scan(msg) => write!(f, "[SCAN] {}", msg),
            AppError::Network(msg) => write!(f, "[NETWORK] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<crate::scan_errors::ScanError> for AppError {
    fn from(err: crate::scan_errors::ScanError) -> Self {
        match err {
            crate::scan_errors::ScanError::Configuration(msg) => AppError::Config(msg),
            other => AppError::Scan(other.to_string()),
        }
    }
}

impl From<crate::providers::TransportError> for AppError {
    fn from(err: crate::providers::TransportError) -> Self {
        AppError::Network(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the service
pub mod error_logging {
    use tracing::error;

    /// Log a fatal scan error with image and timing context
    pub fn log_scan_error(
        error: &impl std::fmt::Display,
        operation: &str,
        image_size: Option<usize>,
        attempt_count: Option<usize>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            image_size_bytes = ?image_size,
            attempt_count = ?attempt_count,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "Vehicle document scan failed"
        );
    }

    /// Log network/communication errors with connection context
    pub fn log_network_error(
        error: &impl std::fmt::Display,
        operation: &str,
        endpoint: Option<&str>,
        attempt_count: Option<u32>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            endpoint = ?endpoint,
            attempt_count = ?attempt_count,
            "Network operation failed"
        );
    }

    /// Log validation errors with input context
    pub fn log_validation_error(
        error: &impl std::fmt::Display,
        operation: &str,
        input_type: &str,
        input_value: Option<&str>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            input_type = %input_type,
            input_value = ?input_value.map(|v| if v.len() > 100 { format!("{}...", v.chars().take(100).collect::<String>()) } else { v.to_string() }),
            "Validation failed"
        );
    }

    /// Log internal application errors with component context
    pub fn log_internal_error(error: &impl std::fmt::Display, component: &str, operation: &str) {
        error!(
            error = %error,
            component = %component,
            operation = %operation,
            "Internal application error"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}
