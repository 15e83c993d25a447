//! Unified error types for the beacon-relay core library.
//!
//! This module provides a unified error type [`RelayError`] that covers all
//! failure modes across the pipeline. Each module also has its own specific
//! error type ([`ConfigError`](crate::config::ConfigError),
//! [`BluetoothError`](crate::bluetooth::BluetoothError),
//! [`UploadError`](crate::upload::UploadError)) for internal use.
//!
//! Classification never fails: an advertisement that matches no filter is
//! simply discarded.
//!
//! # Example
//!
//! ```rust
//! use beacon_core::error::{RelayError, Result};
//! use std::path::PathBuf;
//!
//! fn require_config(path: &PathBuf) -> Result<()> {
//!     if !path.exists() {
//!         return Err(RelayError::ConfigNotFound(path.clone()));
//!     }
//!     Ok(())
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// The unified error type for all beacon-relay operations.
#[derive(Debug, Error)]
pub enum RelayError {
    // =========================================================================
    // BLUETOOTH ERRORS
    // =========================================================================
    /// No Bluetooth adapter was found on this system.
    #[error(
        "No Bluetooth adapter found. Ensure Bluetooth hardware is present and bluetoothd is running."
    )]
    BluetoothAdapterNotFound,

    /// The Bluetooth adapter exists but is powered off.
    #[error("Bluetooth adapter is powered off. Set scanner.power_on = true or run 'bluetoothctl power on'.")]
    BluetoothAdapterPoweredOff,

    /// Advertisement scanning failed.
    #[error("Bluetooth scan failed: {0}")]
    BluetoothScanFailed(String),

    // =========================================================================
    // UPLOAD ERRORS
    // =========================================================================
    /// The upload endpoint could not be reached or timed out.
    #[error("Upload endpoint unreachable: {0}")]
    UploadUnreachable(String),

    /// The upload endpoint rejected the request.
    #[error("Upload rejected with HTTP status {status}: {endpoint}")]
    UploadRejected {
        /// Endpoint without query string.
        endpoint: String,
        /// Status code returned.
        status: u16,
    },

    /// The upload sink is misconfigured.
    #[error("Upload sink misconfigured: {0}")]
    UploadMisconfigured(String),

    // =========================================================================
    // CONFIGURATION ERRORS
    // =========================================================================
    /// The configuration file was not found at the expected path.
    #[error("Configuration file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    /// The configuration file exists but could not be parsed.
    #[error("Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// The configuration was parsed but contains invalid values.
    #[error("Configuration validation failed: {0}")]
    ConfigValidationError(String),

    // =========================================================================
    // I/O ERRORS
    // =========================================================================
    /// A low-level I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// A specialized [`Result`] type for beacon-relay operations.
pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Returns `true` if this error is related to Bluetooth operations.
    #[inline]
    #[must_use]
    pub const fn is_bluetooth_error(&self) -> bool {
        matches!(
            self,
            Self::BluetoothAdapterNotFound
                | Self::BluetoothAdapterPoweredOff
                | Self::BluetoothScanFailed(_)
        )
    }

    /// Returns `true` if this error is related to uploading.
    #[inline]
    #[must_use]
    pub const fn is_upload_error(&self) -> bool {
        matches!(
            self,
            Self::UploadUnreachable(_) | Self::UploadRejected { .. } | Self::UploadMisconfigured(_)
        )
    }

    /// Returns `true` if this error is related to configuration.
    #[inline]
    #[must_use]
    pub const fn is_config_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigNotFound(_) | Self::ConfigParseError(_) | Self::ConfigValidationError(_)
        )
    }

    /// Returns a machine-readable error code for logs.
    #[inline]
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::BluetoothAdapterNotFound => "BLUETOOTH_ADAPTER_NOT_FOUND",
            Self::BluetoothAdapterPoweredOff => "BLUETOOTH_ADAPTER_POWERED_OFF",
            Self::BluetoothScanFailed(_) => "BLUETOOTH_SCAN_FAILED",
            Self::UploadUnreachable(_) => "UPLOAD_UNREACHABLE",
            Self::UploadRejected { .. } => "UPLOAD_REJECTED",
            Self::UploadMisconfigured(_) => "UPLOAD_MISCONFIGURED",
            Self::ConfigNotFound(_) => "CONFIG_NOT_FOUND",
            Self::ConfigParseError(_) => "CONFIG_PARSE_ERROR",
            Self::ConfigValidationError(_) => "CONFIG_VALIDATION_ERROR",
            Self::IoError(_) => "IO_ERROR",
        }
    }
}

// =============================================================================
// CONVERSIONS FROM MODULE-SPECIFIC ERRORS
// =============================================================================

impl From<crate::config::ConfigError> for RelayError {
    fn from(err: crate::config::ConfigError) -> Self {
        use crate::config::ConfigError;
        match err {
            ConfigError::NotFound(path) => Self::ConfigNotFound(path),
            ConfigError::WriteError { path, source } => Self::IoError(std::io::Error::new(
                source.kind(),
                format!("Failed to write {}: {source}", path.display()),
            )),
            ConfigError::ParseError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::SerializeError(e) => Self::ConfigParseError(e.to_string()),
            ConfigError::ValidationError { field, message } => {
                Self::ConfigValidationError(format!("{field}: {message}"))
            }
            ConfigError::MultipleValidationErrors(errors) => {
                let messages: Vec<String> = errors.into_iter().map(|e| e.to_string()).collect();
                Self::ConfigValidationError(messages.join("; "))
            }
        }
    }
}

impl From<crate::bluetooth::BluetoothError> for RelayError {
    fn from(err: crate::bluetooth::BluetoothError) -> Self {
        use crate::bluetooth::BluetoothError;
        match err {
            BluetoothError::AdapterNotFound => Self::BluetoothAdapterNotFound,
            BluetoothError::AdapterPoweredOff => Self::BluetoothAdapterPoweredOff,
            BluetoothError::SessionInitFailed { message }
            | BluetoothError::DiscoveryFailed { message }
            | BluetoothError::Internal { message } => Self::BluetoothScanFailed(message),
        }
    }
}

impl From<crate::upload::UploadError> for RelayError {
    fn from(err: crate::upload::UploadError) -> Self {
        use crate::upload::UploadError;
        match err {
            UploadError::ClientBuild(e) => Self::UploadMisconfigured(e.to_string()),
            UploadError::InvalidEndpoint(endpoint) => {
                Self::UploadMisconfigured(format!("invalid endpoint '{endpoint}'"))
            }
            e @ UploadError::Request { .. } => Self::UploadUnreachable(e.to_string()),
            UploadError::UnexpectedStatus { endpoint, status } => {
                Self::UploadRejected { endpoint, status }
            }
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
