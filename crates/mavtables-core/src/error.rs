//! Error types for the mavtables packet firewall.
//!
//! Every error is serializable so it can be attached to structured log
//! records. Only [`AddressError`], [`ChainError`] and [`ConfigError`] are
//! fatal, and only at startup; the rest are expected signals recovered by
//! the calling task.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using MavtablesError as the error type.
pub type Result<T> = std::result::Result<T, MavtablesError>;

/// Top-level error type for all mavtables operations.
#[derive(Debug, Error, Serialize, Deserialize)]
#[serde(tag = "type", content = "details")]
pub enum MavtablesError {
    /// Malformed MAVLink address, subnet or IP address
    #[error("Address error: {0}")]
    Address(#[from] AddressError),

    /// Invalid chain definition or reference
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Chain invocation depth exceeded
    #[error("Recursion error: {0}")]
    Recursion(#[from] RecursionError),

    /// Packet queue signal
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Errors produced while parsing or constructing addresses.
///
/// These never occur on the packet path since packet addresses are fixed
/// width binary fields.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum AddressError {
    /// Text is not of the form `<system>.<component>`
    #[error("Invalid MAVLink address string: \"{value}\"")]
    InvalidAddress { value: String },

    /// A numeric field does not fit its width
    #[error("{field} ({value}) is outside of the allowed range (0 - {max})")]
    OutOfRange {
        field: String,
        value: u64,
        max: u64,
    },

    /// Text is not one of the subnet forms
    #[error("Invalid MAVLink subnet: \"{value}\"")]
    InvalidSubnet { value: String },

    /// Slash or backslash bit count is too large
    #[error("{notation} mask ({bits}) is outside of allowed range (0 - {max})")]
    MaskOutOfRange {
        notation: String,
        bits: u32,
        max: u32,
    },

    /// Text is not an IPv4 address with optional port
    #[error("Invalid IP address string: \"{value}\"")]
    InvalidIp { value: String },
}

impl AddressError {
    /// Creates an invalid address error.
    pub fn invalid_address(value: impl Into<String>) -> Self {
        Self::InvalidAddress {
            value: value.into(),
        }
    }

    /// Creates an invalid subnet error.
    pub fn invalid_subnet(value: impl Into<String>) -> Self {
        Self::InvalidSubnet {
            value: value.into(),
        }
    }

    /// Creates an out of range error.
    pub fn out_of_range(field: impl Into<String>, value: u64, max: u64) -> Self {
        Self::OutOfRange {
            field: field.into(),
            value,
            max,
        }
    }
}

/// Errors raised while assembling a chain set.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ChainError {
    /// Chain names must be non-empty and free of whitespace
    #[error("Invalid chain name: \"{name}\"")]
    InvalidName { name: String },

    /// A rule refers to a chain that was never defined
    #[error("Chain \"{name}\" is referenced but never defined")]
    UndefinedChain { name: String },

    /// Lookup of a chain that does not exist
    #[error("No chain named \"{name}\"")]
    UnknownChain { name: String },
}

/// Nested chain invocation exceeded the configured maximum depth.
///
/// Treated as a reject of the packet being evaluated, never as a crash.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("Recursion detected entering chain \"{chain}\": depth {max_depth} reached")]
pub struct RecursionError {
    /// Chain that could not be entered
    pub chain: String,
    /// Configured maximum depth
    pub max_depth: usize,
}

/// Signals from a packet queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum QueueError {
    /// The queue has been closed (and, for pops, drained)
    #[error("queue closed")]
    Closed,

    /// A bounded wait elapsed
    #[error("timed out waiting on queue")]
    Timeout,

    /// A non-blocking push found the queue at capacity
    #[error("queue full")]
    Full,
}

impl QueueError {
    /// Returns true for the shutdown signal.
    pub fn is_closed(&self) -> bool {
        matches!(self, QueueError::Closed)
    }
}

/// Errors related to configuration.
///
/// These errors occur when loading, parsing, or validating configuration files.
#[derive(Debug, Error, Serialize, Deserialize)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {reason}")]
    LoadFailed { path: String, reason: String },

    /// Invalid configuration format
    #[error("Invalid configuration format: {reason}")]
    InvalidFormat { reason: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    /// Creates a file not found error.
    pub fn file_not_found(path: impl Into<String>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Creates an invalid value error.
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_serialization() {
        let err = MavtablesError::Address(AddressError::invalid_address("1.2.3"));
        let json = serde_json::to_string(&err).unwrap();
        assert!(json.contains("Address"));
        assert!(json.contains("1.2.3"));
    }

    #[test]
    fn test_address_error_display() {
        let err = AddressError::out_of_range("System ID", 256, 255);
        assert_eq!(
            err.to_string(),
            "System ID (256) is outside of the allowed range (0 - 255)"
        );
    }

    #[test]
    fn test_recursion_error_display() {
        let err = RecursionError {
            chain: "loop".to_string(),
            max_depth: 8,
        };
        let display = err.to_string();
        assert!(display.contains("loop"));
        assert!(display.contains('8'));
    }

    #[test]
    fn test_queue_error_conversion() {
        let err: MavtablesError = QueueError::Closed.into();
        assert!(matches!(err, MavtablesError::Queue(QueueError::Closed)));
        assert!(QueueError::Closed.is_closed());
        assert!(!QueueError::Timeout.is_closed());
    }

    #[test]
    fn test_config_error_helpers() {
        let err = ConfigError::file_not_found("/etc/mavtables/mavtables.yaml");
        assert!(matches!(err, ConfigError::FileNotFound { .. }));

        let err = ConfigError::invalid_value("queue.capacity", "must be positive");
        assert!(err.to_string().contains("queue.capacity"));
    }
}
