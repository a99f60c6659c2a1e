//! # Error Types
//!
//! Custom error types for ATS Bridge using `thiserror`.
//!
//! Telemetry parse anomalies are deliberately absent from this enum: a bad
//! telemetry line degrades to absent snapshot fields, never to an error.

use thiserror::Error;

/// Main error type for ATS Bridge
#[derive(Debug, Error)]
pub enum BridgeError {
    /// No device found, or the port could not be opened at any attempted baud rate
    #[error("Connection error: {0}")]
    Connection(String),

    /// Operation attempted while no link is open
    #[error("Serial port not opened")]
    NotConnected,

    /// Malformed or truncated screenshot stream
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Low-level serial write/flush failure while holding the link
    #[error("Serial error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for ATS Bridge
pub type Result<T> = std::result::Result<T, BridgeError>;
