//! # Serial Communication Module
//!
//! Handles the serial link to the ATS-MINI receiver.
//!
//! This module handles:
//! - Discovering the receiver's USB-serial device
//! - Opening the port with a 115200 -> 9600 baud fallback
//! - Serializing all wire access between commands and the telemetry reader
//! - Line-oriented reads bounded by a per-call timeout

use std::time::Duration;

pub mod discovery;
pub mod link;
pub mod port_trait;

pub use link::{LinkGuard, LinkInfo, LinkSettings, SerialLink};
pub use port_trait::{PortOpener, SerialPortIO, TokioSerialOpener};

/// Primary baud rate of the ATS-MINI USB console
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Baud rate tried once when the primary rate fails to open
pub const FALLBACK_BAUD_RATE: u32 = 9_600;

/// Bound on a single low-level readline
pub const READ_TIMEOUT: Duration = Duration::from_millis(100);
