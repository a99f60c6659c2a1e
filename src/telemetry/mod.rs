//! # Telemetry Module
//!
//! Handles the receiver's monitor-mode telemetry.
//!
//! This module handles:
//! - Parsing comma-separated status lines into typed snapshots
//! - Formatting frequency, RSSI, SNR and battery voltage for display
//! - Publishing the latest valid snapshot for concurrent readers
//! - Running the background line reader

pub mod monitor;
pub mod parser;
pub mod types;

pub use monitor::{MonitorState, PollOutcome, TelemetryReader, TelemetryView};
pub use parser::{format_frequency, parse_telemetry_line};
pub use types::{Modulation, TelemetrySnapshot, Voltage};
