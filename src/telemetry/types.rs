//! # Telemetry Types
//!
//! Typed snapshot of one ATS-MINI monitor line.

use serde::Serialize;

/// Number of positional fields in a complete telemetry line
pub const TELEMETRY_FIELD_COUNT: usize = 15;

/// Demodulation mode reported by the receiver
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modulation {
    Usb,
    Lsb,
    Ssb,
    Fm,
    Am,
    /// Any mode this crate has no special formatting rule for
    Other(String),
}

impl Modulation {
    /// Parse a mode name, ignoring case
    ///
    /// ```
    /// use ats_bridge::telemetry::types::Modulation;
    ///
    /// assert_eq!(Modulation::parse("lsb"), Modulation::Lsb);
    /// assert_eq!(Modulation::parse("CW"), Modulation::Other("CW".to_string()));
    /// ```
    pub fn parse(mode: &str) -> Self {
        match mode.trim().to_ascii_uppercase().as_str() {
            "USB" => Self::Usb,
            "LSB" => Self::Lsb,
            "SSB" => Self::Ssb,
            "FM" => Self::Fm,
            "AM" => Self::Am,
            _ => Self::Other(mode.trim().to_string()),
        }
    }

    /// Single-sideband modes tune with a BFO offset
    pub fn is_sideband(&self) -> bool {
        matches!(self, Self::Usb | Self::Lsb | Self::Ssb)
    }
}

/// Battery voltage field
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Voltage {
    /// Converted reading in volts, rounded to millivolts
    Volts(f64),
    /// Non-numeric field passed through unconverted
    Raw(String),
}

/// Parsed telemetry line
///
/// Absent or blank fields are `None`; frequency and BFO default to 0.
/// Field names serialize to the keys used by the receiver's web UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    /// Number of comma-separated fields in the source line
    #[serde(rename = "raw_parts_count")]
    pub field_count: usize,

    #[serde(rename = "fw_version")]
    pub firmware_version: Option<String>,

    /// Tuned frequency in kHz
    #[serde(rename = "currentFrequency_raw")]
    pub frequency_khz: i64,

    /// BFO offset in Hz
    #[serde(rename = "currentBFO")]
    pub bfo_hz: i64,

    #[serde(rename = "bandCal")]
    pub band_cal: Option<String>,

    #[serde(rename = "bandName")]
    pub band_name: Option<String>,

    /// Mode as reported by the device
    pub mode: Option<String>,

    #[serde(rename = "stepIdx")]
    pub step_idx: Option<String>,

    #[serde(rename = "bandwidthIdx")]
    pub bandwidth_idx: Option<String>,

    #[serde(rename = "agcIdx")]
    pub agc_idx: Option<String>,

    pub volume: Option<i32>,

    #[serde(rename = "rssi_raw")]
    pub rssi_dbuv: Option<i32>,

    #[serde(rename = "snr_raw")]
    pub snr_db: Option<i32>,

    #[serde(rename = "tuningCapacitor")]
    pub tuning_capacitor: Option<String>,

    pub voltage: Option<Voltage>,

    #[serde(rename = "seqnum")]
    pub sequence: Option<String>,

    /// Human-readable frequency, formatted per mode
    pub frequency: String,

    /// e.g. "-90 dBuV"
    pub rssi: Option<String>,

    /// e.g. "12 dB"
    pub snr: Option<String>,

    /// Description of any field that could not be read as a number
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parse_error: Option<String>,
}

impl TelemetrySnapshot {
    /// Parsed modulation, if the line carried a mode
    pub fn modulation(&self) -> Option<Modulation> {
        self.mode.as_deref().map(Modulation::parse)
    }

    /// Whether this snapshot may replace the published one
    ///
    /// A line needs either a firmware version or a nonzero frequency.
    /// A receiver reporting 0 kHz without a version is discarded.
    pub fn is_valid_observation(&self) -> bool {
        self.firmware_version.is_some() || self.frequency_khz != 0
    }
}
