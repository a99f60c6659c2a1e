//! # Telemetry Line Parser
//!
//! Turns one comma-separated monitor line into a [`TelemetrySnapshot`].
//!
//! ## Line Format
//!
//! ```text
//! fw,freq_khz,bfo_hz,band_cal,band,mode,step,bw,agc,vol,rssi,snr,cap,vbat_adc,seq
//! ```
//!
//! Parsing never fails. Missing or blank fields become `None` (frequency and
//! BFO become 0), and fields that should be numeric but are not are recorded
//! in [`TelemetrySnapshot::parse_error`].

use std::str::FromStr;

use super::types::{Modulation, TelemetrySnapshot, Voltage};

/// Scale from the battery ADC reading to millivolts
pub const BATTERY_ADC_SCALE: f64 = 1.702;

/// Positional field indices
mod field {
    pub const FIRMWARE: usize = 0;
    pub const FREQUENCY: usize = 1;
    pub const BFO: usize = 2;
    pub const BAND_CAL: usize = 3;
    pub const BAND_NAME: usize = 4;
    pub const MODE: usize = 5;
    pub const STEP: usize = 6;
    pub const BANDWIDTH: usize = 7;
    pub const AGC: usize = 8;
    pub const VOLUME: usize = 9;
    pub const RSSI: usize = 10;
    pub const SNR: usize = 11;
    pub const TUNING_CAP: usize = 12;
    pub const BATTERY: usize = 13;
    pub const SEQUENCE: usize = 14;
}

struct Fields<'a> {
    parts: Vec<&'a str>,
    errors: Vec<String>,
}

impl<'a> Fields<'a> {
    fn split(line: &'a str) -> Self {
        let parts = if line.trim().is_empty() {
            Vec::new()
        } else {
            line.split(',').map(str::trim).collect()
        };

        Self {
            parts,
            errors: Vec::new(),
        }
    }

    /// Field at `index`, or `None` if missing or blank
    fn raw(&self, index: usize) -> Option<&'a str> {
        self.parts.get(index).copied().filter(|f| !f.is_empty())
    }

    fn text(&self, index: usize) -> Option<String> {
        self.raw(index).map(str::to_string)
    }

    fn number<T: FromStr>(&mut self, index: usize, name: &str) -> Option<T> {
        let raw = self.raw(index)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                self.errors.push(format!("invalid {} '{}'", name, raw));
                None
            }
        }
    }
}

/// Parse a telemetry line
///
/// # Arguments
///
/// * `line` - One line from the receiver, without its terminator
///
/// # Returns
///
/// * `TelemetrySnapshot` - Parsed snapshot (possibly with absent fields)
///
/// # Examples
///
/// ```
/// use ats_bridge::telemetry::parser::parse_telemetry_line;
///
/// let snapshot = parse_telemetry_line("1.0.0,7200,0,10,40m,USB,3,2,1,15,-90,12,128,210,42");
/// assert_eq!(snapshot.frequency, "7.200000 MHz");
/// assert_eq!(snapshot.rssi.as_deref(), Some("-90 dBuV"));
/// ```
pub fn parse_telemetry_line(line: &str) -> TelemetrySnapshot {
    let mut fields = Fields::split(line);

    let frequency_field = fields.raw(field::FREQUENCY);
    let frequency_khz: Option<i64> = fields.number(field::FREQUENCY, "frequency");
    let bfo_hz: i64 = fields.number(field::BFO, "BFO").unwrap_or(0);
    let mode = fields.text(field::MODE);

    let modulation = Modulation::parse(mode.as_deref().unwrap_or(""));

    let frequency = match (frequency_khz, frequency_field) {
        (None, Some(raw)) => format!("{} (raw)", raw),
        (Some(khz), Some(raw))
            if modulation.is_sideband() && sideband_hz(khz, bfo_hz).is_none() =>
        {
            fields.errors.push(format!("frequency out of range '{}'", raw));
            format!("{} (raw)", raw)
        }
        (khz, _) => format_frequency(khz.unwrap_or(0), bfo_hz, &modulation),
    };

    let volume = fields.number(field::VOLUME, "volume");
    let rssi_dbuv: Option<i32> = fields.number(field::RSSI, "RSSI");
    let snr_db: Option<i32> = fields.number(field::SNR, "SNR");

    let parse_error = if fields.errors.is_empty() {
        None
    } else {
        Some(fields.errors.join("; "))
    };

    TelemetrySnapshot {
        field_count: fields.parts.len(),
        firmware_version: fields.text(field::FIRMWARE),
        frequency_khz: frequency_khz.unwrap_or(0),
        bfo_hz,
        band_cal: fields.text(field::BAND_CAL),
        band_name: fields.text(field::BAND_NAME),
        mode,
        step_idx: fields.text(field::STEP),
        bandwidth_idx: fields.text(field::BANDWIDTH),
        agc_idx: fields.text(field::AGC),
        volume,
        rssi_dbuv,
        snr_db,
        tuning_capacitor: fields.text(field::TUNING_CAP),
        voltage: fields.raw(field::BATTERY).map(battery_voltage),
        sequence: fields.text(field::SEQUENCE),
        frequency,
        rssi: rssi_dbuv.map(|v| format!("{} dBuV", v)),
        snr: snr_db.map(|v| format!("{} dB", v)),
        parse_error,
    }
}

/// Format a frequency for display
///
/// | Mode | Output |
/// |------|--------|
/// | USB/LSB/SSB | `khz * 1000 + bfo` Hz as MHz, 6 decimals |
/// | FM | MHz, 2 decimals |
/// | AM below 1000 kHz | integer kHz |
/// | AM and anything else | MHz, 3 decimals |
///
/// # Examples
///
/// ```
/// use ats_bridge::telemetry::parser::format_frequency;
/// use ats_bridge::telemetry::types::Modulation;
///
/// assert_eq!(format_frequency(7074, -500, &Modulation::Lsb), "7.073500 MHz");
/// assert_eq!(format_frequency(10110, 0, &Modulation::Fm), "10.11 MHz");
/// assert_eq!(format_frequency(810, 0, &Modulation::Am), "810 kHz");
/// ```
pub fn format_frequency(frequency_khz: i64, bfo_hz: i64, mode: &Modulation) -> String {
    if mode.is_sideband() {
        let hz = match sideband_hz(frequency_khz, bfo_hz) {
            Some(hz) => hz as f64,
            None => frequency_khz as f64 * 1000.0 + bfo_hz as f64,
        };
        return format!("{:.6} MHz", hz / 1_000_000.0);
    }

    let mhz = frequency_khz as f64 / 1000.0;
    match mode {
        Modulation::Fm => format!("{:.2} MHz", mhz),
        Modulation::Am if frequency_khz < 1000 => format!("{} kHz", frequency_khz),
        _ => format!("{:.3} MHz", mhz),
    }
}

/// Sideband frequency in Hz, or `None` if it does not fit in an `i64`
fn sideband_hz(frequency_khz: i64, bfo_hz: i64) -> Option<i64> {
    frequency_khz.checked_mul(1000)?.checked_add(bfo_hz)
}

/// Convert the battery ADC field to volts, rounded to three decimals
fn battery_voltage(raw: &str) -> Voltage {
    match raw.parse::<f64>() {
        Ok(adc) => Voltage::Volts(round_millis(adc * BATTERY_ADC_SCALE / 1000.0)),
        Err(_) => Voltage::Raw(raw.to_string()),
    }
}

fn round_millis(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::types::TELEMETRY_FIELD_COUNT;

    const FULL_LINE: &str = "1.0.0,7200,0,10,40m,USB,3,2,1,15,-90,12,128,210,42";

    #[test]
    fn test_parse_full_line() {
        let s = parse_telemetry_line(FULL_LINE);

        assert_eq!(s.field_count, TELEMETRY_FIELD_COUNT);
        assert_eq!(s.firmware_version.as_deref(), Some("1.0.0"));
        assert_eq!(s.frequency_khz, 7200);
        assert_eq!(s.bfo_hz, 0);
        assert_eq!(s.band_cal.as_deref(), Some("10"));
        assert_eq!(s.band_name.as_deref(), Some("40m"));
        assert_eq!(s.mode.as_deref(), Some("USB"));
        assert_eq!(s.step_idx.as_deref(), Some("3"));
        assert_eq!(s.bandwidth_idx.as_deref(), Some("2"));
        assert_eq!(s.agc_idx.as_deref(), Some("1"));
        assert_eq!(s.volume, Some(15));
        assert_eq!(s.rssi_dbuv, Some(-90));
        assert_eq!(s.snr_db, Some(12));
        assert_eq!(s.tuning_capacitor.as_deref(), Some("128"));
        assert_eq!(s.sequence.as_deref(), Some("42"));
        assert_eq!(s.parse_error, None);

        assert_eq!(s.frequency, "7.200000 MHz");
        assert_eq!(s.rssi.as_deref(), Some("-90 dBuV"));
        assert_eq!(s.snr.as_deref(), Some("12 dB"));

        let expected = (210.0 * 1.702 / 1000.0 * 1000.0_f64).round() / 1000.0;
        assert_eq!(s.voltage, Some(Voltage::Volts(expected)));
        assert_eq!(s.voltage, Some(Voltage::Volts(0.357)));
    }

    #[test]
    fn test_fields_are_trimmed() {
        let s = parse_telemetry_line(" 2.1 , 9600 , 0 ,, 31m , am ,1,1,1, 20 ,-70, 5 ,0, 2400 ,7\r");
        assert_eq!(s.firmware_version.as_deref(), Some("2.1"));
        assert_eq!(s.frequency_khz, 9600);
        assert_eq!(s.band_cal, None);
        assert_eq!(s.band_name.as_deref(), Some("31m"));
        assert_eq!(s.frequency, "9.600 MHz");
        assert_eq!(s.volume, Some(20));
        assert_eq!(s.sequence.as_deref(), Some("7"));
    }

    #[test]
    fn test_raw_numeric_fields_match_input() {
        for (khz, bfo, vol, rssi, snr) in [
            (153, 0, 0, 0, 0),
            (7074, -1250, 63, 45, 30),
            (107_900, 0, 10, -5, -3),
            (29_999, 999, 1, 127, 99),
        ] {
            let line = format!(
                "v1,{},{},0,ALL,LSB,0,0,0,{},{},{},0,4000,1",
                khz, bfo, vol, rssi, snr
            );
            let s = parse_telemetry_line(&line);
            assert_eq!(s.frequency_khz, khz);
            assert_eq!(s.bfo_hz, bfo);
            assert_eq!(s.volume, Some(vol));
            assert_eq!(s.rssi_dbuv, Some(rssi));
            assert_eq!(s.snr_db, Some(snr));
            assert_eq!(s.frequency, format_frequency(khz, bfo, &Modulation::Lsb));
        }
    }

    #[test]
    fn test_missing_fields_are_absent() {
        for count in [0usize, 1, 4, 10, 13, 15] {
            let line = FULL_LINE
                .split(',')
                .take(count)
                .collect::<Vec<_>>()
                .join(",");
            let s = parse_telemetry_line(&line);

            assert_eq!(s.field_count, count, "field count for {:?}", line);
            assert_eq!(s.firmware_version.is_some(), count > 0);
            assert_eq!(s.frequency_khz, if count > 1 { 7200 } else { 0 });
            assert_eq!(s.bfo_hz, 0);
            assert_eq!(s.band_name.is_some(), count > 4);
            assert_eq!(s.mode.is_some(), count > 5);
            assert_eq!(s.volume, if count > 9 { Some(15) } else { None });
            assert_eq!(s.rssi_dbuv, if count > 10 { Some(-90) } else { None });
            assert_eq!(s.rssi.is_some(), count > 10);
            assert_eq!(s.snr_db, if count > 11 { Some(12) } else { None });
            assert_eq!(s.snr.is_some(), count > 11);
            assert_eq!(s.tuning_capacitor.is_some(), count > 12);
            assert_eq!(s.voltage.is_some(), count > 13);
            assert_eq!(s.sequence.is_some(), count > 14);
            assert_eq!(s.parse_error, None);
        }
    }

    #[test]
    fn test_blank_fields_are_absent() {
        let s = parse_telemetry_line(",,,,,,,,,,,,,,");
        assert_eq!(s.field_count, 15);
        assert_eq!(s.firmware_version, None);
        assert_eq!(s.frequency_khz, 0);
        assert_eq!(s.bfo_hz, 0);
        assert_eq!(s.volume, None);
        assert_eq!(s.rssi, None);
        assert_eq!(s.snr, None);
        assert_eq!(s.voltage, None);
        assert!(!s.is_valid_observation());
    }

    #[test]
    fn test_frequency_format_per_mode() {
        assert_eq!(format_frequency(7200, 0, &Modulation::Usb), "7.200000 MHz");
        assert_eq!(format_frequency(14_074, 250, &Modulation::Usb), "14.074250 MHz");
        assert_eq!(format_frequency(3_700, -300, &Modulation::Ssb), "3.699700 MHz");
        assert_eq!(format_frequency(10_250, 0, &Modulation::Fm), "10.25 MHz");
        assert_eq!(format_frequency(999, 0, &Modulation::Am), "999 kHz");
        assert_eq!(format_frequency(1000, 0, &Modulation::Am), "1.000 MHz");
        assert_eq!(format_frequency(15_770, 0, &Modulation::Am), "15.770 MHz");
        assert_eq!(
            format_frequency(15_770, 500, &Modulation::Other("CW".to_string())),
            "15.770 MHz"
        );
    }

    #[test]
    fn test_mode_is_case_insensitive() {
        let s = parse_telemetry_line("1.0,7200,100,0,40m,usb");
        assert_eq!(s.frequency, "7.200100 MHz");
        assert_eq!(s.modulation(), Some(Modulation::Usb));
    }

    #[test]
    fn test_missing_mode_uses_default_format() {
        let s = parse_telemetry_line("1.0,7200");
        assert_eq!(s.frequency, "7.200 MHz");
        assert_eq!(s.modulation(), None);
    }

    #[test]
    fn test_non_numeric_frequency_falls_back_to_raw() {
        let s = parse_telemetry_line("1.0,abc,0,0,40m,USB");
        assert_eq!(s.frequency, "abc (raw)");
        assert_eq!(s.frequency_khz, 0);
        assert!(s.parse_error.as_deref().unwrap().contains("frequency"));
    }

    #[test]
    fn test_oversized_sideband_frequency_falls_back_to_raw() {
        let s = parse_telemetry_line("1.0,99999999999999999,0,0,40m,USB");
        assert_eq!(s.frequency, "99999999999999999 (raw)");
        assert_eq!(s.frequency_khz, 99_999_999_999_999_999);
        assert!(s.parse_error.as_deref().unwrap().contains("frequency out of range"));
        assert!(s.is_valid_observation());

        let max = i64::MAX.to_string();
        let s = parse_telemetry_line(&format!("1.0,{},0,0,40m,LSB", max));
        assert_eq!(s.frequency, format!("{} (raw)", max));
    }

    #[test]
    fn test_bfo_overflow_falls_back_to_raw() {
        let line = format!("1.0,7200,{},0,40m,USB", i64::MAX);
        let s = parse_telemetry_line(&line);
        assert_eq!(s.bfo_hz, i64::MAX);
        assert_eq!(s.frequency, "7200 (raw)");
        assert!(s.parse_error.is_some());
    }

    #[test]
    fn test_extreme_values_outside_sideband_do_not_panic() {
        let max = i64::MAX.to_string();
        for mode in ["AM", "FM", "CW", ""] {
            let s = parse_telemetry_line(&format!("1.0,{},{},0,40m,{}", max, max, mode));
            assert_eq!(s.frequency_khz, i64::MAX);
            assert!(s.frequency.ends_with("MHz"), "{}: {}", mode, s.frequency);
        }

        let min = i64::MIN.to_string();
        let s = parse_telemetry_line(&format!("1.0,{},{},0,40m,AM", min, min));
        assert_eq!(s.frequency_khz, i64::MIN);
        assert!(s.frequency.ends_with("kHz"));
    }

    #[test]
    fn test_numbers_beyond_field_range_are_absent() {
        let s = parse_telemetry_line(
            "1.0,99999999999999999999,99999999999999999999,0,40m,USB,0,0,0,2147483648,-2147483649,99999999999",
        );
        assert_eq!(s.frequency_khz, 0);
        assert_eq!(s.frequency, "99999999999999999999 (raw)");
        assert_eq!(s.bfo_hz, 0);
        assert_eq!(s.volume, None);
        assert_eq!(s.rssi_dbuv, None);
        assert_eq!(s.rssi, None);
        assert_eq!(s.snr_db, None);
        assert_eq!(s.snr, None);

        let error = s.parse_error.unwrap();
        for name in ["frequency", "BFO", "volume", "RSSI", "SNR"] {
            assert!(error.contains(name), "missing {} in {}", name, error);
        }
    }

    #[test]
    fn test_format_frequency_never_overflows() {
        assert_eq!(
            format_frequency(i64::MAX, i64::MAX, &Modulation::Usb),
            format!("{:.6} MHz", (i64::MAX as f64 * 1000.0 + i64::MAX as f64) / 1_000_000.0)
        );
        assert!(format_frequency(i64::MIN, i64::MIN, &Modulation::Lsb).ends_with("MHz"));
    }

    #[test]
    fn test_non_numeric_signal_fields_are_absent() {
        let s = parse_telemetry_line("1.0,7200,0,0,40m,AM,0,0,0,loud,--,x");
        assert_eq!(s.volume, None);
        assert_eq!(s.rssi_dbuv, None);
        assert_eq!(s.rssi, None);
        assert_eq!(s.snr, None);

        let error = s.parse_error.unwrap();
        assert!(error.contains("volume"));
        assert!(error.contains("RSSI"));
        assert!(error.contains("SNR"));
    }

    #[test]
    fn test_non_numeric_voltage_passes_through() {
        let s = parse_telemetry_line("1.0,7200,0,0,40m,AM,0,0,0,1,1,1,0,n/a,1");
        assert_eq!(s.voltage, Some(Voltage::Raw("n/a".to_string())));
    }

    #[test]
    fn test_voltage_conversion() {
        assert_eq!(battery_voltage("2400"), Voltage::Volts(4.085));
        assert_eq!(battery_voltage("0"), Voltage::Volts(0.0));
    }

    #[test]
    fn test_parse_is_idempotent() {
        assert_eq!(parse_telemetry_line(FULL_LINE), parse_telemetry_line(FULL_LINE));

        let malformed = "x,y,z";
        assert_eq!(parse_telemetry_line(malformed), parse_telemetry_line(malformed));
    }

    #[test]
    fn test_valid_observation_rule() {
        assert!(parse_telemetry_line(FULL_LINE).is_valid_observation());
        assert!(parse_telemetry_line("1.0").is_valid_observation());
        assert!(parse_telemetry_line(",7200").is_valid_observation());
        assert!(!parse_telemetry_line(",0,0,0").is_valid_observation());
        assert!(!parse_telemetry_line("").is_valid_observation());
    }

    #[test]
    fn test_snapshot_serializes_with_web_keys() {
        let json = serde_json::to_value(parse_telemetry_line(FULL_LINE)).unwrap();
        assert_eq!(json["fw_version"], "1.0.0");
        assert_eq!(json["currentFrequency_raw"], 7200);
        assert_eq!(json["bandName"], "40m");
        assert_eq!(json["frequency"], "7.200000 MHz");
        assert_eq!(json["voltage"], 0.357);
        assert!(json.get("parse_error").is_none());
    }
}
