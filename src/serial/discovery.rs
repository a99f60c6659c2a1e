//! # Port Discovery
//!
//! Best-effort selection of the receiver's serial device.
//!
//! An explicit path always wins. Otherwise the enumerated ports are searched
//! for common USB-serial bridge identifiers in their product or manufacturer
//! text, falling back to the first enumerated port. The result is advisory:
//! opening it may still fail.

use tokio_serial::{SerialPortInfo, SerialPortType};

/// Identifiers of USB-serial bridges commonly used by ATS-MINI boards
pub const PORT_KEYWORDS: &[&str] = &[
    "USB", "CP210", "CH340", "FTDI", "UART", "CDC", "Silicon", "SiLabs",
];

/// An enumerated serial device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortCandidate {
    /// Device path (e.g. /dev/ttyUSB0 or COM3)
    pub path: String,
    /// Product description, if reported
    pub description: Option<String>,
    /// Manufacturer, if reported
    pub manufacturer: Option<String>,
}

impl PortCandidate {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            description: None,
            manufacturer: None,
        }
    }

    /// Attach descriptive metadata
    pub fn with_metadata(mut self, description: Option<&str>, manufacturer: Option<&str>) -> Self {
        self.description = description.map(str::to_string);
        self.manufacturer = manufacturer.map(str::to_string);
        self
    }

    /// Whether the description or manufacturer mentions a known bridge keyword
    pub fn matches_keywords(&self) -> bool {
        let text = format!(
            "{} {}",
            self.description.as_deref().unwrap_or(""),
            self.manufacturer.as_deref().unwrap_or("")
        )
        .to_uppercase();

        PORT_KEYWORDS
            .iter()
            .any(|keyword| text.contains(&keyword.to_uppercase()))
    }
}

impl From<SerialPortInfo> for PortCandidate {
    fn from(info: SerialPortInfo) -> Self {
        let (description, manufacturer) = match info.port_type {
            SerialPortType::UsbPort(usb) => (usb.product, usb.manufacturer),
            _ => (None, None),
        };

        Self {
            path: info.port_name,
            description,
            manufacturer,
        }
    }
}

/// Pick a device path
///
/// # Arguments
///
/// * `preferred` - Explicit path; returned unchanged when given
/// * `ports` - Enumerated devices, in enumeration order
///
/// # Returns
///
/// * `Option<String>` - Chosen path, or `None` if there is nothing to choose from
///
/// # Examples
///
/// ```
/// use ats_bridge::serial::discovery::{select_port, PortCandidate};
///
/// let ports = vec![
///     PortCandidate::new("/dev/ttyS0"),
///     PortCandidate::new("/dev/ttyUSB0").with_metadata(Some("CP2102 USB to UART"), None),
/// ];
/// assert_eq!(select_port(None, &ports).as_deref(), Some("/dev/ttyUSB0"));
/// assert_eq!(select_port(Some("COM7"), &ports).as_deref(), Some("COM7"));
/// ```
pub fn select_port(preferred: Option<&str>, ports: &[PortCandidate]) -> Option<String> {
    if let Some(path) = preferred {
        return Some(path.to_string());
    }

    ports
        .iter()
        .find(|port| port.matches_keywords())
        .or_else(|| ports.first())
        .map(|port| port.path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_path_is_returned_unchanged() {
        assert_eq!(select_port(Some("/dev/custom"), &[]).as_deref(), Some("/dev/custom"));
    }

    #[test]
    fn test_no_ports_yields_none() {
        assert_eq!(select_port(None, &[]), None);
    }

    #[test]
    fn test_keyword_match_preferred_over_first_port() {
        let ports = vec![
            PortCandidate::new("/dev/ttyS0").with_metadata(Some("16550A"), None),
            PortCandidate::new("/dev/ttyACM0")
                .with_metadata(Some("Generic"), Some("Silicon Labs")),
        ];
        assert_eq!(select_port(None, &ports).as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let port = PortCandidate::new("COM4").with_metadata(Some("usb-serial ch340"), None);
        assert!(port.matches_keywords());

        let port = PortCandidate::new("COM5").with_metadata(None, Some("silabs"));
        assert!(port.matches_keywords());
    }

    #[test]
    fn test_falls_back_to_first_port() {
        let ports = vec![
            PortCandidate::new("/dev/ttyS0"),
            PortCandidate::new("/dev/ttyS1").with_metadata(Some("Onboard"), Some("Intel")),
        ];
        assert_eq!(select_port(None, &ports).as_deref(), Some("/dev/ttyS0"));
    }

    #[test]
    fn test_port_without_metadata_does_not_match() {
        assert!(!PortCandidate::new("/dev/ttyUSB0").matches_keywords());
    }
}
