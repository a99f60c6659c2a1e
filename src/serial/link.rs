//! # Serial Link
//!
//! Owns the single connection to the receiver and arbitrates access to it.
//!
//! The open port lives inside a fair async mutex. Everything that touches
//! the wire (a command's write plus its bounded reads, one telemetry readline,
//! and opening/closing the port) holds that mutex, so a reconnect can never
//! happen while a read or write is in flight and two parties never interleave
//! on the wire.

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};

use super::discovery::select_port;
use super::port_trait::{PortOpener, SerialPortIO};
use super::{DEFAULT_BAUD_RATE, FALLBACK_BAUD_RATE, READ_TIMEOUT};

/// Baud rates and per-call read timeout used when opening the link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkSettings {
    /// Primary baud rate; a failed open at this rate retries at `fallback_baud_rate`
    pub default_baud_rate: u32,
    /// Baud rate tried once after the primary fails
    pub fallback_baud_rate: u32,
    /// Bound on each low-level readline
    pub read_timeout: Duration,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            default_baud_rate: DEFAULT_BAUD_RATE,
            fallback_baud_rate: FALLBACK_BAUD_RATE,
            read_timeout: READ_TIMEOUT,
        }
    }
}

/// Description of the currently open device
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub path: String,
    pub baud_rate: u32,
}

struct OpenPort {
    io: Box<dyn SerialPortIO>,
    info: LinkInfo,
}

/// Single serial link to the receiver
pub struct SerialLink {
    slot: Mutex<Option<OpenPort>>,
    opener: Box<dyn PortOpener>,
    settings: LinkSettings,
}

impl std::fmt::Debug for SerialLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialLink")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

/// Exclusive access to the link, held for one write-then-read sequence
///
/// Dropping the guard releases the link to the next waiter.
pub struct LinkGuard<'a> {
    slot: MutexGuard<'a, Option<OpenPort>>,
}

impl LinkGuard<'_> {
    /// Whether a port is currently open
    pub fn is_open(&self) -> bool {
        self.slot.is_some()
    }

    /// Borrow the open port
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if no port is open
    pub fn port(&mut self) -> Result<&mut dyn SerialPortIO> {
        match self.slot.as_mut() {
            Some(open) => Ok(open.io.as_mut()),
            None => Err(BridgeError::NotConnected),
        }
    }
}

impl SerialLink {
    /// Create a closed link that opens ports through `opener`
    pub fn new(opener: Box<dyn PortOpener>, settings: LinkSettings) -> Self {
        Self {
            slot: Mutex::new(None),
            opener,
            settings,
        }
    }

    /// Link settings in use
    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    /// Per-call bound for a single readline
    pub fn read_timeout(&self) -> Duration {
        self.settings.read_timeout
    }

    /// Open (or reopen) the link
    ///
    /// Any open port is closed first. The path is resolved from `path` or
    /// by enumerating devices. If `baud_rate` is the primary default and the
    /// open fails, one retry is made at the fallback rate.
    ///
    /// # Errors
    ///
    /// Returns `Connection` if no device is found or every attempt fails
    pub async fn open(&self, path: Option<&str>, baud_rate: u32) -> Result<LinkInfo> {
        let mut slot = self.slot.lock().await;

        if let Some(previous) = slot.take() {
            debug!("Closing {} before reopening", previous.info.path);
        }

        let ports = if path.is_none() {
            self.opener.list_ports()
        } else {
            Vec::new()
        };
        let path = select_port(path, &ports)
            .ok_or_else(|| BridgeError::Connection("no device found".to_string()))?;

        let (io, baud_rate) = match self.opener.open(&path, baud_rate, self.settings.read_timeout) {
            Ok(io) => (io, baud_rate),
            Err(e) if baud_rate == self.settings.default_baud_rate => {
                warn!("Failed to open {}@{}: {}", path, baud_rate, e);
                let fallback = self.settings.fallback_baud_rate;
                let io = self
                    .opener
                    .open(&path, fallback, self.settings.read_timeout)
                    .map_err(|e2| {
                        BridgeError::Connection(format!(
                            "Failed to open serial on {}: {}",
                            path, e2
                        ))
                    })?;
                (io, fallback)
            }
            Err(e) => return Err(e),
        };

        let info = LinkInfo { path, baud_rate };
        info!("Opened serial {} @ {}", info.path, info.baud_rate);
        *slot = Some(OpenPort {
            io,
            info: info.clone(),
        });

        Ok(info)
    }

    /// Close the link; closing a link that was never open is not an error
    pub async fn close(&self) {
        if let Some(open) = self.slot.lock().await.take() {
            info!("Closed serial {}", open.info.path);
        }
    }

    /// Acquire exclusive access to the link
    ///
    /// Waiters are served in arrival order.
    pub async fn lock(&self) -> LinkGuard<'_> {
        LinkGuard {
            slot: self.slot.lock().await,
        }
    }

    /// Whether a port is currently open
    pub async fn is_open(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Path and baud rate of the open port
    pub async fn info(&self) -> Option<LinkInfo> {
        self.slot.lock().await.as_ref().map(|open| open.info.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serial::discovery::PortCandidate;
    use crate::serial::port_trait::mocks::MockSerialPort;
    use crate::serial::port_trait::MockPortOpener;
    use mockall::predicate::eq;

    fn link_with(opener: MockPortOpener) -> SerialLink {
        SerialLink::new(Box::new(opener), LinkSettings::default())
    }

    fn open_failure() -> Result<Box<dyn SerialPortIO>> {
        Err(BridgeError::Connection("device busy".to_string()))
    }

    #[tokio::test]
    async fn test_open_at_default_baud() {
        let mut opener = MockPortOpener::new();
        opener
            .expect_open()
            .with(eq("/dev/ttyUSB0"), eq(DEFAULT_BAUD_RATE), eq(READ_TIMEOUT))
            .times(1)
            .returning(|_, _, _| Ok(MockSerialPort::new().boxed()));

        let link = link_with(opener);
        let info = link.open(Some("/dev/ttyUSB0"), DEFAULT_BAUD_RATE).await.unwrap();

        assert_eq!(info.path, "/dev/ttyUSB0");
        assert_eq!(info.baud_rate, DEFAULT_BAUD_RATE);
        assert!(link.is_open().await);
    }

    #[tokio::test]
    async fn test_default_baud_failure_falls_back() {
        let mut opener = MockPortOpener::new();
        opener
            .expect_open()
            .with(eq("/dev/ttyUSB0"), eq(DEFAULT_BAUD_RATE), eq(READ_TIMEOUT))
            .times(1)
            .returning(|_, _, _| open_failure());
        opener
            .expect_open()
            .with(eq("/dev/ttyUSB0"), eq(FALLBACK_BAUD_RATE), eq(READ_TIMEOUT))
            .times(1)
            .returning(|_, _, _| Ok(MockSerialPort::new().boxed()));

        let link = link_with(opener);
        let info = link.open(Some("/dev/ttyUSB0"), DEFAULT_BAUD_RATE).await.unwrap();

        assert_eq!(info.baud_rate, FALLBACK_BAUD_RATE);
        assert_eq!(link.info().await, Some(info));
    }

    #[tokio::test]
    async fn test_non_default_baud_never_falls_back() {
        let mut opener = MockPortOpener::new();
        opener
            .expect_open()
            .with(eq("/dev/ttyUSB0"), eq(57_600), eq(READ_TIMEOUT))
            .times(1)
            .returning(|_, _, _| open_failure());

        let link = link_with(opener);
        let result = link.open(Some("/dev/ttyUSB0"), 57_600).await;

        assert!(matches!(result, Err(BridgeError::Connection(_))));
        assert!(!link.is_open().await);
    }

    #[tokio::test]
    async fn test_both_bauds_failing_reports_connection_error() {
        let mut opener = MockPortOpener::new();
        opener.expect_open().times(2).returning(|_, _, _| open_failure());

        let link = link_with(opener);
        match link.open(Some("/dev/ttyUSB0"), DEFAULT_BAUD_RATE).await {
            Err(BridgeError::Connection(msg)) => {
                assert!(msg.contains("/dev/ttyUSB0"));
                assert!(msg.contains("device busy"));
            }
            other => panic!("Expected Connection error, got: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_no_device_found() {
        let mut opener = MockPortOpener::new();
        opener.expect_list_ports().times(1).returning(Vec::new);
        opener.expect_open().never();

        let link = link_with(opener);
        match link.open(None, DEFAULT_BAUD_RATE).await {
            Err(BridgeError::Connection(msg)) => assert_eq!(msg, "no device found"),
            other => panic!("Expected Connection error, got: {:?}", other.map(|_| ())),
        }
    }

    #[tokio::test]
    async fn test_auto_detected_port_is_opened() {
        let mut opener = MockPortOpener::new();
        opener.expect_list_ports().returning(|| {
            vec![
                PortCandidate::new("/dev/ttyS0"),
                PortCandidate::new("/dev/ttyUSB3").with_metadata(Some("CH340 serial"), None),
            ]
        });
        opener
            .expect_open()
            .with(eq("/dev/ttyUSB3"), eq(DEFAULT_BAUD_RATE), eq(READ_TIMEOUT))
            .returning(|_, _, _| Ok(MockSerialPort::new().boxed()));

        let link = link_with(opener);
        let info = link.open(None, DEFAULT_BAUD_RATE).await.unwrap();
        assert_eq!(info.path, "/dev/ttyUSB3");
    }

    #[tokio::test]
    async fn test_reopen_replaces_previous_port() {
        let mut opener = MockPortOpener::new();
        opener
            .expect_open()
            .times(2)
            .returning(|_, _, _| Ok(MockSerialPort::new().boxed()));

        let link = link_with(opener);
        link.open(Some("/dev/ttyUSB0"), DEFAULT_BAUD_RATE).await.unwrap();
        let info = link.open(Some("/dev/ttyUSB1"), DEFAULT_BAUD_RATE).await.unwrap();

        assert_eq!(link.info().await, Some(info));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let link = link_with(MockPortOpener::new());
        link.close().await;
        link.close().await;
        assert!(!link.is_open().await);
    }

    #[tokio::test]
    async fn test_guard_without_port_is_not_connected() {
        let link = link_with(MockPortOpener::new());
        let mut guard = link.lock().await;

        assert!(!guard.is_open());
        assert!(matches!(guard.port(), Err(BridgeError::NotConnected)));
    }
}
