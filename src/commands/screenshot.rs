//! # Screen Capture
//!
//! Bulk transfer of the receiver's display as a hex-encoded BMP.
//!
//! The receiver answers the `C` command with a multi-line hex stream and no
//! length header or end marker. The stream is accumulated until the time
//! budget runs out or the accumulated text exceeds the size cap, then decoded.
//! The link stays held for the whole capture so the telemetry reader cannot
//! consume hex lines.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{BridgeError, Result};
use crate::serial::SerialLink;

use super::{write_command, SCREENSHOT_COMMAND};

/// Default wall-clock budget for one capture
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default cap on accumulated hex characters
pub const DEFAULT_MAX_HEX_BYTES: usize = 10_000_000;

/// Bounds for a capture
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenshotOptions {
    /// Stop accumulating after this long
    pub timeout: Duration,
    /// Stop accumulating once more than this many hex characters arrived
    pub max_hex_bytes: usize,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CAPTURE_TIMEOUT,
            max_hex_bytes: DEFAULT_MAX_HEX_BYTES,
        }
    }
}

/// A decoded screen capture
#[derive(Debug, Clone, PartialEq)]
pub struct Screenshot {
    data: Vec<u8>,
    captured_at: DateTime<Utc>,
}

impl Screenshot {
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            captured_at: Utc::now(),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    /// Whether the payload starts with the BMP magic
    pub fn is_bitmap(&self) -> bool {
        self.data.starts_with(b"BM")
    }

    /// e.g. `screenshot_20240131_154502.bmp`
    pub fn default_file_name(&self) -> String {
        format!("screenshot_{}.bmp", self.captured_at.format("%Y%m%d_%H%M%S"))
    }

    /// Write the image into `dir` under its default file name
    ///
    /// # Returns
    ///
    /// * `Result<PathBuf>` - Path of the written file
    pub fn save_in<P: AsRef<Path>>(&self, dir: P) -> Result<PathBuf> {
        let path = dir.as_ref().join(self.default_file_name());
        self.save(&path)?;
        Ok(path)
    }

    /// Write the image to `path`
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path.as_ref(), &self.data)?;
        info!(
            "Screenshot saved to {} ({} bytes)",
            path.as_ref().display(),
            self.data.len()
        );
        Ok(())
    }
}

/// Decode an accumulated hex stream, ignoring line terminators
///
/// # Errors
///
/// Returns `Protocol` if the stream is empty, has odd length, or contains
/// non-hex characters
///
/// # Examples
///
/// ```
/// use ats_bridge::commands::decode_hex_stream;
///
/// assert_eq!(decode_hex_stream("4865\r\n6C6C6F\n").unwrap(), b"Hello");
/// assert!(decode_hex_stream("486").is_err());
/// ```
pub fn decode_hex_stream(text: &str) -> Result<Vec<u8>> {
    let hex_text: String = text.chars().filter(|c| !matches!(c, '\r' | '\n')).collect();

    if hex_text.is_empty() {
        return Err(BridgeError::Protocol("empty screenshot stream".to_string()));
    }

    hex::decode(&hex_text)
        .map_err(|e| BridgeError::Protocol(format!("malformed screenshot stream: {}", e)))
}

/// Trigger a capture and decode the streamed image
///
/// # Errors
///
/// - `NotConnected` if no link is open
/// - `Serial` if the trigger cannot be written or the stream read fails
/// - `Protocol` if the received stream is not valid hex
pub async fn capture_screenshot(link: &SerialLink, options: ScreenshotOptions) -> Result<Screenshot> {
    let mut guard = link.lock().await;
    let port = guard.port()?;

    write_command(port, SCREENSHOT_COMMAND).await?;

    let deadline = Instant::now() + options.timeout;
    let read_timeout = link.read_timeout();
    let mut chunks: Vec<String> = Vec::new();
    let mut received = 0usize;

    loop {
        let now = Instant::now();
        if now >= deadline {
            debug!("Screenshot time budget reached after {} hex chars", received);
            break;
        }

        let line = port
            .read_line(read_timeout.min(deadline - now))
            .await
            .map_err(|e| BridgeError::Serial(format!("Failed to read screenshot stream: {}", e)))?;

        if let Some(line) = line.filter(|l| !l.is_empty()) {
            received += line.len();
            chunks.push(line);
            if received > options.max_hex_bytes {
                warn!(
                    "Screenshot stream exceeded {} hex chars, stopping",
                    options.max_hex_bytes
                );
                break;
            }
        }
    }
    drop(guard);

    let screenshot = Screenshot::new(decode_hex_stream(&chunks.concat())?);
    if !screenshot.is_bitmap() {
        warn!("Screenshot payload does not start with a BMP header");
    }
    info!("Captured screenshot ({} bytes)", screenshot.len());

    Ok(screenshot)
}
