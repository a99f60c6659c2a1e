//! # Command Channel
//!
//! Request/response exchanges with the receiver.
//!
//! A command holds the link for its whole exchange: stale input is
//! discarded, the command is written, and non-empty response lines are
//! collected until enough have arrived or the timeout passes. The receiver
//! makes no promise about how many lines a command produces, so a short or
//! empty response is returned as-is rather than treated as an error.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use crate::serial::{SerialLink, SerialPortIO};

pub mod screenshot;

pub use screenshot::{capture_screenshot, decode_hex_stream, Screenshot, ScreenshotOptions};

/// Toggles monitor mode (continuous telemetry) on the receiver
pub const MONITOR_TOGGLE_COMMAND: &str = "t";

/// Lists the receiver's memory slots
pub const MEMORY_SLOTS_COMMAND: &str = "$";

/// Starts a hex-encoded screen dump
pub const SCREENSHOT_COMMAND: &str = "C";

/// Terminate `command` with exactly one newline
///
/// ```
/// use ats_bridge::commands::normalize_command;
///
/// assert_eq!(normalize_command("t"), "t\n");
/// assert_eq!(normalize_command("t\r\n\n"), "t\n");
/// ```
pub fn normalize_command(command: &str) -> String {
    format!("{}\n", command.trim_end_matches(['\r', '\n']))
}

/// Remove every CR and LF from user-typed console input
pub fn sanitize_console_input(input: &str) -> String {
    input.chars().filter(|c| !matches!(c, '\r' | '\n')).collect()
}

/// Send a command and collect its response
///
/// # Arguments
///
/// * `link` - Serial link to the receiver
/// * `command` - Command text; a trailing newline is added if missing
/// * `expected_lines` - Stop after this many non-empty lines (0 sends without reading)
/// * `timeout` - Overall bound on response collection
///
/// # Returns
///
/// * `Result<Vec<String>>` - Response lines in arrival order, possibly fewer than expected
///
/// # Errors
///
/// Returns `NotConnected` if no link is open, or `Serial` if the write fails
pub async fn send_command(
    link: &SerialLink,
    command: &str,
    expected_lines: usize,
    timeout: Duration,
) -> Result<Vec<String>> {
    let mut guard = link.lock().await;
    let port = guard.port()?;

    write_command(port, command).await?;
    let lines = collect_lines(port, expected_lines, timeout, link.read_timeout()).await;

    debug!("Command {:?} -> {} line(s)", command.trim_end(), lines.len());
    Ok(lines)
}

/// Discard stale input and write a normalized command
pub(crate) async fn write_command(port: &mut dyn SerialPortIO, command: &str) -> Result<()> {
    port.clear_input()
        .map_err(|e| BridgeError::Serial(format!("Failed to clear input: {}", e)))?;

    port.write_all(normalize_command(command).as_bytes())
        .await
        .map_err(|e| BridgeError::Serial(format!("Failed to write command: {}", e)))?;

    port.flush()
        .await
        .map_err(|e| BridgeError::Serial(format!("Failed to flush serial port: {}", e)))?;

    Ok(())
}

/// Collect up to `expected_lines` non-empty lines within `timeout`
///
/// A read error ends collection early and keeps what was gathered.
async fn collect_lines(
    port: &mut dyn SerialPortIO,
    expected_lines: usize,
    timeout: Duration,
    read_timeout: Duration,
) -> Vec<String> {
    let deadline = Instant::now() + timeout;
    let mut lines = Vec::new();

    while lines.len() < expected_lines {
        let now = Instant::now();
        if now >= deadline {
            break;
        }

        match port.read_line(read_timeout.min(deadline - now)).await {
            Ok(Some(line)) if !line.is_empty() => lines.push(line),
            Ok(_) => continue,
            Err(e) => {
                warn!("Read failed while collecting response: {}", e);
                break;
            }
        }
    }

    lines
}
