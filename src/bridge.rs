//! # Radio Bridge
//!
//! Owned context tying the link, the published telemetry and the command
//! helpers together. This is the surface an HTTP or CLI front end calls.
//!
//! ```no_run
//! use ats_bridge::bridge::{BridgeSettings, RadioBridge};
//! use ats_bridge::serial::TokioSerialOpener;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let bridge = RadioBridge::new(Box::new(TokioSerialOpener), BridgeSettings::default());
//!     bridge.open_link(None, 115_200).await?;
//!     let _reader = bridge.spawn_reader();
//!
//!     let slots = bridge.list_memory_slots().await?;
//!     println!("{} memory slots", slots.len());
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::info;

use crate::commands::{
    self, capture_screenshot, Screenshot, ScreenshotOptions, MEMORY_SLOTS_COMMAND,
    MONITOR_TOGGLE_COMMAND,
};
use crate::error::{BridgeError, Result};
use crate::serial::{LinkInfo, LinkSettings, PortOpener, SerialLink};
use crate::telemetry::{MonitorState, TelemetryReader, TelemetryView};

/// Response bounds for one kind of command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseWindow {
    pub lines: usize,
    pub timeout: Duration,
}

impl ResponseWindow {
    pub const fn new(lines: usize, timeout_ms: u64) -> Self {
        Self {
            lines,
            timeout: Duration::from_millis(timeout_ms),
        }
    }
}

/// Tunables for the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSettings {
    pub link: LinkSettings,
    /// Free-form console commands
    pub console: ResponseWindow,
    /// Monitor toggle acknowledgement
    pub toggle: ResponseWindow,
    /// Memory slot listing
    pub memory_slots: ResponseWindow,
    pub screenshot: ScreenshotOptions,
    /// Reader wait while no link is open
    pub idle_poll: Duration,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        Self {
            link: LinkSettings::default(),
            console: ResponseWindow::new(4, 100),
            toggle: ResponseWindow::new(1, 100),
            memory_slots: ResponseWindow::new(30, 400),
            screenshot: ScreenshotOptions::default(),
            idle_poll: crate::telemetry::monitor::IDLE_POLL_INTERVAL,
        }
    }
}

/// Result of a console command
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct ConsoleResponse {
    /// Command as sent, with CR/LF removed
    pub sent: String,
    #[serde(rename = "response_lines")]
    pub lines: Vec<String>,
}

/// Bridge between callers and one ATS-MINI receiver
pub struct RadioBridge {
    link: Arc<SerialLink>,
    state: Arc<MonitorState>,
    settings: BridgeSettings,
    last_open: Mutex<Option<(Option<String>, u32)>>,
}

impl RadioBridge {
    pub fn new(opener: Box<dyn PortOpener>, settings: BridgeSettings) -> Self {
        Self {
            link: Arc::new(SerialLink::new(opener, settings.link)),
            state: Arc::new(MonitorState::new()),
            settings,
            last_open: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    pub fn link(&self) -> &Arc<SerialLink> {
        &self.link
    }

    pub fn state(&self) -> &Arc<MonitorState> {
        &self.state
    }

    /// Open the link, auto-detecting the device when `path` is `None`
    pub async fn open_link(&self, path: Option<&str>, baud_rate: u32) -> Result<LinkInfo> {
        let info = self.link.open(path, baud_rate).await?;
        *self.last_open.lock().await = Some((path.map(str::to_string), baud_rate));
        Ok(info)
    }

    /// Reopen with the arguments of the last successful `open_link`
    ///
    /// # Errors
    ///
    /// Returns `NotConnected` if the link was never opened
    pub async fn reconnect(&self) -> Result<LinkInfo> {
        let last = self.last_open.lock().await.clone();
        let (path, baud_rate) = last.ok_or(BridgeError::NotConnected)?;
        info!("Reconnecting serial link");
        self.link.open(path.as_deref(), baud_rate).await
    }

    pub async fn close_link(&self) {
        self.link.close().await;
    }

    pub async fn link_info(&self) -> Option<LinkInfo> {
        self.link.info().await
    }

    /// Start the background telemetry reader
    pub fn spawn_reader(&self) -> JoinHandle<()> {
        TelemetryReader::new(self.link.clone(), self.state.clone())
            .with_idle_poll(self.settings.idle_poll)
            .spawn()
    }

    /// Send a command and collect up to `expected_lines` within `timeout`
    pub async fn send_command(
        &self,
        command: &str,
        expected_lines: usize,
        timeout: Duration,
    ) -> Result<Vec<String>> {
        commands::send_command(&self.link, command, expected_lines, timeout).await
    }

    /// Send user-typed console input with the console response window
    pub async fn console_command(&self, input: &str) -> Result<ConsoleResponse> {
        let sent = commands::sanitize_console_input(input);
        let window = self.settings.console;
        let lines = self.send_command(&sent, window.lines, window.timeout).await?;
        Ok(ConsoleResponse { sent, lines })
    }

    /// Send the monitor toggle and flip the local "requested" flag
    ///
    /// # Returns
    ///
    /// * `Result<bool>` - The new value of the flag
    pub async fn toggle_monitor(&self) -> Result<bool> {
        self.send_monitor_toggle().await?;
        let requested = !self.state.monitor_requested();
        self.state.set_monitor_requested(requested);
        Ok(requested)
    }

    /// Send the monitor toggle and mark monitoring as requested
    pub async fn start_monitor(&self) -> Result<()> {
        self.send_monitor_toggle().await?;
        self.state.set_monitor_requested(true);
        Ok(())
    }

    /// Send the monitor toggle and mark monitoring as not requested
    pub async fn stop_monitor(&self) -> Result<()> {
        self.send_monitor_toggle().await?;
        self.state.set_monitor_requested(false);
        Ok(())
    }

    async fn send_monitor_toggle(&self) -> Result<Vec<String>> {
        let window = self.settings.toggle;
        self.send_command(MONITOR_TOGGLE_COMMAND, window.lines, window.timeout)
            .await
    }

    /// Current published telemetry; never touches the link
    pub fn telemetry(&self) -> TelemetryView {
        self.state.view()
    }

    /// List the receiver's memory slots
    pub async fn list_memory_slots(&self) -> Result<Vec<String>> {
        let window = self.settings.memory_slots;
        self.send_command(MEMORY_SLOTS_COMMAND, window.lines, window.timeout)
            .await
    }

    /// Capture the receiver's screen with the configured bounds
    pub async fn capture_screenshot(&self) -> Result<Screenshot> {
        capture_screenshot(&self.link, self.settings.screenshot).await
    }
}
