//! # Telemetry Monitor
//!
//! Background reader that keeps the latest telemetry snapshot published.
//!
//! The reader pulls one bounded line at a time while holding the link guard,
//! so commands wait at most one read timeout for their turn. Accepted
//! snapshots replace the published one wholesale under a write lock; readers
//! of [`MonitorState::view`] always see either the old or the new snapshot.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::Result;
use crate::serial::SerialLink;

use super::parser::parse_telemetry_line;
use super::types::TelemetrySnapshot;

/// Wait between checks while no link is open
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Back-off after a failed reader iteration
const ERROR_BACKOFF: Duration = Duration::from_millis(10);

#[derive(Debug, Default)]
struct MonitorData {
    snapshot: Option<TelemetrySnapshot>,
    raw_line: String,
    ever_observed: bool,
    monitor_requested: bool,
    updated_at: Option<DateTime<Utc>>,
}

/// Published telemetry as seen by callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryView {
    /// Last accepted snapshot, if any
    #[serde(rename = "parsed")]
    pub snapshot: Option<TelemetrySnapshot>,
    /// Last non-empty line read, parsed or not
    #[serde(rename = "raw")]
    pub raw_line: String,
    /// At least one valid snapshot has been observed
    #[serde(rename = "monitor_active")]
    pub ever_observed: bool,
    /// A monitor start/toggle was sent more recently than its stop
    pub monitor_requested: bool,
    /// When the snapshot was accepted
    pub updated_at: Option<DateTime<Utc>>,
}

/// Shared cell holding the published telemetry and monitor flags
#[derive(Debug, Default)]
pub struct MonitorState {
    inner: RwLock<MonitorData>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MonitorData> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, MonitorData> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a line read from the receiver
    ///
    /// The raw line is always kept. Lines containing a comma are parsed, and
    /// the snapshot is published only if it is a valid observation.
    ///
    /// # Returns
    ///
    /// * `bool` - Whether a new snapshot was published
    pub fn ingest_line(&self, line: &str) -> bool {
        let parsed = if line.contains(',') {
            Some(parse_telemetry_line(line))
        } else {
            None
        };

        let mut data = self.write();
        data.raw_line = line.to_string();

        match parsed {
            Some(snapshot) if snapshot.is_valid_observation() => {
                data.snapshot = Some(snapshot);
                data.ever_observed = true;
                data.updated_at = Some(Utc::now());
                true
            }
            Some(_) => {
                debug!("Discarding telemetry without version or frequency: {}", line);
                false
            }
            None => false,
        }
    }

    /// Current published state
    pub fn view(&self) -> TelemetryView {
        let data = self.read();
        TelemetryView {
            snapshot: data.snapshot.clone(),
            raw_line: data.raw_line.clone(),
            ever_observed: data.ever_observed,
            monitor_requested: data.monitor_requested,
            updated_at: data.updated_at,
        }
    }

    /// Latest accepted snapshot
    pub fn snapshot(&self) -> Option<TelemetrySnapshot> {
        self.read().snapshot.clone()
    }

    pub fn monitor_requested(&self) -> bool {
        self.read().monitor_requested
    }

    pub fn set_monitor_requested(&self, requested: bool) {
        self.write().monitor_requested = requested;
    }
}

/// Result of one reader iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// No link was open; the reader waited before returning
    Disconnected,
    /// The read timed out or produced an empty line
    Idle,
    /// A line was read; `published` tells whether it replaced the snapshot
    Line { published: bool },
}

/// Background telemetry reader
#[derive(Debug, Clone)]
pub struct TelemetryReader {
    link: Arc<SerialLink>,
    state: Arc<MonitorState>,
    idle_poll: Duration,
}

impl TelemetryReader {
    pub fn new(link: Arc<SerialLink>, state: Arc<MonitorState>) -> Self {
        Self {
            link,
            state,
            idle_poll: IDLE_POLL_INTERVAL,
        }
    }

    /// Override the wait used while no link is open
    pub fn with_idle_poll(mut self, idle_poll: Duration) -> Self {
        self.idle_poll = idle_poll;
        self
    }

    /// Spawn the reader on the tokio runtime
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Read forever; a failed iteration is logged and the loop continues
    pub async fn run(self) {
        loop {
            if let Err(e) = self.poll_once().await {
                warn!("Telemetry reader error: {}", e);
                tokio::time::sleep(ERROR_BACKOFF).await;
            }
        }
    }

    /// Perform one reader iteration
    ///
    /// # Errors
    ///
    /// Returns the underlying error if the readline fails
    pub async fn poll_once(&self) -> Result<PollOutcome> {
        let line = {
            let mut guard = self.link.lock().await;
            if !guard.is_open() {
                None
            } else {
                let timeout = self.link.read_timeout();
                Some(guard.port()?.read_line(timeout).await?)
            }
        };

        let line = match line {
            None => {
                tokio::time::sleep(self.idle_poll).await;
                return Ok(PollOutcome::Disconnected);
            }
            Some(None) => return Ok(PollOutcome::Idle),
            Some(Some(line)) if line.is_empty() => return Ok(PollOutcome::Idle),
            Some(Some(line)) => line,
        };

        debug!("Telemetry line: {}", line);
        let published = self.state.ingest_line(&line);
        Ok(PollOutcome::Line { published })
    }
}
