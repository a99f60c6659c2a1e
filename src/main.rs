//! # ATS Bridge
//!
//! Serial bridge for ATS-MINI receivers.
//!
//! Opens the receiver's USB console, keeps the latest monitor-mode telemetry
//! published, and logs it until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::time::{interval, Duration};
use tracing::{debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use ats_bridge::bridge::RadioBridge;
use ats_bridge::config::{Config, LoggingConfig};
use ats_bridge::serial::TokioSerialOpener;
use ats_bridge::telemetry::TelemetrySnapshot;

/// Configuration file used when none is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// How often the published telemetry is checked
const STATUS_POLL: Duration = Duration::from_secs(1);

/// Unchanged telemetry is re-logged after this many polls
const STATUS_REPEAT_POLLS: u32 = 5;

/// ATS Bridge
///
/// Serial bridge for ATS-MINI receivers
#[derive(Parser, Debug)]
#[command(name = "ats-bridge")]
#[command(version)]
#[command(about = "Serial bridge for ATS-MINI receivers")]
struct Cli {
    /// Configuration file (default: config/default.toml if present)
    #[arg(env = "ATS_CONFIG")]
    config: Option<PathBuf>,

    /// Serial device path; auto-detected when omitted
    #[arg(short, long, env = "ATS_PORT")]
    port: Option<String>,

    /// Baud rate; 115200 falls back to 9600 if it cannot be opened
    #[arg(short, long, env = "ATS_BAUD")]
    baud: Option<String>,

    /// Capture one screenshot into screenshot.output_dir and exit
    #[arg(long)]
    screenshot: bool,
}

/// Main entry point for ATS Bridge
///
/// # Control Flow
///
/// 1. Load configuration (argument / `ATS_CONFIG`, or `config/default.toml`)
///    and apply `--port` / `--baud` (`ATS_PORT` / `ATS_BAUD`)
/// 2. Initialise logging
/// 3. Open the serial link, falling back to 9600 baud if 115200 fails
/// 4. With `--screenshot`: capture the display, save it, and exit
/// 5. Otherwise spawn the telemetry reader and log telemetry until Ctrl+C
///
/// # Errors
///
/// Returns error if configuration is invalid or no receiver can be opened
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let _log_guard = init_logging(&config.logging);

    info!("ATS Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let bridge = RadioBridge::new(Box::new(TokioSerialOpener), config.bridge_settings());

    let link = match bridge.open_link(config.port(), config.serial.baud_rate).await {
        Ok(link) => link,
        Err(e) => {
            error!("Could not open serial: {}", e);
            error!("Pass --port, set ATS_PORT, or set serial.port in the config file");
            return Err(e.into());
        }
    };
    info!("Connected to {} @ {}", link.path, link.baud_rate);

    if cli.screenshot {
        let screenshot = bridge.capture_screenshot().await?;
        let path = screenshot.save_in(&config.screenshot.output_dir)?;
        info!("Screenshot written to {}", path.display());
        bridge.close_link().await;
        return Ok(());
    }

    let reader = bridge.spawn_reader();
    info!("Monitor reader started. Press Ctrl+C to exit");

    let mut status_interval = interval(STATUS_POLL);
    let mut last_summary = String::new();
    let mut polls_since_log = 0u32;

    loop {
        tokio::select! {
            _ = status_interval.tick() => {
                let view = bridge.telemetry();
                polls_since_log += 1;

                let Some(snapshot) = view.snapshot.as_ref() else {
                    if polls_since_log >= STATUS_REPEAT_POLLS {
                        debug!("No telemetry yet (last line: {:?})", view.raw_line);
                        polls_since_log = 0;
                    }
                    continue;
                };

                let summary = summarize(snapshot);
                if summary != last_summary || polls_since_log >= STATUS_REPEAT_POLLS {
                    info!("{}", summary);
                    if let Ok(json) = serde_json::to_string(&view) {
                        debug!("Telemetry: {}", json);
                    }
                    last_summary = summary;
                    polls_since_log = 0;
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down...");
                break;
            }
        }
    }

    reader.abort();
    bridge.close_link().await;

    Ok(())
}

/// Load configuration and apply command-line serial overrides
fn load_config(cli: &Cli) -> Result<Config> {
    let path = cli.config.clone().or_else(|| {
        let default = PathBuf::from(DEFAULT_CONFIG_PATH);
        default.exists().then_some(default)
    });

    let mut config = match path {
        Some(path) => Config::load(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };
    config
        .apply_overrides(cli.port.as_deref(), cli.baud.as_deref())
        .context("Invalid serial override")?;

    Ok(config)
}

/// Set up stdout logging, plus a daily rolling file when `log_dir` is set
///
/// The returned guard must stay alive for file logs to be flushed.
fn init_logging(logging: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    let (file_layer, guard) = if logging.log_dir.is_empty() {
        (None, None)
    } else {
        let appender = tracing_appender::rolling::daily(&logging.log_dir, "ats-bridge.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        (
            Some(fmt::layer().with_writer(writer).with_ansi(false)),
            Some(guard),
        )
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(file_layer)
        .init();

    guard
}

/// One-line human summary of a snapshot
fn summarize(snapshot: &TelemetrySnapshot) -> String {
    format!(
        "{} {} {} | RSSI {} | SNR {} | vol {}",
        snapshot.band_name.as_deref().unwrap_or("-"),
        snapshot.mode.as_deref().unwrap_or("-"),
        snapshot.frequency,
        snapshot.rssi.as_deref().unwrap_or("-"),
        snapshot.snr.as_deref().unwrap_or("-"),
        snapshot
            .volume
            .map(|v| v.to_string())
            .unwrap_or_else(|| "-".to_string()),
    )
}
