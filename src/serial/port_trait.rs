//! Trait abstraction for serial port operations to enable testing

use async_trait::async_trait;
use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::Instant;

use crate::error::{BridgeError, Result};

use super::discovery::PortCandidate;

/// Upper bound on a buffered partial line before it is discarded
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Size of a single low-level read
const READ_CHUNK_SIZE: usize = 512;

/// Trait for line-oriented serial port I/O
#[async_trait]
pub trait SerialPortIO: Send {
    /// Read one newline-terminated line, waiting at most `timeout`.
    ///
    /// Returns `Ok(None)` when no complete line arrived in time. The returned
    /// line is trimmed and may be empty.
    async fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>>;

    /// Write all data to the port
    async fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Flush the output buffer
    async fn flush(&mut self) -> io::Result<()>;

    /// Discard stale input, both in the OS buffer and any buffered partial line
    fn clear_input(&mut self) -> io::Result<()>;
}

/// Opens transports and enumerates candidate devices
#[cfg_attr(test, mockall::automock)]
pub trait PortOpener: Send + Sync {
    /// Enumerate serial-capable devices on the host
    fn list_ports(&self) -> Vec<PortCandidate>;

    /// Open `path` at `baud_rate`, bounding each low-level read by `read_timeout`
    fn open(
        &self,
        path: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialPortIO>>;
}

/// Wrapper around tokio_serial::SerialStream that implements SerialPortIO
pub struct TokioSerialPort {
    port: tokio_serial::SerialStream,
    pending: BytesMut,
}

impl TokioSerialPort {
    pub fn new(port: tokio_serial::SerialStream) -> Self {
        Self {
            port,
            pending: BytesMut::with_capacity(READ_CHUNK_SIZE),
        }
    }
}

fn take_line(pending: &mut BytesMut) -> Option<String> {
    let pos = pending.iter().position(|&b| b == b'\n')?;
    let line = pending.split_to(pos + 1);
    Some(String::from_utf8_lossy(&line).trim().to_string())
}

/// Read one line from `reader`, buffering partial input in `pending`
///
/// End of stream (a hung-up USB device) waits out the rest of `timeout`
/// before returning `None`, so the read stays bounded without spinning.
async fn read_buffered_line<R>(
    reader: &mut R,
    pending: &mut BytesMut,
    timeout: Duration,
) -> io::Result<Option<String>>
where
    R: AsyncRead + Unpin,
{
    let deadline = Instant::now() + timeout;
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        if let Some(line) = take_line(pending) {
            return Ok(Some(line));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(None);
        }

        match tokio::time::timeout(deadline - now, reader.read(&mut chunk)).await {
            Ok(Ok(0)) => {
                tokio::time::sleep_until(deadline).await;
                return Ok(None);
            }
            Ok(Ok(n)) => {
                pending.extend_from_slice(&chunk[..n]);
                if pending.len() > MAX_PENDING_BYTES && !pending.contains(&b'\n') {
                    tracing::warn!("Dropping {} bytes of unterminated input", pending.len());
                    pending.clear();
                }
            }
            Ok(Err(e)) if e.kind() == io::ErrorKind::TimedOut => return Ok(None),
            Ok(Err(e)) => return Err(e),
            Err(_elapsed) => return Ok(None),
        }
    }
}

#[async_trait]
impl SerialPortIO for TokioSerialPort {
    async fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        read_buffered_line(&mut self.port, &mut self.pending, timeout).await
    }

    async fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.write_all(data).await
    }

    async fn flush(&mut self) -> io::Result<()> {
        use tokio::io::AsyncWriteExt;
        self.port.flush().await
    }

    fn clear_input(&mut self) -> io::Result<()> {
        use tokio_serial::SerialPort;
        self.pending.clear();
        self.port
            .clear(tokio_serial::ClearBuffer::Input)
            .map_err(io::Error::from)
    }
}

/// Production opener backed by `tokio-serial`
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSerialOpener;

impl PortOpener for TokioSerialOpener {
    fn list_ports(&self) -> Vec<PortCandidate> {
        match tokio_serial::available_ports() {
            Ok(ports) => ports.into_iter().map(PortCandidate::from).collect(),
            Err(e) => {
                tracing::warn!("Failed to enumerate serial ports: {}", e);
                Vec::new()
            }
        }
    }

    fn open(
        &self,
        path: &str,
        baud_rate: u32,
        read_timeout: Duration,
    ) -> Result<Box<dyn SerialPortIO>> {
        use tokio_serial::SerialPortBuilderExt;

        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(read_timeout)
            .open_native_async()
            .map_err(|e| {
                BridgeError::Connection(format!("Failed to open {}@{}: {}", path, baud_rate, e))
            })?;

        Ok(Box::new(TokioSerialPort::new(port)))
    }
}
