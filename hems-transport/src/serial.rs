//! Serial port transport implementation

use crate::line::LineBuffer;
use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use hems_core::{HemsError, HemsResult};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::time::Instant;
use tokio_serial::{ClearBuffer, SerialPort, SerialPortBuilderExt, SerialStream};

/// Baud rate of the BP35C0/BP35C2 UART
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Read deadline used unless the caller ties it to its own timeout
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

const READ_CHUNK_SIZE: usize = 512;

/// Wrapper for SerialStream that implements Debug
struct DebugSerialStream(SerialStream);

impl fmt::Debug for DebugSerialStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialStream").finish()
    }
}

impl Deref for DebugSerialStream {
    type Target = SerialStream;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DebugSerialStream {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Serial port transport layer settings
#[derive(Debug, Clone)]
pub struct SerialSettings {
    pub port_name: String,
    pub baud_rate: u32,
    pub data_bits: tokio_serial::DataBits,
    pub stop_bits: tokio_serial::StopBits,
    pub parity: tokio_serial::Parity,
    pub flow_control: tokio_serial::FlowControl,
    pub timeout: Option<Duration>,
}

impl SerialSettings {
    /// Create new serial settings with default parameters (8N1, no flow control)
    pub fn new(port_name: String, baud_rate: u32) -> Self {
        Self::with_timeout(port_name, baud_rate, DEFAULT_READ_TIMEOUT)
    }

    /// Create serial settings with timeout
    pub fn with_timeout(port_name: String, baud_rate: u32, timeout: Duration) -> Self {
        Self {
            port_name,
            baud_rate,
            data_bits: tokio_serial::DataBits::Eight,
            stop_bits: tokio_serial::StopBits::One,
            parity: tokio_serial::Parity::None,
            flow_control: tokio_serial::FlowControl::None,
            timeout: Some(timeout),
        }
    }

    /// Default device path for the platform
    ///
    /// The dongle enumerates as a CDC-ACM modem.
    pub fn default_port_name() -> &'static str {
        if cfg!(target_os = "macos") {
            "/dev/tty.usbmodem14101"
        } else {
            "/dev/ttyACM0"
        }
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self::new(Self::default_port_name().to_string(), DEFAULT_BAUD_RATE)
    }
}

/// Serial port transport layer implementation
#[derive(Debug)]
pub struct SerialTransport {
    stream: Option<DebugSerialStream>,
    settings: SerialSettings,
    lines: LineBuffer,
    closed: bool,
}

impl SerialTransport {
    /// Create a new serial transport layer
    pub fn new(settings: SerialSettings) -> Self {
        Self {
            stream: None,
            settings,
            lines: LineBuffer::new(),
            closed: true,
        }
    }

    /// Create serial transport with port name and baud rate
    pub fn new_simple(port_name: String, baud_rate: u32) -> Self {
        Self::new(SerialSettings::new(port_name, baud_rate))
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    fn stream_mut(&mut self) -> HemsResult<&mut DebugSerialStream> {
        self.stream.as_mut().ok_or_else(|| {
            HemsError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Serial stream not connected",
            ))
        })
    }
}

#[async_trait]
impl TransportLayer for SerialTransport {
    async fn open(&mut self) -> HemsResult<()> {
        if !self.closed {
            return Err(HemsError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }

        let builder = tokio_serial::new(&self.settings.port_name, self.settings.baud_rate)
            .data_bits(self.settings.data_bits)
            .stop_bits(self.settings.stop_bits)
            .parity(self.settings.parity)
            .flow_control(self.settings.flow_control);

        let stream = builder.open_native_async().map_err(|e| {
            HemsError::Connection(std::io::Error::other(format!(
                "Failed to open serial port {}: {}",
                self.settings.port_name, e
            )))
        })?;

        log::debug!(
            "opened {} at {} baud",
            self.settings.port_name,
            self.settings.baud_rate
        );
        self.stream = Some(DebugSerialStream(stream));
        self.lines.clear();
        self.closed = false;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for SerialTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> HemsResult<()> {
        self.settings.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.settings.timeout
    }

    async fn read_line(&mut self) -> HemsResult<Option<String>> {
        let deadline = self.settings.timeout.map(|t| Instant::now() + t);
        let mut chunk = [0u8; READ_CHUNK_SIZE];

        loop {
            if let Some(line) = self.lines.next_line() {
                log::trace!("<- {}", line);
                return Ok(Some(line));
            }

            let stream = self.stream_mut()?;
            let result = match deadline {
                Some(deadline) => tokio::time::timeout_at(deadline, stream.read(&mut chunk))
                    .await
                    .map_err(|_| HemsError::Timeout)?,
                None => stream.read(&mut chunk).await,
            };

            match result {
                Ok(0) => {
                    self.closed = true;
                    return Ok(self.lines.take_remainder());
                }
                Ok(n) => self.lines.extend(&chunk[..n]),
                Err(e) => {
                    self.closed = true;
                    return Err(HemsError::Connection(e));
                }
            }
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> HemsResult<()> {
        let timeout = self.settings.timeout;
        let stream = self.stream_mut()?;

        if let Some(timeout) = timeout {
            tokio::time::timeout(timeout, stream.write_all(buf))
                .await
                .map_err(|_| HemsError::Timeout)?
                .map_err(HemsError::Connection)
        } else {
            stream.write_all(buf).await.map_err(HemsError::Connection)
        }
    }

    async fn flush(&mut self) -> HemsResult<()> {
        let stream = self.stream_mut()?;
        stream.flush().await.map_err(HemsError::Connection)
    }

    async fn discard_pending(&mut self) -> HemsResult<()> {
        let dropped = self.lines.len();
        self.lines.clear();
        let stream = self.stream_mut()?;
        stream
            .clear(ClearBuffer::All)
            .map_err(|e| HemsError::Connection(e.into()))?;
        if dropped > 0 {
            log::debug!("discarded {} buffered bytes", dropped);
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> HemsResult<()> {
        if let Some(mut stream) = self.stream.take() {
            let _ = stream.flush().await;
            log::debug!("closed {}", self.settings.port_name);
        }
        self.lines.clear();
        self.closed = true;
        Ok(())
    }
}
