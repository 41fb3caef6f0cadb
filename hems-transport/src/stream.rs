//! Stream accessor trait for transport layer

use async_trait::async_trait;
use hems_core::HemsResult;
use std::time::Duration;

/// Stream accessor interface to the dongle's line-oriented serial stream
///
/// The dongle speaks CRLF-terminated text lines. Implementations buffer raw
/// bytes and hand out one record at a time.
#[async_trait]
pub trait StreamAccessor: Send + Sync {
    /// Set the read deadline
    ///
    /// # Arguments
    ///
    /// * `timeout` - Maximum time a single `read_line` may block. None means infinite timeout.
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> HemsResult<()>;

    /// Current read deadline
    fn timeout(&self) -> Option<Duration>;

    /// Read one record from the stream
    ///
    /// # Returns
    ///
    /// * `Ok(Some(line))` - one `\n`-delimited record with trailing whitespace trimmed
    /// * `Ok(None)` - end of stream
    /// * `Err(HemsError::Timeout)` - nothing complete arrived before the deadline
    /// * `Err(HemsError::Connection)` - the device is gone
    async fn read_line(&mut self) -> HemsResult<Option<String>>;

    /// Write all data to the stream
    async fn write_all(&mut self, buf: &[u8]) -> HemsResult<()>;

    /// Flush any buffered output
    async fn flush(&mut self) -> HemsResult<()>;

    /// Drop everything received but not yet read
    ///
    /// Called before every command so that unsolicited events left over from
    /// an earlier exchange cannot be mistaken for the reply to the next one.
    async fn discard_pending(&mut self) -> HemsResult<()>;

    /// Check if the stream is closed
    fn is_closed(&self) -> bool;

    /// Close the stream. Closing twice is a no-op.
    async fn close(&mut self) -> HemsResult<()>;
}

/// Transport layer trait that extends StreamAccessor
#[async_trait]
pub trait TransportLayer: StreamAccessor {
    /// Open the physical layer connection
    async fn open(&mut self) -> HemsResult<()>;
}
