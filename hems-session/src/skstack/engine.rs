//! Command/response engine
//!
//! The dongle is half-duplex: one command may be outstanding at a time and its
//! reply arrives interleaved with unsolicited events on the same stream. The
//! engine owns the link behind a single lock and turns one command into one
//! well-defined outcome.
//!
//! # Exchange
//!
//! 1. Acquire the engine lock (held until the exchange is over, reads included)
//! 2. Discard stale buffered input and write the command
//! 3. Read lines, keeping every one of them, until the caller's rule says stop
//!
//! A line carrying `EVENT 29` (session lifetime exceeded) aborts any exchange
//! with [`HemsError::SessionExpired`], whatever the caller's rule says.

use crate::skstack::command::SkCommand;
use crate::skstack::line::{is_lifetime_exceeded, Line};
use crate::skstack::statistics::EngineStatistics;
use hems_core::{HemsError, HemsResult};
use hems_transport::TransportLayer;
use std::time::Duration;
use tokio::sync::Mutex;

/// Decision taken by an exchange rule for one received line
#[derive(Debug)]
pub enum Flow {
    /// Keep reading
    Continue,
    /// The exchange is complete with this line
    Done,
    /// Complete with this line, then read and drop one trailing line
    DoneWithTrailer,
    /// Abort the exchange with this error
    Fail(HemsError),
}

#[derive(Debug)]
struct EngineInner<T> {
    link: T,
    statistics: EngineStatistics,
}

impl<T: TransportLayer> EngineInner<T> {
    async fn begin(&mut self, command: &SkCommand, payload: &[u8]) -> HemsResult<()> {
        self.link.discard_pending().await?;

        log::debug!("-> {}", command);
        self.link.write_all(&command.to_bytes(payload)).await?;
        self.link.flush().await?;
        self.statistics.increment_commands_sent();
        Ok(())
    }

    async fn collect<F>(
        &mut self,
        command: &SkCommand,
        mut on_line: F,
    ) -> HemsResult<Vec<String>>
    where
        F: FnMut(&str, &Line<'_>) -> Flow + Send,
    {
        let mut lines = Vec::new();

        loop {
            let raw = match self.link.read_line().await {
                Ok(Some(raw)) => raw,
                Ok(None) => {
                    self.statistics.increment_unterminated();
                    log::debug!(
                        "{}: end of stream after {} lines without a terminating line",
                        command.name(),
                        lines.len()
                    );
                    return Ok(lines);
                }
                Err(HemsError::Timeout) => {
                    self.statistics.increment_timeouts();
                    return Err(HemsError::Timeout);
                }
                Err(e) => return Err(e),
            };

            self.statistics.increment_lines_received();
            let text = raw.trim();
            log::trace!("<- {}", text);

            if is_lifetime_exceeded(text) {
                self.statistics.increment_session_expiries();
                log::warn!("{}: session lifetime exceeded: {}", command.name(), text);
                return Err(HemsError::SessionExpired);
            }

            let line = Line::classify(text);
            if matches!(line, Line::Fail(_)) {
                self.statistics.increment_failures();
            }
            let flow = on_line(text, &line);
            lines.push(text.to_string());

            match flow {
                Flow::Continue => {}
                Flow::Done => return Ok(lines),
                Flow::DoneWithTrailer => {
                    match self.link.read_line().await {
                        Ok(Some(trailer)) => {
                            self.statistics.increment_lines_received();
                            log::debug!(
                                "{}: dropped trailing line: {}",
                                command.name(),
                                trailer.trim()
                            );
                        }
                        Ok(None) | Err(HemsError::Timeout) => {}
                        Err(e) => return Err(e),
                    }
                    return Ok(lines);
                }
                Flow::Fail(error) => return Err(error),
            }
        }
    }
}

/// Serialises every command on the dongle link
///
/// All methods take `&self`; the internal lock is held for the full duration
/// of each call, so concurrent callers queue up instead of interleaving on the
/// wire.
#[derive(Debug)]
pub struct CommandEngine<T: TransportLayer> {
    inner: Mutex<EngineInner<T>>,
}

impl<T: TransportLayer> CommandEngine<T> {
    /// Create an engine over an unopened link
    pub fn new(link: T) -> Self {
        Self {
            inner: Mutex::new(EngineInner {
                link,
                statistics: EngineStatistics::new(),
            }),
        }
    }

    /// Open the link and drop anything the device printed before we listened
    pub async fn open(&self) -> HemsResult<()> {
        let mut inner = self.inner.lock().await;
        inner.link.open().await?;
        inner.link.discard_pending().await
    }

    /// Close the link. Closing twice is a no-op.
    pub async fn close(&self) -> HemsResult<()> {
        let mut inner = self.inner.lock().await;
        inner.link.close().await
    }

    pub async fn is_closed(&self) -> bool {
        self.inner.lock().await.link.is_closed()
    }

    /// Change the per-read deadline of the link
    pub async fn set_read_timeout(&self, timeout: Option<Duration>) -> HemsResult<()> {
        self.inner.lock().await.link.set_timeout(timeout).await
    }

    pub async fn read_timeout(&self) -> Option<Duration> {
        self.inner.lock().await.link.timeout()
    }

    /// Snapshot of the engine counters
    pub async fn statistics(&self) -> EngineStatistics {
        self.inner.lock().await.statistics.clone()
    }

    /// Write a command without waiting for any reply
    pub async fn write_command(&self, command: &SkCommand) -> HemsResult<()> {
        let mut inner = self.inner.lock().await;
        inner.begin(command, &[]).await
    }

    /// Send a command and read until a line starts with `terminal_prefix`
    ///
    /// # Returns
    /// Every line read, in order, up to and including the terminating one. If
    /// the stream ends first, the lines read so far; the caller decides
    /// whether a missing terminator is a failure.
    ///
    /// # Errors
    /// - `HemsError::SessionExpired` on an `EVENT 29` line
    /// - `HemsError::RequestFailed(code)` on a `FAIL <code>` line
    /// - `HemsError::Timeout` / `HemsError::Connection` from the link
    pub async fn send_and_await(
        &self,
        command: &SkCommand,
        terminal_prefix: &str,
    ) -> HemsResult<Vec<String>> {
        self.send_payload_and_await(command, &[], terminal_prefix)
            .await
    }

    /// Like [`send_and_await`](Self::send_and_await), with raw bytes after the command text
    ///
    /// Used by `SKSENDTO`, whose datagram payload follows the header verbatim.
    pub async fn send_payload_and_await(
        &self,
        command: &SkCommand,
        payload: &[u8],
        terminal_prefix: &str,
    ) -> HemsResult<Vec<String>> {
        let mut inner = self.inner.lock().await;
        inner.begin(command, payload).await?;
        inner
            .collect(command, |text, line| match line {
                Line::Fail(code) => Flow::Fail(HemsError::RequestFailed(code.clone())),
                _ if text.starts_with(terminal_prefix) => Flow::Done,
                _ => Flow::Continue,
            })
            .await
    }

    /// Send a command and let `on_line` decide when the exchange is over
    ///
    /// `on_line` sees every line except a session-lifetime event, which
    /// always aborts the exchange.
    pub async fn send_and_scan<F>(
        &self,
        command: &SkCommand,
        on_line: F,
    ) -> HemsResult<Vec<String>>
    where
        F: FnMut(&str, &Line<'_>) -> Flow + Send,
    {
        let mut inner = self.inner.lock().await;
        inner.begin(command, &[]).await?;
        inner.collect(command, on_line).await
    }

    /// Like [`send_and_scan`](Self::send_and_scan), with its own read deadline
    ///
    /// The link waits up to `read_timeout` for each line of this exchange
    /// instead of its usual deadline. The usual deadline is restored before
    /// returning, whatever the outcome.
    pub async fn send_and_scan_within<F>(
        &self,
        command: &SkCommand,
        read_timeout: Duration,
        on_line: F,
    ) -> HemsResult<Vec<String>>
    where
        F: FnMut(&str, &Line<'_>) -> Flow + Send,
    {
        let mut inner = self.inner.lock().await;
        let previous = inner.link.timeout();
        inner.link.set_timeout(Some(read_timeout)).await?;

        let result = match inner.begin(command, &[]).await {
            Ok(()) => inner.collect(command, on_line).await,
            Err(e) => Err(e),
        };
        let restored = inner.link.set_timeout(previous).await;

        let lines = result?;
        restored?;
        Ok(lines)
    }
}
