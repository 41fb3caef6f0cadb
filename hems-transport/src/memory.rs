//! Scripted in-process dongle
//!
//! [`MemoryTransport`] answers command lines from a reply table instead of a
//! serial port. It is used by the tests of every layer above the transport and
//! for dry runs without hardware.
//!
//! ```rust
//! use hems_transport::{MemoryTransport, StreamAccessor, TransportLayer};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mut dongle = MemoryTransport::new().on("SKVER", ["EVER 1.2.10", "OK"]);
//! dongle.open().await.unwrap();
//! dongle.write_all(b"SKVER\r\n").await.unwrap();
//! assert_eq!(dongle.read_line().await.unwrap().as_deref(), Some("EVER 1.2.10"));
//! # }
//! ```

use crate::line::LineBuffer;
use crate::stream::{StreamAccessor, TransportLayer};
use async_trait::async_trait;
use hems_core::{HemsError, HemsResult};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// What `read_line` does when no scripted line is waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DrainBehavior {
    /// Report end of stream
    #[default]
    EndOfStream,
    /// Fail with `HemsError::Timeout` immediately
    Timeout,
    /// Block like a silent device: until the read deadline if one is set, forever otherwise
    Stall,
    /// Report end of stream and mark the link closed, like a device that was unplugged
    HangUp,
}

#[derive(Debug)]
struct Rule {
    prefix: String,
    replies: VecDeque<Vec<String>>,
    sticky: Option<Vec<String>>,
}

#[derive(Debug, Default)]
struct Script {
    rules: Vec<Rule>,
    pending: VecDeque<String>,
    written: Vec<String>,
    partial: LineBuffer,
    opens: usize,
    closes: usize,
}

impl Script {
    fn add(&mut self, prefix: &str, lines: Vec<String>, sticky: bool) {
        let index = match self.rules.iter().position(|r| r.prefix == prefix) {
            Some(index) => index,
            None => {
                self.rules.push(Rule {
                    prefix: prefix.to_string(),
                    replies: VecDeque::new(),
                    sticky: None,
                });
                self.rules.len() - 1
            }
        };
        let rule = &mut self.rules[index];
        if sticky {
            rule.sticky = Some(lines);
        } else {
            rule.replies.push_back(lines);
        }
    }

    fn respond(&mut self, line: &str) {
        let reply = self
            .rules
            .iter_mut()
            .filter(|r| line.starts_with(&r.prefix))
            .find_map(|r| r.replies.pop_front().or_else(|| r.sticky.clone()));
        if let Some(lines) = reply {
            self.pending.extend(lines);
        }
        self.written.push(line.to_string());
    }
}

fn lock(script: &Mutex<Script>) -> MutexGuard<'_, Script> {
    script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_lines<I, S>(lines: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    lines.into_iter().map(Into::into).collect()
}

/// Cloneable view of a [`MemoryTransport`] that outlives moving the transport
///
/// Lets a test keep scripting replies and inspecting what was written after
/// the transport itself has been handed to the command engine.
#[derive(Debug, Clone)]
pub struct MemoryTransportHandle {
    script: Arc<Mutex<Script>>,
}

impl MemoryTransportHandle {
    /// Queue one reply for the next command starting with `prefix`
    pub fn on<I, S>(&self, prefix: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.script).add(prefix, to_lines(lines), false);
    }

    /// Reply to every command starting with `prefix` once the queued replies run out
    pub fn always<I, S>(&self, prefix: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        lock(&self.script).add(prefix, to_lines(lines), true);
    }

    /// Make a line readable right away, as if the dongle had sent an event on its own
    pub fn push_unsolicited(&self, line: impl Into<String>) {
        lock(&self.script).pending.push_back(line.into());
    }

    /// Every command line written so far
    pub fn written(&self) -> Vec<String> {
        lock(&self.script).written.clone()
    }

    /// Number of lines still waiting to be read
    pub fn pending(&self) -> usize {
        lock(&self.script).pending.len()
    }

    pub fn open_count(&self) -> usize {
        lock(&self.script).opens
    }

    pub fn close_count(&self) -> usize {
        lock(&self.script).closes
    }
}

/// In-memory transport answering commands from a reply table
#[derive(Debug)]
pub struct MemoryTransport {
    script: Arc<Mutex<Script>>,
    drain: DrainBehavior,
    timeout: Option<Duration>,
    closed: bool,
    attached: bool,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(Script::default())),
            drain: DrainBehavior::default(),
            timeout: None,
            closed: true,
            attached: false,
        }
    }

    /// Queue one reply for the next command starting with `prefix`
    pub fn on<I, S>(self, prefix: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handle().on(prefix, lines);
        self
    }

    /// Reply to every command starting with `prefix` once the queued replies run out
    pub fn always<I, S>(self, prefix: &str, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handle().always(prefix, lines);
        self
    }

    pub fn with_drain(mut self, drain: DrainBehavior) -> Self {
        self.drain = drain;
        self
    }

    pub fn handle(&self) -> MemoryTransportHandle {
        MemoryTransportHandle {
            script: Arc::clone(&self.script),
        }
    }

    fn ensure_open(&self) -> HemsResult<()> {
        if self.closed {
            Err(HemsError::Connection(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "Memory transport not connected",
            )))
        } else {
            Ok(())
        }
    }
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportLayer for MemoryTransport {
    async fn open(&mut self) -> HemsResult<()> {
        if !self.closed {
            return Err(HemsError::Connection(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Connection has already been opened",
            )));
        }
        lock(&self.script).opens += 1;
        self.closed = false;
        self.attached = true;
        Ok(())
    }
}

#[async_trait]
impl StreamAccessor for MemoryTransport {
    async fn set_timeout(&mut self, timeout: Option<Duration>) -> HemsResult<()> {
        self.timeout = timeout;
        Ok(())
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn read_line(&mut self) -> HemsResult<Option<String>> {
        self.ensure_open()?;
        let next = lock(&self.script).pending.pop_front();
        if let Some(line) = next {
            return Ok(Some(line));
        }

        match self.drain {
            DrainBehavior::EndOfStream => Ok(None),
            DrainBehavior::HangUp => {
                self.closed = true;
                Ok(None)
            }
            DrainBehavior::Timeout => Err(HemsError::Timeout),
            DrainBehavior::Stall => {
                match self.timeout {
                    Some(timeout) => tokio::time::sleep(timeout).await,
                    None => std::future::pending::<()>().await,
                }
                Err(HemsError::Timeout)
            }
        }
    }

    async fn write_all(&mut self, buf: &[u8]) -> HemsResult<()> {
        self.ensure_open()?;
        let mut script = lock(&self.script);
        script.partial.extend(buf);
        while let Some(line) = script.partial.next_line() {
            script.respond(&line);
        }
        Ok(())
    }

    async fn flush(&mut self) -> HemsResult<()> {
        self.ensure_open()
    }

    async fn discard_pending(&mut self) -> HemsResult<()> {
        self.ensure_open()?;
        lock(&self.script).pending.clear();
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }

    async fn close(&mut self) -> HemsResult<()> {
        if self.attached {
            lock(&self.script).closes += 1;
        }
        self.attached = false;
        self.closed = true;
        Ok(())
    }
}
