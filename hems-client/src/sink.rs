//! Reading sinks
//!
//! A reading reaches the sinks only after a successful fetch. Sinks are
//! synchronous and must not block; anything slow belongs behind a channel.

use hems_core::Reading;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::SystemTime;

/// Consumer of successful readings
pub trait ReadingSink: Send + Sync {
    fn deliver(&self, reading: &Reading);
}

impl<S: ReadingSink + ?Sized> ReadingSink for Arc<S> {
    fn deliver(&self, reading: &Reading) {
        (**self).deliver(reading)
    }
}

/// Last known instantaneous power
///
/// In-process gauge that can be shared with whatever exports metrics.
#[derive(Debug, Default)]
pub struct WattGauge {
    watts: AtomicI64,
    samples: AtomicU64,
    updated: Mutex<Option<SystemTime>>,
}

impl WattGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recent value in watts (0 before the first reading)
    pub fn watts(&self) -> i64 {
        self.watts.load(Ordering::Relaxed)
    }

    /// Number of readings delivered so far
    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    /// Timestamp of the most recent reading
    pub fn last_update(&self) -> Option<SystemTime> {
        *self.updated.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ReadingSink for WattGauge {
    fn deliver(&self, reading: &Reading) {
        self.watts.store(reading.watts, Ordering::Relaxed);
        self.samples.fetch_add(1, Ordering::Relaxed);
        *self.updated.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
            Some(reading.timestamp);
    }
}

/// Logs every reading at info level
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl ReadingSink for LogSink {
    fn deliver(&self, reading: &Reading) {
        log::info!("power {} W", reading.watts);
    }
}

/// Delivers each reading to several sinks, in insertion order
#[derive(Default, Clone)]
pub struct Fanout {
    sinks: Vec<Arc<dyn ReadingSink>>,
}

impl Fanout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ReadingSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn push(&mut self, sink: Arc<dyn ReadingSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl ReadingSink for Fanout {
    fn deliver(&self, reading: &Reading) {
        for sink in &self.sinks {
            sink.deliver(reading);
        }
    }
}

impl std::fmt::Debug for Fanout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fanout").field("sinks", &self.sinks.len()).finish()
    }
}
