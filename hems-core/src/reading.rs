use std::time::SystemTime;

/// One instantaneous power sample read from the meter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reading {
    /// When the request for this sample was sent
    pub timestamp: SystemTime,
    /// Instantaneous power in watts (negative while exporting)
    pub watts: i64,
}

impl Reading {
    pub fn new(timestamp: SystemTime, watts: i64) -> Self {
        Self { timestamp, watts }
    }

    /// Sample stamped with the current time
    pub fn now(watts: i64) -> Self {
        Self::new(SystemTime::now(), watts)
    }
}
