//! Command engine statistics collection

/// Command engine statistics
///
/// Counters updated by the engine on every exchange. They are cheap to copy
/// and are logged by the supervisor when a session is torn down.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStatistics {
    /// Command lines written
    pub commands_sent: u64,
    /// Lines received (echoes and events included)
    pub lines_received: u64,
    /// `FAIL` replies
    pub failures: u64,
    /// Reads that hit the deadline
    pub timeouts: u64,
    /// Session-lifetime-exceeded events seen mid-reply
    pub session_expiries: u64,
    /// Exchanges that ended without any terminating line
    pub unterminated: u64,
}

impl EngineStatistics {
    /// Create new statistics with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all statistics counters
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn increment_commands_sent(&mut self) {
        self.commands_sent += 1;
    }

    pub fn increment_lines_received(&mut self) {
        self.lines_received += 1;
    }

    pub fn increment_failures(&mut self) {
        self.failures += 1;
    }

    pub fn increment_timeouts(&mut self) {
        self.timeouts += 1;
    }

    pub fn increment_session_expiries(&mut self) {
        self.session_expiries += 1;
    }

    pub fn increment_unterminated(&mut self) {
        self.unterminated += 1;
    }

    /// Percentage of commands that ended in `FAIL` or a timeout
    ///
    /// Returns 0.0 if no command has been sent.
    pub fn error_rate(&self) -> f64 {
        if self.commands_sent == 0 {
            0.0
        } else {
            ((self.failures + self.timeouts) as f64 / self.commands_sent as f64) * 100.0
        }
    }
}
