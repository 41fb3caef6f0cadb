//! Periodic power fetch loop
//!
//! # Loop
//!
//! 1. Wait `poll_interval` (cancellation wins)
//! 2. Fetch once, bounded by `fetch_timeout`; on expiry the fetch future is
//!    dropped, which releases the command engine
//! 3. Classify the result:
//!    - reading: reset the retry budget, deliver to the sink
//!    - fatal (`FAIL ER06`, session expired, link error): stop, the session is unusable
//!    - transient (timeout, malformed reply, other `FAIL`): count against the budget

use crate::sink::ReadingSink;
use hems_core::{BudgetState, HemsError, HemsResult, Reading, RetryBudget};
use hems_echonet::PowerSource;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default number of consecutive transient failures tolerated
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Poll loop parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    /// Consecutive transient failures tolerated before giving up on the session
    pub max_retries: u32,
    /// Wait before each fetch
    pub poll_interval: Duration,
    /// Upper bound for one fetch
    pub fetch_timeout: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            poll_interval: Duration::from_secs(10),
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

/// Classified result of one fetch
#[derive(Debug)]
pub enum FetchOutcome {
    Reading(Reading),
    /// The session cannot be used any more
    Fatal(HemsError),
    /// Worth retrying on the same session
    Transient(HemsError),
}

impl FetchOutcome {
    pub fn classify(result: HemsResult<Reading>) -> Self {
        match result {
            Ok(reading) => FetchOutcome::Reading(reading),
            Err(e) if e.is_session_fatal() => FetchOutcome::Fatal(e),
            Err(e) => FetchOutcome::Transient(e),
        }
    }
}

/// Why the poll loop stopped
#[derive(Debug)]
pub enum PollExit {
    Cancelled,
    /// The retry budget ran out on transient failures
    RetriesExhausted,
    Fatal(HemsError),
}

/// Fetch loop over one session
#[derive(Debug)]
pub struct Poller {
    settings: PollSettings,
    budget: RetryBudget,
}

impl Poller {
    pub fn new(settings: PollSettings) -> Self {
        let budget = RetryBudget::new(settings.max_retries);
        Self { settings, budget }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    /// Run one fetch bounded by the fetch timeout
    pub async fn poll_once<S>(&self, source: &mut S) -> FetchOutcome
    where
        S: PowerSource + ?Sized,
    {
        match tokio::time::timeout(self.settings.fetch_timeout, source.fetch_power()).await {
            Ok(result) => FetchOutcome::classify(result),
            Err(_) => {
                log::debug!("fetch abandoned after {:?}", self.settings.fetch_timeout);
                FetchOutcome::Transient(HemsError::Timeout)
            }
        }
    }

    /// Fetch until cancelled, until the budget runs out or until a fatal error
    pub async fn run<S, K>(
        &mut self,
        source: &mut S,
        sink: &K,
        cancel: &CancellationToken,
    ) -> PollExit
    where
        S: PowerSource + ?Sized,
        K: ReadingSink + ?Sized,
    {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollExit::Cancelled,
                _ = tokio::time::sleep(self.settings.poll_interval) => {}
            }

            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return PollExit::Cancelled,
                outcome = self.poll_once(source) => outcome,
            };

            match outcome {
                FetchOutcome::Reading(reading) => {
                    self.budget.reset();
                    sink.deliver(&reading);
                }
                FetchOutcome::Fatal(e) => {
                    log::error!("fatal fetch error ({}): {}", e.classification(), e);
                    return PollExit::Fatal(e);
                }
                FetchOutcome::Transient(e) => match self.budget.record_failure() {
                    BudgetState::Within(count) => {
                        log::warn!(
                            "fetch failed ({}), retry {}/{}: {}",
                            e.classification(),
                            count,
                            self.budget.max(),
                            e
                        );
                    }
                    BudgetState::Exhausted(count) => {
                        log::error!(
                            "fetch failed {} times in a row ({}): {}",
                            count,
                            e.classification(),
                            e
                        );
                        return PollExit::RetriesExhausted;
                    }
                },
            }
        }
    }
}
