//! Session supervision
//!
//! The supervisor runs one *unit* at a time: build a session, bring it up
//! within `init_timeout`, poll it, close it. A unit that ends because the
//! poller ran out of retries is restarted right away and clears the
//! supervisor's own budget; every other failure (bring-up error, bring-up
//! timeout, fatal fetch error) is counted, and once that budget is exhausted
//! the supervisor gives up with `HemsError::Unrecoverable`.

use crate::poller::{PollExit, PollSettings, Poller};
use crate::sink::ReadingSink;
use async_trait::async_trait;
use hems_core::{BudgetState, HemsError, HemsResult, RetryBudget};
use hems_echonet::{MeterReader, PowerSource};
use hems_transport::TransportLayer;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// A meter session as seen by the supervisor
#[async_trait]
pub trait MeterSession: PowerSource {
    /// Bring the session up
    async fn init(&mut self) -> HemsResult<()>;

    /// Keep the link's read deadline at or below `limit`
    async fn cap_read_timeout(&mut self, limit: Duration) -> HemsResult<()>;

    /// Terminate the session and release the link
    async fn close(&mut self) -> HemsResult<()>;
}

#[async_trait]
impl<T: TransportLayer> MeterSession for MeterReader<T> {
    async fn init(&mut self) -> HemsResult<()> {
        self.session_mut().init().await
    }

    async fn cap_read_timeout(&mut self, limit: Duration) -> HemsResult<()> {
        let engine = self.session().engine();
        match engine.read_timeout().await {
            Some(current) if current <= limit => Ok(()),
            _ => engine.set_read_timeout(Some(limit)).await,
        }
    }

    async fn close(&mut self) -> HemsResult<()> {
        let stats = self.session().statistics().await;
        log::debug!(
            "closing session: {} commands, {} lines, {} failures, {} timeouts ({:.1}% errors)",
            stats.commands_sent,
            stats.lines_received,
            stats.failures,
            stats.timeouts,
            stats.error_rate()
        );
        self.session_mut().close().await
    }
}

/// Produces a fresh, not yet initialised session for every unit
#[async_trait]
pub trait SessionFactory: Send + Sync {
    type Session: MeterSession;

    async fn create(&self) -> HemsResult<Self::Session>;
}

/// Default number of failed units tolerated
pub const DEFAULT_MAX_SESSION_RETRIES: u32 = 5;

/// Default upper bound for one bring-up
///
/// Covers the settle time, a full scan at the default duration and a slow
/// PANA join, with room for the short commands in between.
pub const DEFAULT_INIT_TIMEOUT: Duration = Duration::from_secs(90);

/// Supervisor parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorSettings {
    /// Failed units tolerated before giving up
    pub max_session_retries: u32,
    /// Upper bound for one bring-up
    pub init_timeout: Duration,
    pub poll: PollSettings,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            max_session_retries: DEFAULT_MAX_SESSION_RETRIES,
            init_timeout: DEFAULT_INIT_TIMEOUT,
            poll: PollSettings::default(),
        }
    }
}

/// Outer retry loop around session units
#[derive(Debug)]
pub struct Supervisor {
    settings: SupervisorSettings,
    budget: RetryBudget,
}

impl Supervisor {
    pub fn new(settings: SupervisorSettings) -> Self {
        let budget = RetryBudget::new(settings.max_session_retries);
        Self { settings, budget }
    }

    pub fn settings(&self) -> &SupervisorSettings {
        &self.settings
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    /// Run units until cancelled or until the budget is exhausted
    ///
    /// # Returns
    /// `Ok(())` once `cancel` fires.
    ///
    /// # Errors
    /// `HemsError::Unrecoverable` wrapping the last failure.
    pub async fn run<F, K>(
        &mut self,
        factory: &F,
        sink: &K,
        cancel: &CancellationToken,
    ) -> HemsResult<()>
    where
        F: SessionFactory + ?Sized,
        K: ReadingSink + ?Sized,
    {
        loop {
            if cancel.is_cancelled() {
                return Ok(());
            }

            let error = match self.run_unit(factory, sink, cancel).await {
                Ok(PollExit::Cancelled) => {
                    log::info!("supervisor stopped");
                    return Ok(());
                }
                Ok(PollExit::RetriesExhausted) => {
                    log::warn!("fetch retries exhausted, restarting session");
                    self.budget.reset();
                    continue;
                }
                Ok(PollExit::Fatal(e)) | Err(e) => e,
            };

            match self.budget.record_failure() {
                BudgetState::Within(count) => {
                    log::warn!(
                        "session failed ({}), restart {}/{}: {}",
                        error.classification(),
                        count,
                        self.budget.max(),
                        error
                    );
                }
                BudgetState::Exhausted(count) => {
                    log::error!(
                        "session failed {} times ({}), giving up: {}",
                        count,
                        error.classification(),
                        error
                    );
                    return Err(HemsError::Unrecoverable(Box::new(error)));
                }
            }
        }
    }

    /// Build, bring up, poll and close one session
    async fn run_unit<F, K>(
        &self,
        factory: &F,
        sink: &K,
        cancel: &CancellationToken,
    ) -> HemsResult<PollExit>
    where
        F: SessionFactory + ?Sized,
        K: ReadingSink + ?Sized,
    {
        let mut session = factory.create().await?;
        let result = self.drive(&mut session, sink, cancel).await;
        if let Err(e) = session.close().await {
            log::warn!("closing session failed ({}): {}", e.classification(), e);
        }
        result
    }

    async fn drive<S, K>(
        &self,
        session: &mut S,
        sink: &K,
        cancel: &CancellationToken,
    ) -> HemsResult<PollExit>
    where
        S: MeterSession,
        K: ReadingSink + ?Sized,
    {
        let init_timeout = self.settings.init_timeout;
        let init = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(PollExit::Cancelled),
            init = tokio::time::timeout(init_timeout, session.init()) => init,
        };
        match init {
            Ok(result) => result?,
            Err(_) => {
                log::error!("session bring-up did not finish within {:?}", init_timeout);
                return Err(HemsError::Timeout);
            }
        }

        session.cap_read_timeout(self.settings.poll.fetch_timeout).await?;

        let mut poller = Poller::new(self.settings.poll.clone());
        Ok(poller.run(session, sink, cancel).await)
    }
}
