//! Route-B meter client
//!
//! This crate drives a meter session over its whole lifetime:
//!
//! - [`SessionBuilder`]: configure the dongle link and credentials, build sessions
//! - [`Poller`]: periodic fetch loop with a bounded retry budget
//! - [`Supervisor`]: rebuilds the session after failures, gives up after its own budget
//! - [`ReadingSink`]: where successful readings go ([`WattGauge`], [`LogSink`], [`Fanout`])

pub mod builder;
pub mod poller;
pub mod sink;
pub mod supervisor;

pub use builder::{SerialSessionFactory, SessionBuilder};
pub use poller::{FetchOutcome, PollExit, PollSettings, Poller};
pub use sink::{Fanout, LogSink, ReadingSink, WattGauge};
pub use supervisor::{MeterSession, SessionFactory, Supervisor, SupervisorSettings};
