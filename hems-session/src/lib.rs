//! Session layer module for the Route-B smart meter reader
//!
//! This crate drives the Wi-SUN dongle through its SKSTACK text protocol:
//!
//! - [`skstack`]: command rendering, line classification and the
//!   lock-serialised [`CommandEngine`]
//! - [`session`]: the PANA session lifecycle ([`SkSession`]) from an
//!   unconfigured dongle to a joined session and back

pub mod session;
pub mod skstack;

pub use hems_core::{HemsError, HemsResult, SessionState};
pub use session::{Credentials, SessionSettings, SkSession};
pub use skstack::{CommandEngine, EngineStatistics, Flow, Line, SkCommand};
