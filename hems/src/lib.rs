//! hems - Route-B smart meter power reader
//!
//! Reads the instantaneous power of a Japanese low-voltage smart meter over
//! a Wi-SUN Route-B dongle that speaks the SKSTACK text protocol.
//!
//! # Architecture
//!
//! This library is organized as a workspace with multiple crates:
//!
//! - `hems-core`: Core types, error taxonomy, session states and retry budgets
//! - `hems-transport`: Line-oriented links (serial, scripted in-memory)
//! - `hems-session`: SKSTACK command engine and PANA session lifecycle
//! - `hems-echonet`: ECHONET Lite power request and response decoding
//! - `hems-client`: Fetch loop, session supervision and reading sinks
//!
//! # Usage
//!
//! ```no_run
//! use hems::client::{SerialSessionFactory, SessionBuilder};
//! use hems::session::Credentials;
//!
//! let credentials = Credentials::new("00112233445566778899AABBCCDDEEFF", "0123456789AB");
//! let builder = SessionBuilder::new(credentials).serial("/dev/ttyACM0", 115200);
//! let factory = SerialSessionFactory::new(builder)?;
//! # Ok::<(), hems::HemsError>(())
//! ```

pub mod config;

// Re-export core types
pub use hems_core::{HemsError, HemsResult, Reading, SessionState};

pub use config::Config;

// Re-export link layer
pub mod transport {
    pub use hems_transport::*;
}

// Re-export session layer
pub mod session {
    pub use hems_session::*;
}

// Re-export ECHONET Lite layer
pub mod echonet {
    pub use hems_echonet::*;
}

// Re-export client API
pub mod client {
    pub use hems_client::*;
}
