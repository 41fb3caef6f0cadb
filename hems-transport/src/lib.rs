//! Transport layer module for the Wi-SUN dongle
//!
//! This crate provides the byte-level link to the dongle and turns it into a
//! stream of text records:
//!
//! - [`SerialTransport`]: the real serial port (tokio-serial)
//! - [`MemoryTransport`]: a scripted in-process dongle for tests and dry runs

pub mod line;
pub mod memory;
pub mod serial;
pub mod stream;

pub use hems_core::{HemsError, HemsResult};
pub use line::LineBuffer;
pub use memory::{DrainBehavior, MemoryTransport, MemoryTransportHandle};
pub use serial::{SerialSettings, SerialTransport, DEFAULT_BAUD_RATE, DEFAULT_READ_TIMEOUT};
pub use stream::{StreamAccessor, TransportLayer};
