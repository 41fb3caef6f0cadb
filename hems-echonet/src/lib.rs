//! ECHONET Lite datagram exchange with the smart meter
//!
//! This crate provides the application layer on top of a joined PANA session:
//!
//! - [`EchonetFrame`]: request frame encoding (only the instantaneous power
//!   property is ever requested)
//! - [`RxUdp`]: the dongle's inbound UDP notification and power decoding
//! - [`fetch_power`] / [`MeterReader`]: one request/response round trip
//!   producing a [`Reading`](hems_core::Reading)

pub mod frame;
pub mod meter;
pub mod rxudp;

pub use frame::{EchonetFrame, EchonetObject, Esv, Property, EPC_INSTANTANEOUS_POWER};
pub use meter::{fetch_power, MeterReader, PowerSource};
pub use rxudp::{RxUdp, POWER_RESPONSE_LEN};
