//! Core types and utilities for the Route-B smart meter reader
//!
//! This crate provides the error taxonomy, the session state machine and the
//! plain data records shared by every layer of the HEMS workspace:
//!
//! - [`HemsError`]: classified failures of the dongle, the session and the meter
//! - [`SessionState`]: the bring-up state machine of a PANA session
//! - [`DeviceInfo`], [`PanDescriptor`], [`SessionEndpoints`]: snapshots read from the dongle
//! - [`Reading`]: one instantaneous power sample
//! - [`RetryBudget`]: bounded retry counter used by the supervisors

pub mod budget;
pub mod error;
pub mod reading;
pub mod state;
pub mod types;

pub use budget::{BudgetState, RetryBudget};
pub use error::{FailCode, HemsError, HemsResult};
pub use reading::Reading;
pub use state::SessionState;
pub use types::{DeviceInfo, PanDescriptor, SessionEndpoints};
