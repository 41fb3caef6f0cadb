//! Session state machine

use crate::error::{HemsError, HemsResult};
use std::fmt;

/// Bring-up state of a dongle session
///
/// Tracks how far the dongle has been taken from an unconfigured device
/// towards an authenticated PANA session with the meter.
///
/// # State Transitions
/// ```text
/// Disconnected -> LinkOpen -> Versioned -> InfoKnown -> CredentialsSet
///     -> Scanned -> Registered -> AddressResolved -> Joined
/// Joined -> Terminated    (explicit SKTERM)
/// Joined -> Disconnected  (session lifetime exceeded, EVENT 29)
/// ```
///
/// Every other edge is rejected. A session that failed part way stays in the
/// last state it reached; a new bring-up always starts from a fresh session
/// in `Disconnected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum SessionState {
    /// Link closed (initial state)
    #[default]
    Disconnected,
    /// Serial link opened and settled
    LinkOpen,
    /// Firmware version read (`SKVER`)
    Versioned,
    /// Local addresses read (`SKINFO`)
    InfoKnown,
    /// Password and Route-B ID registered
    CredentialsSet,
    /// PAN found by `SKSCAN`
    Scanned,
    /// Channel and PAN ID written to S2/S3
    Registered,
    /// Meter link-local address resolved (`SKLL64`)
    AddressResolved,
    /// PANA session established (`SKJOIN`)
    Joined,
    /// PANA session terminated (`SKTERM`)
    Terminated,
}

impl SessionState {
    /// The state that follows `self` during bring-up, if any
    pub fn next(&self) -> Option<SessionState> {
        use SessionState::*;
        match self {
            Disconnected => Some(LinkOpen),
            LinkOpen => Some(Versioned),
            Versioned => Some(InfoKnown),
            InfoKnown => Some(CredentialsSet),
            CredentialsSet => Some(Scanned),
            Scanned => Some(Registered),
            Registered => Some(AddressResolved),
            AddressResolved => Some(Joined),
            Joined | Terminated => None,
        }
    }

    /// Check if the session can carry datagrams
    pub fn is_joined(&self) -> bool {
        matches!(self, SessionState::Joined)
    }

    /// Validate state transition
    ///
    /// # Valid Transitions
    /// - one step forward along the bring-up order
    /// - `Joined` -> `Terminated`
    /// - `Joined` -> `Disconnected`
    pub fn validate_transition(&self, new_state: SessionState) -> HemsResult<()> {
        let valid = match (*self, new_state) {
            (SessionState::Joined, SessionState::Terminated) => true,
            (SessionState::Joined, SessionState::Disconnected) => true,
            (from, to) => from.next() == Some(to),
        };

        if valid {
            Ok(())
        } else {
            Err(HemsError::InvalidState(format!(
                "Invalid state transition: {:?} -> {:?}",
                self, new_state
            )))
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Disconnected => "Disconnected",
            SessionState::LinkOpen => "LinkOpen",
            SessionState::Versioned => "Versioned",
            SessionState::InfoKnown => "InfoKnown",
            SessionState::CredentialsSet => "CredentialsSet",
            SessionState::Scanned => "Scanned",
            SessionState::Registered => "Registered",
            SessionState::AddressResolved => "AddressResolved",
            SessionState::Joined => "Joined",
            SessionState::Terminated => "Terminated",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
