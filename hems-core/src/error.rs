use std::fmt;
use thiserror::Error;

/// Error code carried by a `FAIL <code>` reply from the dongle
///
/// The dongle reports command rejection with a short code. Only a few of them
/// change how the caller reacts, but all of them are kept so that a log line
/// always shows what the device actually said.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FailCode {
    /// `ER04`: command not supported
    Er04,
    /// `ER05`: wrong number of arguments
    Er05,
    /// `ER06`: argument format or range error
    ///
    /// Seen on `SKSENDTO` once the PANA security context of the dongle no longer
    /// matches the meter. The session has to be rebuilt.
    Er06,
    /// `ER09`: UART input error
    Er09,
    /// `ER10`: command accepted but execution failed (e.g. `SKTERM` without a session)
    Er10,
    /// Any other code, kept verbatim
    Other(String),
}

impl FailCode {
    /// Parse the code part of a `FAIL <code>` line
    pub fn parse(code: &str) -> Self {
        match code.trim() {
            "ER04" => FailCode::Er04,
            "ER05" => FailCode::Er05,
            "ER06" => FailCode::Er06,
            "ER09" => FailCode::Er09,
            "ER10" => FailCode::Er10,
            other => FailCode::Other(other.to_string()),
        }
    }

    /// Wire representation of the code
    pub fn as_str(&self) -> &str {
        match self {
            FailCode::Er04 => "ER04",
            FailCode::Er05 => "ER05",
            FailCode::Er06 => "ER06",
            FailCode::Er09 => "ER09",
            FailCode::Er10 => "ER10",
            FailCode::Other(code) => code,
        }
    }
}

impl fmt::Display for FailCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Main error type for HEMS operations
#[derive(Error, Debug)]
pub enum HemsError {
    #[error("Connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("Timeout")]
    Timeout,

    #[error("Request failed: FAIL {0}")]
    RequestFailed(FailCode),

    #[error("Session lifetime exceeded")]
    SessionExpired,

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Unexpected data length: expected {expected}, got {actual}")]
    UnexpectedLength { expected: String, actual: String },

    #[error("No PAN found")]
    NoPanFound,

    #[error("PANA join failed: {0}")]
    JoinFailed(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unrecoverable: {0}")]
    Unrecoverable(Box<HemsError>),
}

impl HemsError {
    /// `FAIL ER06` on a request: the session security state has desynchronized
    pub fn is_desync(&self) -> bool {
        matches!(self, HemsError::RequestFailed(FailCode::Er06))
    }

    /// `FAIL ER10` on terminate: there was no session to terminate
    pub fn is_benign_terminate(&self) -> bool {
        matches!(self, HemsError::RequestFailed(FailCode::Er10))
    }

    /// Errors after which the current session cannot be used any more
    ///
    /// Retrying a fetch on the same session is pointless for these; the whole
    /// session has to be torn down and brought up again.
    pub fn is_session_fatal(&self) -> bool {
        self.is_desync()
            || matches!(
                self,
                HemsError::SessionExpired | HemsError::Connection(_) | HemsError::Unrecoverable(_)
            )
    }

    /// Errors that are counted against a retry budget instead of escalated
    pub fn is_transient(&self) -> bool {
        !self.is_session_fatal()
    }

    /// Short classification label used in log lines
    pub fn classification(&self) -> &'static str {
        match self {
            HemsError::Connection(_) => "io",
            HemsError::Timeout => "timeout",
            HemsError::RequestFailed(FailCode::Er06) => "desync",
            HemsError::RequestFailed(_) => "request-failed",
            HemsError::SessionExpired => "session-expired",
            HemsError::Protocol(_)
            | HemsError::UnexpectedLength { .. }
            | HemsError::InvalidData(_) => "protocol",
            HemsError::NoPanFound | HemsError::JoinFailed(_) => "bring-up",
            HemsError::InvalidState(_) => "state",
            HemsError::Config(_) => "config",
            HemsError::Unrecoverable(_) => "unrecoverable",
        }
    }
}

/// Result type alias for HEMS operations
pub type HemsResult<T> = Result<T, HemsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_code_parse() {
        assert_eq!(FailCode::parse("ER06"), FailCode::Er06);
        assert_eq!(FailCode::parse(" ER10 "), FailCode::Er10);
        assert_eq!(FailCode::parse("ER99"), FailCode::Other("ER99".to_string()));
        assert_eq!(FailCode::parse("ER99").as_str(), "ER99");
    }

    #[test]
    fn test_desync_is_distinguishable() {
        let er06 = HemsError::RequestFailed(FailCode::Er06);
        let er10 = HemsError::RequestFailed(FailCode::Er10);
        assert!(er06.is_desync());
        assert!(!er10.is_desync());
        assert!(er10.is_benign_terminate());
        assert!(!HemsError::RequestFailed(FailCode::Er04).is_desync());
    }

    #[test]
    fn test_session_fatal_classification() {
        assert!(HemsError::SessionExpired.is_session_fatal());
        assert!(HemsError::RequestFailed(FailCode::Er06).is_session_fatal());
        assert!(HemsError::Connection(std::io::Error::other("gone")).is_session_fatal());

        assert!(HemsError::Timeout.is_transient());
        assert!(HemsError::Protocol("bad".into()).is_transient());
        assert!(HemsError::RequestFailed(FailCode::Er09).is_transient());
    }

    #[test]
    fn test_display() {
        let err = HemsError::RequestFailed(FailCode::Er06);
        assert_eq!(err.to_string(), "Request failed: FAIL ER06");
        assert_eq!(err.classification(), "desync");
    }
}
