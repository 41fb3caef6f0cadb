//! Inbound line classification
//!
//! Replies, unsolicited events and scan results share one text stream. Every
//! received line is classified once into a [`Line`] so that the engine and the
//! session only ever match on variants.

use hems_core::FailCode;

/// Generic success reply
pub const RESP_OK: &str = "OK";
/// Generic failure reply prefix
pub const RESP_FAIL: &str = "FAIL ";
/// Prefix of the `SKVER` reply event
pub const EVENT_VERSION: &str = "EVER ";
/// Prefix of the `SKINFO` reply event
pub const EVENT_INFO: &str = "EINFO ";
/// Prefix of the inbound UDP notification
pub const EVENT_RXUDP: &str = "ERXUDP ";
/// Header opening one PAN descriptor block during `SKSCAN`
pub const EVENT_PANDESC: &str = "EPANDESC";
/// Prefix of every link-local address printed by `SKLL64`
pub const LINK_LOCAL_PREFIX: &str = "FE80:0000:0000:0000:";

/// Numeric `EVENT` codes (hexadecimal on the wire)
pub mod event {
    /// UDP send completed
    pub const UDP_SENT: u8 = 0x21;
    /// Active scan completed
    pub const SCAN_COMPLETE: u8 = 0x22;
    /// PANA connection failed
    pub const PANA_FAILED: u8 = 0x24;
    /// PANA connection completed
    pub const PANA_JOINED: u8 = 0x25;
    /// Session termination requested by the peer
    pub const TERMINATE_REQUESTED: u8 = 0x26;
    /// PANA session closed
    pub const SESSION_CLOSED: u8 = 0x27;
    /// Termination request timed out; the session is gone
    pub const TERMINATE_TIMEOUT: u8 = 0x28;
    /// Session lifetime exceeded; the dongle re-authenticates on its own
    pub const LIFETIME_EXCEEDED: u8 = 0x29;
}

/// Key of a `key:value` line printed during an active scan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanKey {
    Channel,
    ChannelPage,
    PanId,
    Addr,
    Lqi,
    PairId,
}

impl ScanKey {
    fn parse(key: &str) -> Option<Self> {
        match key {
            "Channel" => Some(ScanKey::Channel),
            "Channel Page" => Some(ScanKey::ChannelPage),
            "Pan ID" => Some(ScanKey::PanId),
            "Addr" => Some(ScanKey::Addr),
            "LQI" => Some(ScanKey::Lqi),
            "PairID" => Some(ScanKey::PairId),
            _ => None,
        }
    }
}

/// A classified inbound line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line<'a> {
    /// `OK`
    Ok,
    /// `FAIL <code>`
    Fail(FailCode),
    /// `EVENT <code> <rest>`
    Event { code: u8, rest: &'a str },
    /// `EVER <version>`
    Version(&'a str),
    /// `EINFO <fields>`
    Info(&'a str),
    /// `EPANDESC`, the start of one scan result
    PanDesc,
    /// `<key>:<value>` from a scan
    ScanField { key: ScanKey, value: &'a str },
    /// `ERXUDP <fields>`
    RxUdp(&'a str),
    /// Anything else (command echo, addresses, ...)
    Other(&'a str),
}

impl<'a> Line<'a> {
    /// Classify one line
    pub fn classify(raw: &'a str) -> Self {
        let line = raw.trim();

        if line == RESP_OK || line.starts_with("OK ") {
            return Line::Ok;
        }
        if let Some(code) = line.strip_prefix(RESP_FAIL) {
            return Line::Fail(FailCode::parse(code));
        }
        if let Some(rest) = line.strip_prefix("EVENT ") {
            let (code, rest) = rest.split_once(' ').unwrap_or((rest, ""));
            if let Ok(code) = u8::from_str_radix(code, 16) {
                return Line::Event { code, rest };
            }
            return Line::Other(line);
        }
        if let Some(version) = line.strip_prefix(EVENT_VERSION) {
            return Line::Version(version.trim());
        }
        if let Some(fields) = line.strip_prefix(EVENT_INFO) {
            return Line::Info(fields);
        }
        if line.starts_with(EVENT_RXUDP) {
            return Line::RxUdp(line);
        }
        if line == EVENT_PANDESC {
            return Line::PanDesc;
        }
        if let Some((key, value)) = line.split_once(':') {
            if let Some(key) = ScanKey::parse(key.trim()) {
                return Line::ScanField {
                    key,
                    value: value.trim(),
                };
            }
        }
        Line::Other(line)
    }

    /// Check if this is the given event
    pub fn is_event(&self, expected: u8) -> bool {
        matches!(self, Line::Event { code, .. } if *code == expected)
    }
}

/// Whether a raw line carries the session-lifetime-exceeded event
///
/// Matched anywhere in the line: the event can be glued to the tail of
/// another record when the dongle emits it mid-reply.
pub fn is_lifetime_exceeded(raw: &str) -> bool {
    let raw = raw.trim_end();
    raw.contains("EVENT 29 ") || raw.ends_with("EVENT 29")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ok_and_fail() {
        assert_eq!(Line::classify("OK"), Line::Ok);
        assert_eq!(Line::classify("FAIL ER06"), Line::Fail(FailCode::Er06));
        assert_eq!(
            Line::classify("FAIL ER99"),
            Line::Fail(FailCode::Other("ER99".to_string()))
        );
    }

    #[test]
    fn test_events() {
        let line = Line::classify("EVENT 22 FE80:0000:0000:0000:021D:1291:0000:0001 0");
        assert!(line.is_event(event::SCAN_COMPLETE));
        assert_eq!(
            Line::classify("EVENT 25 FE80:0000:0000:0000:021D:1290:1234:5678 0"),
            Line::Event {
                code: event::PANA_JOINED,
                rest: "FE80:0000:0000:0000:021D:1290:1234:5678 0"
            }
        );
        assert!(Line::classify("EVENT 28").is_event(event::TERMINATE_TIMEOUT));
        assert!(matches!(Line::classify("EVENT ZZ"), Line::Other(_)));
    }

    #[test]
    fn test_version_and_info() {
        assert_eq!(Line::classify("EVER 1.2.10"), Line::Version("1.2.10"));
        assert_eq!(
            Line::classify("EINFO FE80::1 001D 21 8888 0"),
            Line::Info("FE80::1 001D 21 8888 0")
        );
    }

    #[test]
    fn test_scan_fields_with_indentation() {
        assert_eq!(
            Line::classify("  Channel:21"),
            Line::ScanField {
                key: ScanKey::Channel,
                value: "21"
            }
        );
        assert_eq!(
            Line::classify("  Channel Page:09"),
            Line::ScanField {
                key: ScanKey::ChannelPage,
                value: "09"
            }
        );
        assert_eq!(
            Line::classify("Pan ID: 8888 "),
            Line::ScanField {
                key: ScanKey::PanId,
                value: "8888"
            }
        );
    }

    #[test]
    fn test_addresses_are_not_scan_fields() {
        assert!(matches!(
            Line::classify("FE80:0000:0000:0000:021D:1290:1234:5678"),
            Line::Other(_)
        ));
        assert_eq!(Line::classify("EPANDESC"), Line::PanDesc);
    }

    #[test]
    fn test_rxudp() {
        let raw = "ERXUDP FE80::2 FE80::1 0E1A 0E1A 001D129012345678 1 0 0012 \
                   1081000102880105FF017201E704000000C8";
        assert!(matches!(Line::classify(raw), Line::RxUdp(_)));
    }

    #[test]
    fn test_lifetime_marker() {
        assert!(is_lifetime_exceeded("EVENT 29 FE80:0000:0000:0000:021D:1290:1234:5678 0"));
        assert!(is_lifetime_exceeded("EVENT 29"));
        assert!(is_lifetime_exceeded("garbage EVENT 29 FE80"));
        assert!(!is_lifetime_exceeded("EVENT 2"));
        assert!(!is_lifetime_exceeded("EVENT 28 FE80"));
    }
}
