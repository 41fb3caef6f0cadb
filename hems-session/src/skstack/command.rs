//! Outbound SKSTACK command lines

use std::fmt;

/// Terminator appended to every command line
pub const CRLF: &str = "\r\n";

/// One command understood by the dongle
///
/// [`SkCommand::to_line`] renders the exact wire text (without CRLF). The
/// `Display` implementation renders the same text with secrets masked and is
/// what ends up in logs.
#[derive(Clone, PartialEq, Eq)]
pub enum SkCommand {
    /// `SKVER`: firmware version
    Version,
    /// `SKINFO`: local addresses, channel, PAN ID
    Info,
    /// `SKSETPWD <LEN> <PWD>`: derive and register the PSK from the Route-B password
    SetPassword(String),
    /// `SKSETRBID <ID>`: register the Route-B ID
    SetRouteBId(String),
    /// `SKSCAN <MODE> <CHANNEL_MASK> <DURATION> <SIDE>`: active scan
    Scan {
        mode: u8,
        channel_mask: u32,
        duration: u8,
        side: u8,
    },
    /// `SKSREG <SREG> <VAL>`: write a virtual register
    SetRegister { register: String, value: String },
    /// `SKLL64 <ADDR64>`: link-local IPv6 address for a 64-bit MAC address
    LinkLocal64(String),
    /// `SKJOIN <IPADDR>`: start PANA authentication
    Join(String),
    /// `SKSENDTO <HANDLE> <IPADDR> <PORT> <SEC> <SIDE> <DATALEN> `: header of a UDP send
    ///
    /// The raw payload bytes follow the header on the wire.
    SendTo {
        handle: u8,
        address: String,
        port: u16,
        secured: bool,
        side: u8,
        length: usize,
    },
    /// `SKTERM`: terminate the PANA session
    Terminate,
}

impl SkCommand {
    /// Active scan over every channel, as used for Route-B
    pub fn active_scan(duration: u8) -> Self {
        SkCommand::Scan {
            mode: 2,
            channel_mask: 0xFFFF_FFFF,
            duration,
            side: 0,
        }
    }

    /// Command keyword
    pub fn name(&self) -> &'static str {
        match self {
            SkCommand::Version => "SKVER",
            SkCommand::Info => "SKINFO",
            SkCommand::SetPassword(_) => "SKSETPWD",
            SkCommand::SetRouteBId(_) => "SKSETRBID",
            SkCommand::Scan { .. } => "SKSCAN",
            SkCommand::SetRegister { .. } => "SKSREG",
            SkCommand::LinkLocal64(_) => "SKLL64",
            SkCommand::Join(_) => "SKJOIN",
            SkCommand::SendTo { .. } => "SKSENDTO",
            SkCommand::Terminate => "SKTERM",
        }
    }

    /// Wire text of the command, without the trailing CRLF
    ///
    /// For `SendTo` this is the header up to and including the space that
    /// precedes the payload.
    pub fn to_line(&self) -> String {
        match self {
            SkCommand::Version | SkCommand::Info | SkCommand::Terminate => self.name().to_string(),
            SkCommand::SetPassword(password) => {
                format!("SKSETPWD {:X} {}", password.len(), password)
            }
            SkCommand::SetRouteBId(id) => format!("SKSETRBID {}", id),
            SkCommand::Scan {
                mode,
                channel_mask,
                duration,
                side,
            } => format!("SKSCAN {} {:08X} {} {}", mode, channel_mask, duration, side),
            SkCommand::SetRegister { register, value } => format!("SKSREG {} {}", register, value),
            SkCommand::LinkLocal64(addr) => format!("SKLL64 {}", addr),
            SkCommand::Join(addr) => format!("SKJOIN {}", addr),
            SkCommand::SendTo {
                handle,
                address,
                port,
                secured,
                side,
                length,
            } => format!(
                "SKSENDTO {} {} {:04X} {} {} {:04X} ",
                handle,
                address,
                port,
                u8::from(*secured),
                side,
                length
            ),
        }
    }

    /// Wire bytes of the command: its text, then `payload`, then CRLF
    ///
    /// `payload` is empty for everything but `SendTo`.
    pub fn to_bytes(&self, payload: &[u8]) -> Vec<u8> {
        let mut bytes = self.to_line().into_bytes();
        bytes.extend_from_slice(payload);
        bytes.extend_from_slice(CRLF.as_bytes());
        bytes
    }
}

impl fmt::Display for SkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkCommand::SetPassword(password) => {
                write!(f, "SKSETPWD {:X} {}", password.len(), "*".repeat(password.len()))
            }
            SkCommand::SetRouteBId(id) => write!(f, "SKSETRBID {}", mask(id)),
            other => f.write_str(other.to_line().trim_end()),
        }
    }
}

impl fmt::Debug for SkCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SkCommand({})", self)
    }
}

/// Keep the first four characters of an identifier
fn mask(id: &str) -> String {
    let shown: String = id.chars().take(4).collect();
    format!("{}{}", shown, "*".repeat(id.chars().count().saturating_sub(4)))
}
