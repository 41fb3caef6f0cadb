//! Inbound UDP notification (`ERXUDP`)

use crate::frame::EPC_INSTANTANEOUS_POWER;
use hems_core::{HemsError, HemsResult};

/// Data length (hex, 4 digits) of a power response: 12 header bytes + E7, PDC, 4-byte EDT
pub const POWER_RESPONSE_LEN: &str = "0012";

const FIELD_COUNT: usize = 10;

/// One `ERXUDP` line split into its fields
///
/// ```text
/// ERXUDP <sender> <dest> <rport> <lport> <sender_lla> <secured> <side> <datalen> <data>
/// ```
///
/// `data` is the datagram in upper-case hex.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RxUdp {
    pub sender: String,
    pub dest: String,
    pub rport: String,
    pub lport: String,
    pub sender_lla: String,
    pub secured: String,
    pub side: String,
    pub datalen: String,
    pub data: String,
}

impl RxUdp {
    /// Split a notification line
    ///
    /// # Errors
    /// `HemsError::Protocol` unless the line is `ERXUDP` followed by exactly
    /// nine fields.
    pub fn parse(line: &str) -> HemsResult<Self> {
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() != FIELD_COUNT || fields[0] != "ERXUDP" {
            log::debug!("unexpected response ({} fields): {}", fields.len(), line);
            return Err(HemsError::Protocol("unexpected response".to_string()));
        }

        Ok(Self {
            sender: fields[1].to_string(),
            dest: fields[2].to_string(),
            rport: fields[3].to_string(),
            lport: fields[4].to_string(),
            sender_lla: fields[5].to_string(),
            secured: fields[6].to_string(),
            side: fields[7].to_string(),
            datalen: fields[8].to_string(),
            data: fields[9].to_string(),
        })
    }

    /// Instantaneous power carried by a response to the power request
    ///
    /// The value is the last four bytes of the datagram, a signed 32-bit
    /// big-endian integer in watts.
    ///
    /// # Errors
    /// - `HemsError::UnexpectedLength` when `datalen` is not `0012`
    /// - `HemsError::Protocol` when the data is too short or not hex
    pub fn decode_power(&self) -> HemsResult<i64> {
        if self.datalen != POWER_RESPONSE_LEN {
            return Err(HemsError::UnexpectedLength {
                expected: POWER_RESPONSE_LEN.to_string(),
                actual: self.datalen.clone(),
            });
        }

        let tail = self
            .data
            .len()
            .checked_sub(8)
            .and_then(|start| self.data.get(start..))
            .ok_or_else(|| {
                HemsError::Protocol(format!("Power payload too short: {}", self.data))
            })?;
        if !tail.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HemsError::Protocol(format!("Power value is not hex: {}", tail)));
        }
        let raw = u32::from_str_radix(tail, 16)
            .map_err(|e| HemsError::Protocol(format!("Power value is not hex: {}", e)))?;

        if !self.carries_power_property() {
            log::debug!("power response without E7 property marker: {}", self.data);
        }
        Ok(i64::from(raw as i32))
    }

    /// Whether the EPC ahead of the value is the instantaneous power property
    fn carries_power_property(&self) -> bool {
        let len = self.data.len();
        len >= 12
            && self
                .data
                .get(len - 12..len - 10)
                .and_then(|epc| u8::from_str_radix(epc, 16).ok())
                == Some(EPC_INSTANTANEOUS_POWER)
    }
}
