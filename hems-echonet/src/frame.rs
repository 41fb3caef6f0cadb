//! ECHONET Lite frame encoding
//!
//! # Frame Layout (format 1)
//!
//! ```text
//! EHD1 EHD2 TID(2) SEOJ(3) DEOJ(3) ESV OPC { EPC PDC EDT(PDC) }*
//! ```
//!
//! All multi-byte fields are big-endian.

use bytes::{BufMut, BytesMut};
use hems_core::{HemsError, HemsResult};

/// ECHONET Lite header byte 1
pub const EHD1: u8 = 0x10;
/// Header byte 2 for format 1 (specified message format)
pub const EHD2_FORMAT1: u8 = 0x81;
/// Property code of the instantaneous power measurement
pub const EPC_INSTANTANEOUS_POWER: u8 = 0xE7;

/// ECHONET object identifier (class group, class, instance)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EchonetObject {
    pub class_group: u8,
    pub class: u8,
    pub instance: u8,
}

impl EchonetObject {
    /// Controller, instance 1
    pub const CONTROLLER: Self = Self::new(0x05, 0xFF, 0x01);
    /// Low-voltage smart electric energy meter, instance 1
    pub const SMART_METER: Self = Self::new(0x02, 0x88, 0x01);

    pub const fn new(class_group: u8, class: u8, instance: u8) -> Self {
        Self {
            class_group,
            class,
            instance,
        }
    }

    pub fn to_bytes(self) -> [u8; 3] {
        [self.class_group, self.class, self.instance]
    }
}

/// ECHONET Lite service code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Esv {
    /// Property value read request
    Get,
    /// Property value read response
    GetRes,
    /// Property value read request not possible
    GetSna,
}

impl Esv {
    pub fn as_u8(self) -> u8 {
        match self {
            Esv::Get => 0x62,
            Esv::GetRes => 0x72,
            Esv::GetSna => 0x52,
        }
    }
}

/// One property of a frame; a read request carries an empty `edt`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub epc: u8,
    pub edt: Vec<u8>,
}

impl Property {
    /// Property entry of a read request
    pub fn request(epc: u8) -> Self {
        Self { epc, edt: Vec::new() }
    }
}

/// ECHONET Lite format 1 frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EchonetFrame {
    pub tid: u16,
    pub seoj: EchonetObject,
    pub deoj: EchonetObject,
    pub esv: Esv,
    pub properties: Vec<Property>,
}

impl EchonetFrame {
    /// Read request for the meter's instantaneous power
    pub fn power_request() -> Self {
        Self {
            tid: 0x0001,
            seoj: EchonetObject::CONTROLLER,
            deoj: EchonetObject::SMART_METER,
            esv: Esv::Get,
            properties: vec![Property::request(EPC_INSTANTANEOUS_POWER)],
        }
    }

    /// Encode the frame to bytes
    ///
    /// # Errors
    /// Returns `HemsError::InvalidData` when the property count or a property
    /// value does not fit its one-byte length field.
    pub fn encode(&self) -> HemsResult<Vec<u8>> {
        let opc = u8::try_from(self.properties.len()).map_err(|_| {
            HemsError::InvalidData(format!("Too many properties: {}", self.properties.len()))
        })?;

        let mut buf = BytesMut::with_capacity(12 + self.properties.len() * 2);
        buf.put_u8(EHD1);
        buf.put_u8(EHD2_FORMAT1);
        buf.put_u16(self.tid);
        buf.put_slice(&self.seoj.to_bytes());
        buf.put_slice(&self.deoj.to_bytes());
        buf.put_u8(self.esv.as_u8());
        buf.put_u8(opc);

        for property in &self.properties {
            let pdc = u8::try_from(property.edt.len()).map_err(|_| {
                HemsError::InvalidData(format!(
                    "Property 0x{:02X} value too long: {} bytes",
                    property.epc,
                    property.edt.len()
                ))
            })?;
            buf.put_u8(property.epc);
            buf.put_u8(pdc);
            buf.put_slice(&property.edt);
        }

        Ok(buf.to_vec())
    }
}
