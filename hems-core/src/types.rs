//! Snapshots read from the dongle during bring-up

/// Network information reported by `SKINFO`
///
/// Built from an `EINFO <ip> <mac> <channel> <panid> <side>` line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceInfo {
    /// Local IPv6 address of the dongle
    pub ipv6_address: String,
    /// 64-bit MAC address of the dongle
    pub mac_address: String,
    /// Current radio channel
    pub channel: String,
    /// Current PAN ID
    pub pan_id: String,
    /// Side (B-route / HAN) selector
    pub side: String,
}

impl DeviceInfo {
    /// Build from the fields following the `EINFO` token
    ///
    /// Missing trailing fields are left empty; the IPv6 address is required.
    pub fn from_fields<'a, I>(fields: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut info = DeviceInfo::default();
        for (i, field) in fields.into_iter().enumerate() {
            match i {
                0 => info.ipv6_address = field.to_string(),
                1 => info.mac_address = field.to_string(),
                2 => info.channel = field.to_string(),
                3 => info.pan_id = field.to_string(),
                4 => info.side = field.to_string(),
                _ => {}
            }
        }
        if info.ipv6_address.is_empty() {
            None
        } else {
            Some(info)
        }
    }
}

/// PAN found by an active scan
///
/// An empty `addr` means no coordinator answered the scan.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PanDescriptor {
    pub channel: String,
    pub channel_page: String,
    pub pan_id: String,
    /// 64-bit address of the meter
    pub addr: String,
    /// Link quality indicator
    pub lqi: String,
    pub pair_id: String,
}

impl PanDescriptor {
    /// A descriptor is usable only if the meter address is known
    pub fn is_found(&self) -> bool {
        !self.addr.is_empty()
    }
}

/// Address pair of an established session
///
/// Written once during bring-up and only read afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEndpoints {
    /// IPv6 address of the dongle (from `SKINFO`)
    pub local: String,
    /// Link-local IPv6 address of the meter (from `SKLL64`)
    pub remote: String,
}
