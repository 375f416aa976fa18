//! Common switch types and chip capacity constants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitAnd, BitOr, Not};
use std::str::FromStr;

/// Total number of physical ports, host port included.
pub const TOTAL_PORT_NUM: usize = 5;

/// Host port can only be last of them.
pub const HOST_PORT: usize = TOTAL_PORT_NUM - 1;

/// Number of external switch ports.
pub const SWITCH_PORT_NUM: usize = TOTAL_PORT_NUM - 1;

/// Static MAC table entries.
pub const STATIC_MAC_TABLE_ENTRIES: usize = 32;

/// Static VLAN table rows (4096 VIDs, four per hardware row).
pub const VLAN_TABLE_ENTRIES: usize = 4096 / 4;

/// Forwarding domain id space. Id 0 is reserved for "no isolation".
pub const FID_ENTRIES: usize = 128;

/// Priority queues per port.
pub const PRIO_QUEUES: usize = 4;

/// Largest valid 802.1Q VLAN id.
pub const VLAN_ID_MAX: u16 = 4095;

/// Minimum Ethernet frame length without FCS.
pub const ETH_ZLEN: usize = 60;

/// Ethernet MAC address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress {
    bytes: [u8; 6],
}

impl MacAddress {
    pub const BROADCAST: MacAddress = MacAddress { bytes: [0xff; 6] };

    pub const fn new(bytes: [u8; 6]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; 6] {
        &self.bytes
    }

    /// Group bit of the first octet.
    pub fn is_multicast(&self) -> bool {
        self.bytes[0] & 0x01 != 0
    }

    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }

    pub fn is_zero(&self) -> bool {
        self.bytes == [0; 6]
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(|c| c == ':' || c == '-').collect();
        if parts.len() != 6 {
            return Err(format!("Invalid MAC address format: {}", s));
        }
        let mut bytes = [0u8; 6];
        for (i, part) in parts.iter().enumerate() {
            if part.len() != 2 {
                return Err(format!("Invalid octet in MAC: {}", part));
            }
            bytes[i] =
                u8::from_str_radix(part, 16).map_err(|_| format!("Invalid hex in MAC: {}", part))?;
        }
        Ok(Self { bytes })
    }
}

impl TryFrom<String> for MacAddress {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = &self.bytes;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Bitmask of physical ports. Bit `i` is physical port `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PortMask(u8);

impl PortMask {
    pub const EMPTY: PortMask = PortMask(0);

    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Mask with only `port` set. Ports beyond the mask width yield an empty mask.
    pub fn single(port: usize) -> Self {
        if port < 8 {
            Self(1 << port)
        } else {
            Self::EMPTY
        }
    }

    /// Mask covering the first `count` ports.
    pub fn all(count: usize) -> Self {
        if count >= 8 {
            Self(0xff)
        } else {
            Self(((1u16 << count) - 1) as u8)
        }
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, port: usize) -> bool {
        port < 8 && self.0 & (1 << port) != 0
    }

    pub fn count(self) -> u32 {
        self.0.count_ones()
    }

    pub fn with(self, port: usize) -> Self {
        self | Self::single(port)
    }

    pub fn without(self, port: usize) -> Self {
        self & !Self::single(port)
    }

    /// True when every set bit is below `count`.
    pub fn fits(self, count: usize) -> bool {
        self & !Self::all(count) == Self::EMPTY
    }

    pub fn ports(self) -> impl Iterator<Item = usize> {
        (0..8).filter(move |p| self.contains(*p))
    }
}

impl BitAnd for PortMask {
    type Output = PortMask;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl BitOr for PortMask {
    type Output = PortMask;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl Not for PortMask {
    type Output = PortMask;

    fn not(self) -> Self {
        Self(!self.0)
    }
}

impl From<u8> for PortMask {
    fn from(bits: u8) -> Self {
        Self(bits)
    }
}

impl fmt::Display for PortMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#04x}", self.0)
    }
}
