//! Per-port configuration and spanning tree state.

use crate::types::{PortMask, PRIO_QUEUES};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Spanning tree port state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum StpState {
    #[default]
    Disabled = 0,
    Listening = 1,
    Learning = 2,
    Forwarding = 3,
    Blocked = 4,
    /// Spanning tree not in use: the port always forwards.
    Simple = 5,
}

impl StpState {
    /// Parses an STP state from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "0" | "disabled" => Some(Self::Disabled),
            "1" | "listening" => Some(Self::Listening),
            "2" | "learning" => Some(Self::Learning),
            "3" | "forwarding" => Some(Self::Forwarding),
            "4" | "blocked" | "blocking" => Some(Self::Blocked),
            "5" | "simple" => Some(Self::Simple),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Listening => "listening",
            Self::Learning => "learning",
            Self::Forwarding => "forwarding",
            Self::Blocked => "blocked",
            Self::Simple => "simple",
        }
    }

    pub fn allows_forwarding(self) -> bool {
        matches!(self, Self::Forwarding | Self::Simple)
    }

    /// States in which spanning tree control frames may still be received.
    pub fn admits_control_frames(self) -> bool {
        matches!(self, Self::Listening | Self::Learning)
    }
}

impl FromStr for StpState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("Invalid STP state: {}", s))
    }
}

impl fmt::Display for StpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration of one physical port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortConfig {
    /// Default VLAN for untagged frames.
    pub vid: u16,
    /// Ports this port may forward to.
    pub member: PortMask,
    pub port_prio: u8,
    pub rate_ctrl: [u8; PRIO_QUEUES],
    /// Receive rate per priority, in units of 64 kbps.
    pub rx_rate: [u32; PRIO_QUEUES],
    /// Transmit rate per priority, in units of 64 kbps.
    pub tx_rate: [u32; PRIO_QUEUES],
    pub rate_limit: u8,
    /// VLANs this port belongs to, as a port mask of the VLAN devices.
    pub vid_member: PortMask,
    pub stp_state: StpState,
}

impl PortConfig {
    pub fn new(member: PortMask, stp_state: StpState) -> Self {
        Self {
            vid: 1,
            member,
            port_prio: 0,
            rate_ctrl: [0; PRIO_QUEUES],
            rx_rate: [0; PRIO_QUEUES],
            tx_rate: [0; PRIO_QUEUES],
            rate_limit: 0,
            vid_member: member,
            stp_state,
        }
    }
}
