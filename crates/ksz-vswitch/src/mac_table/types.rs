//! Static MAC table types.

use crate::types::{MacAddress, PortMask};
use serde::Serialize;
use std::fmt;
use std::ops::BitOr;

/// One row of the static MAC table.
///
/// `dirty` means the row has not been written to the chip since it last
/// changed. An invalid row can still be dirty: the chip must be told to
/// invalidate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MacTableEntry {
    pub address: MacAddress,
    pub fid: u16,
    pub ports: PortMask,
    /// Entry ports replace VLAN membership instead of narrowing it.
    pub overrides: bool,
    /// Entry only matches frames in its own forwarding domain.
    pub use_fid: bool,
    pub valid: bool,
    pub dirty: bool,
}

impl MacTableEntry {
    /// True if this valid entry applies to frames of forwarding domain `fid`.
    pub fn matches(&self, address: &MacAddress, fid: u16) -> bool {
        self.valid && self.address == *address && (!self.use_fid || self.fid == fid)
    }

    /// Contents as the chip sees them, ignoring the dirty flag.
    pub fn same_contents(&self, other: &MacTableEntry) -> bool {
        MacTableEntry {
            dirty: false,
            ..*self
        } == MacTableEntry {
            dirty: false,
            ..*other
        }
    }
}

/// Why an address is forwarded the way it is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct ForwardReason(u8);

impl ForwardReason {
    pub const HOST_OVERRIDE: ForwardReason = ForwardReason(1 << 0);
    pub const HOST: ForwardReason = ForwardReason(1 << 1);
    pub const STP_DEV: ForwardReason = ForwardReason(1 << 2);
    pub const MAIN_DEV: ForwardReason = ForwardReason(1 << 3);
    pub const VLAN_DEV: ForwardReason = ForwardReason(1 << 4);

    /// Number of distinct reasons.
    pub const COUNT: usize = 5;

    pub const fn empty() -> Self {
        ForwardReason(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn contains(self, other: ForwardReason) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ForwardReason) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ForwardReason) {
        self.0 &= !other.0;
    }

    /// Bit positions of the reasons set, each below [`COUNT`](Self::COUNT).
    pub fn bit_indices(self) -> impl Iterator<Item = usize> {
        (0..Self::COUNT).filter(move |&bit| self.0 & (1 << bit) != 0)
    }
}

impl BitOr for ForwardReason {
    type Output = ForwardReason;

    fn bitor(self, rhs: Self) -> Self {
        ForwardReason(self.0 | rhs.0)
    }
}

impl fmt::Display for ForwardReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(ForwardReason, &str); 5] = [
            (ForwardReason::HOST_OVERRIDE, "host_override"),
            (ForwardReason::HOST, "host"),
            (ForwardReason::STP_DEV, "stp_dev"),
            (ForwardReason::MAIN_DEV, "main_dev"),
            (ForwardReason::VLAN_DEV, "vlan_dev"),
        ];
        let names: Vec<&str> = NAMES
            .iter()
            .filter(|(reason, _)| self.contains(*reason))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}

/// Ownership metadata paired by index with a [`MacTableEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct AluEntry {
    /// Tag of the device that installed the address. Later joiners do not
    /// replace it.
    pub owner: u8,
    pub forward: ForwardReason,
    /// Ports each reason asked for, indexed by reason bit.
    pub reason_ports: [PortMask; ForwardReason::COUNT],
    pub valid: bool,
}

impl AluEntry {
    /// Union of the ports of every reason still recorded.
    pub fn ports(&self) -> PortMask {
        self.forward
            .bit_indices()
            .fold(PortMask::EMPTY, |mask, bit| mask | self.reason_ports[bit])
    }
}
