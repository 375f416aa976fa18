//! VLAN table types.

use crate::types::PortMask;
use serde::Serialize;

/// One row of the static VLAN table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct VlanTableEntry {
    pub vid: u16,
    /// Forwarding domain the VLAN belongs to.
    pub fid: u16,
    pub member: PortMask,
    pub valid: bool,
    pub dirty: bool,
}

impl VlanTableEntry {
    /// Contents as the chip sees them, ignoring the dirty flag.
    pub fn same_contents(&self, other: &VlanTableEntry) -> bool {
        VlanTableEntry {
            dirty: false,
            ..*self
        } == VlanTableEntry {
            dirty: false,
            ..*other
        }
    }
}
