//! Static VLAN table.

use super::types::VlanTableEntry;
use crate::error::{Result, SwitchError, TableKind};
use crate::fid::ForwardingDomainTable;
use crate::types::{PortMask, VLAN_ID_MAX, VLAN_TABLE_ENTRIES};

/// Fixed-capacity VLAN table.
///
/// Every valid row holds one reference on its forwarding domain in the
/// [`ForwardingDomainTable`] passed to the mutating calls.
#[derive(Debug, Clone)]
pub struct VlanTable {
    entries: Vec<VlanTableEntry>,
    dirty: bool,
}

impl VlanTable {
    pub fn new() -> Self {
        Self::with_capacity(VLAN_TABLE_ENTRIES)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: vec![VlanTableEntry::default(); capacity],
            dirty: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Adds a VLAN in its own forwarding domain.
    pub fn add(
        &mut self,
        fids: &mut ForwardingDomainTable,
        vid: u16,
        member: PortMask,
    ) -> Result<usize> {
        let index = self.free_slot(vid)?;
        let fid = fids.acquire(vid)?;
        self.install(index, vid, fid, member);
        Ok(index)
    }

    /// Adds a VLAN sharing the already held domain `fid`.
    pub fn add_to_domain(
        &mut self,
        fids: &mut ForwardingDomainTable,
        vid: u16,
        member: PortMask,
        fid: u16,
    ) -> Result<usize> {
        let index = self.free_slot(vid)?;
        fids.retain(fid)?;
        self.install(index, vid, fid, member);
        Ok(index)
    }

    /// Removes a VLAN and drops its domain reference.
    ///
    /// The domain's VLAN binding is cleared only once no remaining row
    /// refers to the domain.
    pub fn remove(&mut self, fids: &mut ForwardingDomainTable, vid: u16) -> Result<VlanTableEntry> {
        let index = self.lookup(vid)?;
        let fid = self.entries[index].fid;
        let remaining = fids.release(fid)?;

        let entry = &mut self.entries[index];
        let removed = *entry;
        entry.valid = false;
        entry.dirty = true;
        self.dirty = true;

        if remaining == 0 && !self.references(fid) {
            fids.unbind(fid);
        }
        Ok(removed)
    }

    pub fn lookup(&self, vid: u16) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.valid && e.vid == vid)
            .ok_or_else(|| SwitchError::not_found(TableKind::Vlan, vid))
    }

    pub fn member_ports(&self, vid: u16) -> Result<PortMask> {
        self.lookup(vid).map(|index| self.entries[index].member)
    }

    pub fn fid(&self, vid: u16) -> Result<u16> {
        self.lookup(vid).map(|index| self.entries[index].fid)
    }

    /// Replaces the member ports of an existing VLAN.
    pub fn set_members(&mut self, vid: u16, member: PortMask) -> Result<()> {
        let index = self.lookup(vid)?;
        let entry = &mut self.entries[index];
        if entry.member != member {
            entry.member = member;
            entry.dirty = true;
            self.dirty = true;
        }
        Ok(())
    }

    /// True if a valid row uses forwarding domain `fid`.
    pub fn references(&self, fid: u16) -> bool {
        self.entries.iter().any(|e| e.valid && e.fid == fid)
    }

    pub fn get(&self, index: usize) -> Option<&VlanTableEntry> {
        self.entries.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &VlanTableEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.valid)
    }

    pub fn dirty_entries(&self) -> impl Iterator<Item = (usize, &VlanTableEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.dirty)
    }

    /// Clears the dirty flag if the row still holds `written`.
    pub fn mark_clean(&mut self, index: usize, written: &VlanTableEntry) -> bool {
        let Some(entry) = self.entries.get_mut(index) else {
            return false;
        };
        if !entry.same_contents(written) {
            return false;
        }
        entry.dirty = false;
        self.dirty = self.entries.iter().any(|e| e.dirty);
        true
    }

    fn free_slot(&self, vid: u16) -> Result<usize> {
        if vid == 0 || vid > VLAN_ID_MAX {
            return Err(SwitchError::InvalidVlan(vid));
        }
        if self.lookup(vid).is_ok() {
            return Err(SwitchError::already_exists(TableKind::Vlan, vid));
        }
        self.entries
            .iter()
            .position(|e| !e.valid)
            .ok_or(SwitchError::CapacityExceeded(TableKind::Vlan))
    }

    fn install(&mut self, index: usize, vid: u16, fid: u16, member: PortMask) {
        self.entries[index] = VlanTableEntry {
            vid,
            fid,
            member,
            valid: true,
            dirty: true,
        };
        self.dirty = true;
    }
}

impl Default for VlanTable {
    fn default() -> Self {
        Self::new()
    }
}
