//! Forwarding domain (FID) allocator.
//!
//! Maps VLAN ids onto the chip's 7-bit forwarding domain ids with
//! reference counting. Id 0 means "no isolation" and is never handed out.
//!
//! Teardown is two-step: [`ForwardingDomainTable::release`] only drops the
//! reference; the VLAN binding stays until [`ForwardingDomainTable::unbind`]
//! is called once no VLAN entry uses the domain any more.

use crate::error::{Result, SwitchError};
use crate::types::FID_ENTRIES;

/// Reserved "no isolation" domain.
pub const FID_NONE: u16 = 0;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct DomainSlot {
    vid: Option<u16>,
    ref_count: u32,
}

/// Fixed pool of forwarding domain ids.
#[derive(Debug, Clone)]
pub struct ForwardingDomainTable {
    slots: Vec<DomainSlot>,
}

impl ForwardingDomainTable {
    pub fn new() -> Self {
        Self::with_capacity(FID_ENTRIES)
    }

    /// Pool of `capacity` ids, the reserved id 0 included.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![DomainSlot::default(); capacity.clamp(1, FID_ENTRIES)],
        }
    }

    /// Returns the domain bound to `vid`, allocating the lowest free id if
    /// the VLAN has none. Increments the reference count either way.
    pub fn acquire(&mut self, vid: u16) -> Result<u16> {
        if let Some(fid) = self.fid_of(vid) {
            self.slots[usize::from(fid)].ref_count += 1;
            return Ok(fid);
        }

        let fid = self
            .slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| slot.ref_count == 0)
            .map(|(fid, _)| fid)
            .ok_or(SwitchError::DomainsExhausted)?;

        self.slots[fid] = DomainSlot {
            vid: Some(vid),
            ref_count: 1,
        };
        Ok(fid as u16)
    }

    /// Adds a reference to a domain that is already held.
    pub fn retain(&mut self, fid: u16) -> Result<u32> {
        let slot = self.held_slot_mut(fid)?;
        slot.ref_count += 1;
        Ok(slot.ref_count)
    }

    /// Drops one reference and returns the count left. At zero the id may
    /// be reallocated, but its VLAN binding is kept until [`unbind`](Self::unbind).
    pub fn release(&mut self, fid: u16) -> Result<u32> {
        let slot = self.held_slot_mut(fid)?;
        slot.ref_count -= 1;
        Ok(slot.ref_count)
    }

    /// Clears the VLAN binding of an unreferenced domain.
    ///
    /// Returns false if the domain is still referenced or was not bound.
    pub fn unbind(&mut self, fid: u16) -> bool {
        match self.slots.get_mut(usize::from(fid)) {
            Some(slot) if fid != FID_NONE && slot.ref_count == 0 && slot.vid.is_some() => {
                slot.vid = None;
                true
            }
            _ => false,
        }
    }

    /// Domain currently bound to `vid`, referenced or not.
    pub fn fid_of(&self, vid: u16) -> Option<u16> {
        self.slots
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, slot)| slot.vid == Some(vid))
            .map(|(fid, _)| fid as u16)
    }

    pub fn vid_of(&self, fid: u16) -> Option<u16> {
        self.slots.get(usize::from(fid)).and_then(|slot| slot.vid)
    }

    pub fn ref_count(&self, fid: u16) -> u32 {
        self.slots
            .get(usize::from(fid))
            .map_or(0, |slot| slot.ref_count)
    }

    pub fn is_held(&self, fid: u16) -> bool {
        fid != FID_NONE && self.ref_count(fid) > 0
    }

    /// Number of ids that can be handed out, the reserved id excluded.
    pub fn capacity(&self) -> usize {
        self.slots.len() - 1
    }

    pub fn free_count(&self) -> usize {
        self.slots
            .iter()
            .skip(1)
            .filter(|slot| slot.ref_count == 0)
            .count()
    }

    fn held_slot_mut(&mut self, fid: u16) -> Result<&mut DomainSlot> {
        if fid == FID_NONE {
            return Err(SwitchError::DomainNotHeld(fid));
        }
        self.slots
            .get_mut(usize::from(fid))
            .filter(|slot| slot.ref_count > 0)
            .ok_or(SwitchError::DomainNotHeld(fid))
    }
}

impl Default for ForwardingDomainTable {
    fn default() -> Self {
        Self::new()
    }
}
