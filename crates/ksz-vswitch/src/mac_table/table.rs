//! Static MAC table with its paired ALU ownership table.

use super::types::{AluEntry, ForwardReason, MacTableEntry};
use crate::error::{Result, SwitchError, TableKind};
use crate::types::{MacAddress, PortMask, FID_ENTRIES, STATIC_MAC_TABLE_ENTRIES};

/// Fixed-capacity static MAC table.
///
/// Slots are allocated first-fit. Every mutation leaves the touched rows
/// dirty until the hardware commit path clears them.
#[derive(Debug, Clone)]
pub struct AddressTable {
    entries: Vec<MacTableEntry>,
    alu: Vec<AluEntry>,
    dirty: bool,
}

impl AddressTable {
    pub fn new() -> Self {
        Self::with_capacity(STATIC_MAC_TABLE_ENTRIES)
    }

    /// Table with `capacity` slots. The capacity never changes afterwards.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: vec![MacTableEntry::default(); capacity],
            alu: vec![AluEntry::default(); capacity],
            dirty: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// Number of valid entries.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|e| e.valid).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.entries.iter().all(|e| e.valid)
    }

    /// True if any row awaits a hardware write.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Adds a static address and returns its slot index.
    pub fn add(
        &mut self,
        address: MacAddress,
        fid: u16,
        ports: PortMask,
        overrides: bool,
        use_fid: bool,
    ) -> Result<usize> {
        if usize::from(fid) >= FID_ENTRIES {
            return Err(SwitchError::DomainNotHeld(fid));
        }
        if self.lookup(&address, fid).is_ok() {
            return Err(SwitchError::already_exists(
                TableKind::StaticMac,
                entry_key(&address, fid),
            ));
        }
        let index = self
            .entries
            .iter()
            .position(|e| !e.valid)
            .ok_or(SwitchError::CapacityExceeded(TableKind::StaticMac))?;

        self.entries[index] = MacTableEntry {
            address,
            fid,
            ports,
            overrides,
            use_fid,
            valid: true,
            dirty: true,
        };
        self.alu[index] = AluEntry {
            valid: true,
            ..AluEntry::default()
        };
        self.dirty = true;
        Ok(index)
    }

    /// Invalidates the entry at `index` and returns its last contents.
    pub fn remove(&mut self, index: usize) -> Result<MacTableEntry> {
        let entry = self
            .entries
            .get_mut(index)
            .filter(|e| e.valid)
            .ok_or_else(|| SwitchError::not_found(TableKind::StaticMac, index))?;

        let removed = *entry;
        entry.valid = false;
        entry.dirty = true;
        self.alu[index] = AluEntry::default();
        self.dirty = true;
        Ok(removed)
    }

    /// Exact lookup of an (address, forwarding domain) pair.
    pub fn lookup(&self, address: &MacAddress, fid: u16) -> Result<usize> {
        self.entries
            .iter()
            .position(|e| e.valid && e.address == *address && e.fid == fid)
            .ok_or_else(|| SwitchError::not_found(TableKind::StaticMac, entry_key(address, fid)))
    }

    /// Entry the chip would use for a frame to `address` in domain `fid`.
    ///
    /// Entries bound to `fid` win over entries that ignore the domain.
    pub fn find_forwarding(&self, address: &MacAddress, fid: u16) -> Option<&MacTableEntry> {
        let mut fallback = None;
        for entry in self.entries.iter().filter(|e| e.matches(address, fid)) {
            if entry.use_fid {
                return Some(entry);
            }
            if fallback.is_none() {
                fallback = Some(entry);
            }
        }
        fallback
    }

    /// Rewrites port membership and override of a valid entry in place.
    pub fn update(&mut self, index: usize, ports: PortMask, overrides: bool) -> Result<()> {
        let entry = self
            .entries
            .get_mut(index)
            .filter(|e| e.valid)
            .ok_or_else(|| SwitchError::not_found(TableKind::StaticMac, index))?;

        if entry.ports != ports || entry.overrides != overrides {
            entry.ports = ports;
            entry.overrides = overrides;
            entry.dirty = true;
            self.dirty = true;
        }
        Ok(())
    }

    /// Invalidates every row. Returns how many rows were valid.
    pub fn flush(&mut self) -> usize {
        let mut flushed = 0;
        for (entry, alu) in self.entries.iter_mut().zip(self.alu.iter_mut()) {
            if entry.valid {
                flushed += 1;
            }
            entry.valid = false;
            entry.dirty = true;
            *alu = AluEntry::default();
        }
        self.dirty = true;
        flushed
    }

    /// Invalidates every entry keyed on forwarding domain `fid`.
    /// Returns how many entries were removed.
    pub fn remove_domain(&mut self, fid: u16) -> usize {
        let mut removed = 0;
        for (entry, alu) in self.entries.iter_mut().zip(self.alu.iter_mut()) {
            if entry.valid && entry.fid == fid {
                entry.valid = false;
                entry.dirty = true;
                *alu = AluEntry::default();
                removed += 1;
            }
        }
        if removed > 0 {
            self.dirty = true;
        }
        removed
    }

    pub fn get(&self, index: usize) -> Option<&MacTableEntry> {
        self.entries.get(index)
    }

    pub fn alu(&self, index: usize) -> Option<&AluEntry> {
        self.alu.get(index).filter(|a| a.valid)
    }

    /// Records that `owner` forwards this address to `ports` for `reason`.
    ///
    /// The first owner to record a reason stays the entry's owner.
    pub fn add_reason(
        &mut self,
        index: usize,
        owner: u8,
        reason: ForwardReason,
        ports: PortMask,
    ) -> Result<()> {
        let alu = self.alu_mut(index)?;
        if alu.forward.is_empty() {
            alu.owner = owner;
        }
        for bit in reason.bit_indices() {
            alu.reason_ports[bit] = alu.reason_ports[bit] | ports;
        }
        alu.forward.insert(reason);
        Ok(())
    }

    /// Drops `reason` together with the ports it asked for and returns the
    /// reasons left.
    pub fn drop_reason(&mut self, index: usize, reason: ForwardReason) -> Result<ForwardReason> {
        let alu = self.alu_mut(index)?;
        for bit in reason.bit_indices() {
            alu.reason_ports[bit] = PortMask::EMPTY;
        }
        alu.forward.remove(reason);
        Ok(alu.forward)
    }

    fn alu_mut(&mut self, index: usize) -> Result<&mut AluEntry> {
        self.alu
            .get_mut(index)
            .filter(|a| a.valid)
            .ok_or_else(|| SwitchError::not_found(TableKind::StaticMac, index))
    }

    /// Valid entries with their slot index.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &MacTableEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.valid)
    }

    /// Rows awaiting a hardware write, valid or not.
    pub fn dirty_entries(&self) -> impl Iterator<Item = (usize, &MacTableEntry)> {
        self.entries.iter().enumerate().filter(|(_, e)| e.dirty)
    }

    /// Clears the dirty flag if the row still holds `written`.
    ///
    /// Returns false when the row changed after the snapshot was taken;
    /// it then stays dirty for the next commit.
    pub fn mark_clean(&mut self, index: usize, written: &MacTableEntry) -> bool {
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
}

impl Default for AddressTable {
    fn default() -> Self {
        Self::new()
    }
}

fn entry_key(address: &MacAddress, fid: u16) -> String {
    format!("{}/{}", address, fid)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mac(last: u8) -> MacAddress {
        MacAddress::new([0x00, 0x10, 0xa1, 0x00, 0x00, last])
    }

    #[test]
    fn test_add_then_lookup_returns_same_entry() {
        let mut table = AddressTable::new();
        let index = table
            .add(mac(1), 2, PortMask::from_bits(0x05), false, true)
            .unwrap();

        assert_eq!(table.lookup(&mac(1), 2).unwrap(), index);
        assert_eq!(
            *table.get(index).unwrap(),
            MacTableEntry {
                address: mac(1),
                fid: 2,
                ports: PortMask::from_bits(0x05),
                overrides: false,
                use_fid: true,
                valid: true,
                dirty: true,
            }
        );
        assert!(table.is_dirty());
    }

    #[test]
    fn test_duplicate_add_rejected() {
        let mut table = AddressTable::new();
        table.add(mac(1), 0, PortMask::from_bits(1), false, false).unwrap();

        let err = table
            .add(mac(1), 0, PortMask::from_bits(2), true, false)
            .unwrap_err();
        assert!(matches!(
            err,
            SwitchError::AlreadyExists {
                table: TableKind::StaticMac,
                ..
            }
        ));

        // Same address in another domain is a different key.
        assert!(table.add(mac(1), 1, PortMask::from_bits(2), false, true).is_ok());
    }

    #[test]
    fn test_capacity_and_slot_reuse() {
        let mut table = AddressTable::with_capacity(4);
        for i in 0..4 {
            assert_eq!(table.add(mac(i), 0, PortMask::from_bits(1), false, false).unwrap(), i as usize);
        }
        assert!(table.is_full());
        assert!(matches!(
            table.add(mac(9), 0, PortMask::from_bits(1), false, false),
            Err(SwitchError::CapacityExceeded(TableKind::StaticMac))
        ));

        table.remove(2).unwrap();
        assert_eq!(table.add(mac(9), 0, PortMask::from_bits(1), false, false).unwrap(), 2);
    }

    #[test]
    fn test_default_capacity() {
        let mut table = AddressTable::new();
        for i in 0..STATIC_MAC_TABLE_ENTRIES {
            table
                .add(mac(i as u8), 0, PortMask::from_bits(1), false, false)
                .unwrap();
        }
        assert_eq!(table.len(), STATIC_MAC_TABLE_ENTRIES);
        assert!(table
            .add(mac(0xfe), 0, PortMask::from_bits(1), false, false)
            .is_err());
    }

    #[test]
    fn test_remove_marks_invalid_and_dirty() {
        let mut table = AddressTable::new();
        let index = table.add(mac(1), 0, PortMask::from_bits(1), false, false).unwrap();
        let written = *table.get(index).unwrap();
        assert!(table.mark_clean(index, &written));

        let removed = table.remove(index).unwrap();
        assert_eq!(removed.address, mac(1));
        let entry = table.get(index).unwrap();
        assert!(!entry.valid);
        assert!(entry.dirty);
        assert!(table.alu(index).is_none());
    }

    #[test]
    fn test_remove_not_found() {
        let mut table = AddressTable::with_capacity(2);
        assert!(matches!(table.remove(0), Err(SwitchError::NotFound { .. })));
        assert!(matches!(table.remove(7), Err(SwitchError::NotFound { .. })));

        let index = table.add(mac(1), 0, PortMask::from_bits(1), false, false).unwrap();
        table.remove(index).unwrap();
        assert!(matches!(table.remove(index), Err(SwitchError::NotFound { .. })));
    }

    #[test]
    fn test_fid_out_of_range() {
        let mut table = AddressTable::new();
        assert!(matches!(
            table.add(mac(1), FID_ENTRIES as u16, PortMask::from_bits(1), false, true),
            Err(SwitchError::DomainNotHeld(_))
        ));
    }

    #[test]
    fn test_find_forwarding_prefers_domain_bound_entry() {
        let mut table = AddressTable::new();
        table.add(mac(1), 0, PortMask::from_bits(0x01), false, false).unwrap();
        table.add(mac(1), 5, PortMask::from_bits(0x02), false, true).unwrap();

        assert_eq!(table.find_forwarding(&mac(1), 5).unwrap().ports.bits(), 0x02);
        assert_eq!(table.find_forwarding(&mac(1), 6).unwrap().ports.bits(), 0x01);
        assert!(table.find_forwarding(&mac(2), 5).is_none());
    }

    #[test]
    fn test_update_in_place() {
        let mut table = AddressTable::new();
        let index = table.add(mac(1), 0, PortMask::from_bits(1), false, false).unwrap();
        let written = *table.get(index).unwrap();
        table.mark_clean(index, &written);
        assert!(!table.is_dirty());

        table.update(index, PortMask::from_bits(0x06), true).unwrap();
        let entry = table.get(index).unwrap();
        assert_eq!(entry.ports.bits(), 0x06);
        assert!(entry.overrides);
        assert!(entry.dirty);
        assert!(table.update(9, PortMask::EMPTY, false).is_err());
    }

    #[test]
    fn test_flush_invalidates_everything() {
        let mut table = AddressTable::with_capacity(4);
        table.add(mac(1), 0, PortMask::from_bits(1), false, false).unwrap();
        table.add(mac(2), 0, PortMask::from_bits(1), false, false).unwrap();

        assert_eq!(table.flush(), 2);
        assert!(table.is_empty());
        assert_eq!(table.dirty_entries().count(), 4);
    }

    #[test]
    fn test_mark_clean_skips_changed_row() {
        let mut table = AddressTable::new();
        let index = table.add(mac(1), 0, PortMask::from_bits(1), false, false).unwrap();
        let snapshot = *table.get(index).unwrap();

        table.update(index, PortMask::from_bits(3), false).unwrap();
        assert!(!table.mark_clean(index, &snapshot));
        assert!(table.get(index).unwrap().dirty);
        assert!(table.is_dirty());
    }

    #[test]
    fn test_forward_reasons() {
        let mut table = AddressTable::new();
        let index = table.add(mac(1), 0, PortMask::from_bits(1), false, false).unwrap();

        table
            .add_reason(index, 2, ForwardReason::MAIN_DEV, PortMask::from_bits(0b001))
            .unwrap();
        table
            .add_reason(index, 3, ForwardReason::VLAN_DEV, PortMask::from_bits(0b100))
            .unwrap();
        let alu = *table.alu(index).unwrap();
        assert_eq!(alu.owner, 2);
        assert_eq!(alu.ports(), PortMask::from_bits(0b101));

        let left = table.drop_reason(index, ForwardReason::MAIN_DEV).unwrap();
        assert_eq!(left, ForwardReason::VLAN_DEV);
        assert_eq!(table.alu(index).unwrap().ports(), PortMask::from_bits(0b100));
        let left = table.drop_reason(index, ForwardReason::VLAN_DEV).unwrap();
        assert!(left.is_empty());
    }

    #[test]
    fn test_remove_domain_only_touches_that_domain() {
        let mut table = AddressTable::new();
        table.add(mac(1), 3, PortMask::from_bits(1), false, true).unwrap();
        table.add(mac(2), 3, PortMask::from_bits(2), false, true).unwrap();
        let other = table.add(mac(1), 4, PortMask::from_bits(1), false, true).unwrap();
        for (index, entry) in table.dirty_entries().map(|(i, e)| (i, *e)).collect::<Vec<_>>() {
            table.mark_clean(index, &entry);
        }

        assert_eq!(table.remove_domain(3), 2);
        assert!(table.lookup(&mac(1), 3).is_err());
        assert!(table.lookup(&mac(2), 3).is_err());
        assert_eq!(table.lookup(&mac(1), 4).unwrap(), other);
        assert_eq!(table.dirty_entries().count(), 2);
        assert_eq!(table.remove_domain(3), 0);
    }
}
