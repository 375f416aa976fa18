//! The switch aggregate: every table plus per-port configuration.

use super::stats::SwitchStats;
use crate::error::{Result, SwitchError};
use crate::fid::{ForwardingDomainTable, FID_NONE};
use crate::hw::TableUpdate;
use crate::mac_table::{AddressTable, ForwardReason, MacTableEntry};
use crate::port::{PortConfig, StpState};
use crate::types::{MacAddress, PortMask, PRIO_QUEUES, VLAN_ID_MAX};
use crate::vlan::{VlanTable, VlanTableEntry};

const MAX_PORTS: usize = u8::BITS as usize;

/// All mutable switch state.
///
/// Owned by exactly one lock in [`VirtualSwitch`](super::VirtualSwitch).
/// Methods here validate their input and keep the tables consistent with
/// each other; they never log or touch hardware.
#[derive(Debug, Clone)]
pub struct SwitchState {
    addresses: AddressTable,
    fids: ForwardingDomainTable,
    vlans: VlanTable,
    ports: Vec<PortConfig>,
    host_port: usize,
    fast_aging: bool,
    stats: SwitchStats,
}

impl SwitchState {
    /// State with full-size tables. Every port starts in `simple` state and
    /// may forward to every other port.
    pub fn new(port_count: usize, host_port: usize) -> Result<Self> {
        Self::with_tables(
            port_count,
            host_port,
            AddressTable::new(),
            VlanTable::new(),
            ForwardingDomainTable::new(),
        )
    }

    /// State over tables of a chip variant with smaller capacities.
    pub fn with_tables(
        port_count: usize,
        host_port: usize,
        addresses: AddressTable,
        vlans: VlanTable,
        fids: ForwardingDomainTable,
    ) -> Result<Self> {
        if port_count == 0 || port_count > MAX_PORTS {
            return Err(SwitchError::InvalidPort(port_count));
        }
        if host_port >= port_count {
            return Err(SwitchError::InvalidPort(host_port));
        }
        let all = PortMask::all(port_count);
        Ok(Self {
            addresses,
            fids,
            vlans,
            ports: vec![PortConfig::new(all, StpState::Simple); port_count],
            host_port,
            fast_aging: false,
            stats: SwitchStats::default(),
        })
    }

    pub fn addresses(&self) -> &AddressTable {
        &self.addresses
    }

    pub fn vlans(&self) -> &VlanTable {
        &self.vlans
    }

    pub fn fids(&self) -> &ForwardingDomainTable {
        &self.fids
    }

    pub fn port(&self, port: usize) -> Result<&PortConfig> {
        self.ports.get(port).ok_or(SwitchError::InvalidPort(port))
    }

    pub fn ports(&self) -> &[PortConfig] {
        &self.ports
    }

    pub fn port_count(&self) -> usize {
        self.ports.len()
    }

    pub fn host_port(&self) -> usize {
        self.host_port
    }

    pub fn all_ports(&self) -> PortMask {
        PortMask::all(self.ports.len())
    }

    pub fn fast_aging(&self) -> bool {
        self.fast_aging
    }

    pub fn set_fast_aging(&mut self, enabled: bool) {
        self.fast_aging = enabled;
    }

    pub fn stats(&self) -> &SwitchStats {
        &self.stats
    }

    pub(crate) fn stats_mut(&mut self) -> &mut SwitchStats {
        &mut self.stats
    }

    // Static MAC table

    /// Adds a static address. A non-zero `fid` must be a held domain.
    pub fn add_static_mac(
        &mut self,
        address: MacAddress,
        fid: u16,
        ports: PortMask,
        overrides: bool,
        use_fid: bool,
    ) -> Result<usize> {
        self.check_mask(ports)?;
        if fid != FID_NONE && !self.fids.is_held(fid) {
            return Err(SwitchError::DomainNotHeld(fid));
        }
        let index = self
            .addresses
            .add(address, fid, ports, overrides, use_fid)?;
        self.stats.entries_added += 1;
        Ok(index)
    }

    pub fn remove_static_mac(&mut self, address: &MacAddress, fid: u16) -> Result<MacTableEntry> {
        let index = self.addresses.lookup(address, fid)?;
        let removed = self.addresses.remove(index)?;
        self.stats.entries_removed += 1;
        Ok(removed)
    }

    pub fn update_static_mac(
        &mut self,
        address: &MacAddress,
        fid: u16,
        ports: PortMask,
        overrides: bool,
    ) -> Result<usize> {
        self.check_mask(ports)?;
        let index = self.addresses.lookup(address, fid)?;
        self.addresses.update(index, ports, overrides)?;
        Ok(index)
    }

    /// Forwards `address` to `ports` on behalf of `owner`.
    ///
    /// Several owners may share one entry; each records its own reason and
    /// ports, and the entry forwards to the union of them.
    pub fn join_address(
        &mut self,
        address: MacAddress,
        fid: u16,
        ports: PortMask,
        owner: u8,
        reason: ForwardReason,
    ) -> Result<usize> {
        let index = match self.addresses.lookup(&address, fid) {
            Ok(index) => {
                self.check_mask(ports)?;
                let entry = self
                    .addresses
                    .get(index)
                    .copied()
                    .unwrap_or_default();
                self.addresses
                    .update(index, entry.ports | ports, entry.overrides)?;
                index
            }
            Err(_) => self.add_static_mac(address, fid, ports, false, fid != FID_NONE)?,
        };
        self.addresses.add_reason(index, owner, reason, ports)?;
        Ok(index)
    }

    /// Drops one forward reason and the ports it contributed. Removes the
    /// entry once none is left and returns whether it was removed.
    pub fn leave_address(
        &mut self,
        address: &MacAddress,
        fid: u16,
        reason: ForwardReason,
    ) -> Result<bool> {
        let index = self.addresses.lookup(address, fid)?;
        let remaining = self.addresses.drop_reason(index, reason)?;
        if !remaining.is_empty() {
            let ports = self.addresses.alu(index).map(|alu| alu.ports()).unwrap_or_default();
            let overrides = self.addresses.get(index).is_some_and(|e| e.overrides);
            self.addresses.update(index, ports, overrides)?;
            return Ok(false);
        }
        self.addresses.remove(index)?;
        self.stats.entries_removed += 1;
        Ok(true)
    }

    // VLAN table

    pub fn add_vlan(&mut self, vid: u16, member: PortMask) -> Result<usize> {
        self.check_mask(member)?;
        let index = self.vlans.add(&mut self.fids, vid, member)?;
        self.stats.vlans_added += 1;
        Ok(index)
    }

    /// Adds `vid` to the forwarding domain of the existing VLAN `share_with`.
    pub fn add_vlan_shared(&mut self, vid: u16, member: PortMask, share_with: u16) -> Result<usize> {
        let fid = self.vlans.fid(share_with)?;
        self.add_vlan_to_domain(vid, member, fid)
    }

    pub fn add_vlan_to_domain(&mut self, vid: u16, member: PortMask, fid: u16) -> Result<usize> {
        self.check_mask(member)?;
        let index = self
            .vlans
            .add_to_domain(&mut self.fids, vid, member, fid)?;
        self.stats.vlans_added += 1;
        Ok(index)
    }

    /// Removes a VLAN. Once its forwarding domain is no longer held, the
    /// static addresses keyed on that domain are removed as well, so a
    /// later VLAN reusing the id starts with none of them.
    pub fn remove_vlan(&mut self, vid: u16) -> Result<VlanTableEntry> {
        let removed = self.vlans.remove(&mut self.fids, vid)?;
        self.stats.vlans_removed += 1;
        if removed.fid != FID_NONE && !self.fids.is_held(removed.fid) {
            let purged = self.addresses.remove_domain(removed.fid);
            self.stats.entries_removed += purged as u64;
        }
        Ok(removed)
    }

    pub fn set_vlan_members(&mut self, vid: u16, member: PortMask) -> Result<()> {
        self.check_mask(member)?;
        self.vlans.set_members(vid, member)
    }

    // Port configuration

    pub fn set_port_vid(&mut self, port: usize, vid: u16) -> Result<()> {
        if vid == 0 || vid > VLAN_ID_MAX {
            return Err(SwitchError::InvalidVlan(vid));
        }
        self.port_mut(port)?.vid = vid;
        Ok(())
    }

    pub fn set_port_member(&mut self, port: usize, member: PortMask) -> Result<()> {
        self.check_mask(member)?;
        self.port_mut(port)?.member = member;
        Ok(())
    }

    pub fn set_port_vid_member(&mut self, port: usize, member: PortMask) -> Result<()> {
        self.check_mask(member)?;
        self.port_mut(port)?.vid_member = member;
        Ok(())
    }

    pub fn set_port_priority(&mut self, port: usize, priority: u8) -> Result<()> {
        check_queue(usize::from(priority))?;
        self.port_mut(port)?.port_prio = priority;
        Ok(())
    }

    /// Sets receive and transmit rate limits of one priority queue.
    pub fn set_port_rate(&mut self, port: usize, queue: usize, rx_rate: u32, tx_rate: u32) -> Result<()> {
        check_queue(queue)?;
        let cfg = self.port_mut(port)?;
        cfg.rx_rate[queue] = rx_rate;
        cfg.tx_rate[queue] = tx_rate;
        Ok(())
    }

    pub fn set_rate_control(&mut self, port: usize, queue: usize, rate_ctrl: u8) -> Result<()> {
        check_queue(queue)?;
        self.port_mut(port)?.rate_ctrl[queue] = rate_ctrl;
        Ok(())
    }

    pub fn set_rate_limit(&mut self, port: usize, rate_limit: u8) -> Result<()> {
        self.port_mut(port)?.rate_limit = rate_limit;
        Ok(())
    }

    /// Sets the spanning tree state and returns the previous one.
    pub fn set_stp_state(&mut self, port: usize, state: StpState) -> Result<StpState> {
        let cfg = self.port_mut(port)?;
        Ok(std::mem::replace(&mut cfg.stp_state, state))
    }

    /// Flushes the static address table if fast aging is enabled.
    /// Returns the number of entries flushed.
    pub fn fast_age(&mut self) -> usize {
        if !self.fast_aging {
            return 0;
        }
        let flushed = self.addresses.flush();
        self.stats.fast_ages += 1;
        self.stats.entries_removed += flushed as u64;
        flushed
    }

    // Hardware commit

    pub fn is_dirty(&self) -> bool {
        self.addresses.is_dirty() || self.vlans.is_dirty()
    }

    /// Snapshot of every row awaiting a hardware write.
    pub fn dirty_updates(&self) -> Vec<TableUpdate> {
        let mut updates = Vec::new();
        if self.addresses.is_dirty() {
            updates.extend(
                self.addresses
                    .dirty_entries()
                    .map(|(index, entry)| TableUpdate::StaticMac { index, entry: *entry }),
            );
        }
        if self.vlans.is_dirty() {
            updates.extend(
                self.vlans
                    .dirty_entries()
                    .map(|(index, entry)| TableUpdate::Vlan { index, entry: *entry }),
            );
        }
        updates
    }

    /// Clears the dirty flag of a written row unless it changed meanwhile.
    pub fn mark_committed(&mut self, update: &TableUpdate) -> bool {
        match update {
            TableUpdate::StaticMac { index, entry } => self.addresses.mark_clean(*index, entry),
            TableUpdate::Vlan { index, entry } => self.vlans.mark_clean(*index, entry),
        }
    }

    fn port_mut(&mut self, port: usize) -> Result<&mut PortConfig> {
        self.ports.get_mut(port).ok_or(SwitchError::InvalidPort(port))
    }

    fn check_mask(&self, mask: PortMask) -> Result<()> {
        if mask.fits(self.ports.len()) {
            Ok(())
        } else {
            Err(SwitchError::InvalidPortMask(u32::from(mask.bits())))
        }
    }
}

fn check_queue(queue: usize) -> Result<()> {
    if queue < PRIO_QUEUES {
        Ok(())
    } else {
        Err(SwitchError::Configuration(format!(
            "priority queue {} out of range (0..{})",
            queue, PRIO_QUEUES
        )))
    }
}
