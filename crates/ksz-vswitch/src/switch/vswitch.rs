//! Thread-safe switch handle.

use super::state::SwitchState;
use super::stats::SwitchStats;
use crate::audit::{AuditCategory, AuditOutcome, AuditRecord};
use crate::error::{Result, SwitchError};
use crate::hw::{TableUpdate, TableWriter};
use crate::mac_table::{ForwardReason, MacTableEntry};
use crate::port::StpState;
use crate::steering::{FrameHeader, FrameSink, PortSteering};
use crate::tail_tag::TxDestination;
use crate::types::{MacAddress, PortMask};
use crate::vlan::VlanTableEntry;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex as BusMutex;

const SOURCE: &str = "VirtualSwitch";

/// Outcome of one commit pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CommitReport {
    /// Rows written and marked clean.
    pub written: usize,
    /// Rows written but changed during the write; they stay dirty.
    pub superseded: usize,
    /// Rows the writer rejected; they stay dirty.
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl CommitReport {
    pub fn is_empty(&self) -> bool {
        self.written == 0 && self.superseded == 0 && self.failed == 0
    }
}

/// A switch shared between control-plane callers, the frame paths and the
/// commit task.
///
/// Two lock classes:
/// - the table lock guards [`SwitchState`] and is only held for short,
///   non-blocking sections;
/// - the bus lock serialises hardware writes and may be held across
///   `.await`.
///
/// The table lock is never held across a bus write. A commit takes the
/// bus lock first and then only briefly locks the tables to snapshot dirty
/// rows and to mark written ones clean.
pub struct VirtualSwitch {
    state: Mutex<SwitchState>,
    bus: BusMutex<Box<dyn TableWriter>>,
    steering: PortSteering,
}

impl VirtualSwitch {
    pub fn new(state: SwitchState, writer: Box<dyn TableWriter>, steering: PortSteering) -> Self {
        Self {
            state: Mutex::new(state),
            bus: BusMutex::new(writer),
            steering,
        }
    }

    /// Runs `f` with the table lock held.
    pub fn with_state<R>(&self, f: impl FnOnce(&SwitchState) -> R) -> R {
        f(&*self.state.lock())
    }

    pub fn stats(&self) -> SwitchStats {
        self.state.lock().stats().clone()
    }

    pub fn steering(&self) -> &PortSteering {
        &self.steering
    }

    pub fn is_dirty(&self) -> bool {
        self.state.lock().is_dirty()
    }

    pub fn add_static_mac(
        &self,
        address: MacAddress,
        fid: u16,
        ports: PortMask,
        overrides: bool,
        use_fid: bool,
    ) -> Result<usize> {
        let result = self
            .state
            .lock()
            .add_static_mac(address, fid, ports, overrides, use_fid);
        audited(
            AuditRecord::new(AuditCategory::StaticMacTable, SOURCE, "add_static_mac")
                .with_object_type("static_mac")
                .with_object_id(address.to_string())
                .with_details(json!({
                    "fid": fid,
                    "ports": ports.bits(),
                    "override": overrides,
                    "use_fid": use_fid,
                })),
            result,
        )
    }

    pub fn remove_static_mac(&self, address: &MacAddress, fid: u16) -> Result<MacTableEntry> {
        let result = self.state.lock().remove_static_mac(address, fid);
        audited(
            AuditRecord::new(AuditCategory::StaticMacTable, SOURCE, "remove_static_mac")
                .with_object_type("static_mac")
                .with_object_id(address.to_string())
                .with_details(json!({ "fid": fid })),
            result,
        )
    }

    pub fn update_static_mac(
        &self,
        address: &MacAddress,
        fid: u16,
        ports: PortMask,
        overrides: bool,
    ) -> Result<usize> {
        let result = self
            .state
            .lock()
            .update_static_mac(address, fid, ports, overrides);
        audited(
            AuditRecord::new(AuditCategory::StaticMacTable, SOURCE, "update_static_mac")
                .with_object_type("static_mac")
                .with_object_id(address.to_string())
                .with_details(json!({ "fid": fid, "ports": ports.bits(), "override": overrides })),
            result,
        )
    }

    pub fn join_address(
        &self,
        address: MacAddress,
        fid: u16,
        ports: PortMask,
        owner: u8,
        reason: ForwardReason,
    ) -> Result<usize> {
        let result = self
            .state
            .lock()
            .join_address(address, fid, ports, owner, reason);
        audited(
            AuditRecord::new(AuditCategory::StaticMacTable, SOURCE, "join_address")
                .with_object_type("static_mac")
                .with_object_id(address.to_string())
                .with_details(json!({
                    "fid": fid,
                    "ports": ports.bits(),
                    "owner": owner,
                    "reason": reason.to_string(),
                })),
            result,
        )
    }

    pub fn leave_address(&self, address: &MacAddress, fid: u16, reason: ForwardReason) -> Result<bool> {
        let result = self.state.lock().leave_address(address, fid, reason);
        audited(
            AuditRecord::new(AuditCategory::StaticMacTable, SOURCE, "leave_address")
                .with_object_type("static_mac")
                .with_object_id(address.to_string())
                .with_details(json!({ "fid": fid, "reason": reason.to_string() })),
            result,
        )
    }

    pub fn add_vlan(&self, vid: u16, member: PortMask) -> Result<usize> {
        let result = {
            let mut state = self.state.lock();
            state
                .add_vlan(vid, member)
                .map(|index| (index, state.vlans().fid(vid).unwrap_or_default()))
        };
        let fid = result.as_ref().map(|(_, fid)| *fid).ok();
        audited(
            AuditRecord::new(AuditCategory::VlanTable, SOURCE, "add_vlan")
                .with_object_type("vlan")
                .with_object_id(vid.to_string())
                .with_details(json!({ "member": member.bits(), "fid": fid })),
            result.map(|(index, _)| index),
        )
    }

    pub fn add_vlan_to_domain(&self, vid: u16, member: PortMask, fid: u16) -> Result<usize> {
        let result = self.state.lock().add_vlan_to_domain(vid, member, fid);
        audited(
            AuditRecord::new(AuditCategory::ForwardingDomain, SOURCE, "add_vlan_to_domain")
                .with_object_type("vlan")
                .with_object_id(vid.to_string())
                .with_details(json!({ "member": member.bits(), "fid": fid })),
            result,
        )
    }

    pub fn add_vlan_shared(&self, vid: u16, member: PortMask, share_with: u16) -> Result<usize> {
        let result = self.state.lock().add_vlan_shared(vid, member, share_with);
        audited(
            AuditRecord::new(AuditCategory::ForwardingDomain, SOURCE, "add_vlan_shared")
                .with_object_type("vlan")
                .with_object_id(vid.to_string())
                .with_details(json!({ "member": member.bits(), "share_with": share_with })),
            result,
        )
    }

    pub fn remove_vlan(&self, vid: u16) -> Result<VlanTableEntry> {
        let result = self.state.lock().remove_vlan(vid);
        let details = match &result {
            Ok(entry) => json!({ "fid": entry.fid }),
            Err(_) => json!({}),
        };
        audited(
            AuditRecord::new(AuditCategory::VlanTable, SOURCE, "remove_vlan")
                .with_object_type("vlan")
                .with_object_id(vid.to_string())
                .with_details(details),
            result,
        )
    }

    pub fn set_vlan_members(&self, vid: u16, member: PortMask) -> Result<()> {
        let result = self.state.lock().set_vlan_members(vid, member);
        audited(
            AuditRecord::new(AuditCategory::VlanTable, SOURCE, "set_vlan_members")
                .with_object_type("vlan")
                .with_object_id(vid.to_string())
                .with_details(json!({ "member": member.bits() })),
            result,
        )
    }

    pub fn set_port_vid(&self, port: usize, vid: u16) -> Result<()> {
        let result = self.state.lock().set_port_vid(port, vid);
        audited(port_record("set_port_vid", port, json!({ "vid": vid })), result)
    }

    pub fn set_port_member(&self, port: usize, member: PortMask) -> Result<()> {
        let result = self.state.lock().set_port_member(port, member);
        audited(
            port_record("set_port_member", port, json!({ "member": member.bits() })),
            result,
        )
    }

    pub fn set_port_vid_member(&self, port: usize, member: PortMask) -> Result<()> {
        let result = self.state.lock().set_port_vid_member(port, member);
        audited(
            port_record("set_port_vid_member", port, json!({ "vid_member": member.bits() })),
            result,
        )
    }

    pub fn set_port_priority(&self, port: usize, priority: u8) -> Result<()> {
        let result = self.state.lock().set_port_priority(port, priority);
        audited(
            port_record("set_port_priority", port, json!({ "priority": priority })),
            result,
        )
    }

    pub fn set_port_rate(&self, port: usize, queue: usize, rx_rate: u32, tx_rate: u32) -> Result<()> {
        let result = self
            .state
            .lock()
            .set_port_rate(port, queue, rx_rate, tx_rate);
        audited(
            port_record(
                "set_port_rate",
                port,
                json!({ "queue": queue, "rx_rate": rx_rate, "tx_rate": tx_rate }),
            ),
            result,
        )
    }

    pub fn set_rate_control(&self, port: usize, queue: usize, rate_ctrl: u8) -> Result<()> {
        let result = self.state.lock().set_rate_control(port, queue, rate_ctrl);
        audited(
            port_record(
                "set_rate_control",
                port,
                json!({ "queue": queue, "rate_ctrl": rate_ctrl }),
            ),
            result,
        )
    }

    /// Sets a port's spanning tree state.
    ///
    /// A forwarding port that stops forwarding is a topology change and
    /// triggers fast aging.
    pub fn set_stp_state(&self, port: usize, stp_state: StpState) -> Result<StpState> {
        let result = {
            let mut state = self.state.lock();
            state.set_stp_state(port, stp_state).map(|previous| {
                let flushed = if previous.allows_forwarding() && !stp_state.allows_forwarding() {
                    state.fast_age()
                } else {
                    0
                };
                (previous, flushed)
            })
        };

        if let Ok((_, flushed)) = &result {
            if *flushed > 0 {
                crate::audit_log!(AuditRecord::new(AuditCategory::TopologyReset, SOURCE, "fast_age")
                    .with_outcome(AuditOutcome::Success)
                    .with_object_type("port")
                    .with_object_id(port.to_string())
                    .with_details(json!({ "flushed": flushed })));
            }
        }

        audited(
            port_record("set_stp_state", port, json!({ "stp_state": stp_state.as_str() })),
            result.map(|(previous, _)| previous),
        )
    }

    pub fn set_fast_aging(&self, enabled: bool) {
        self.state.lock().set_fast_aging(enabled);
        crate::audit_log!(AuditRecord::new(AuditCategory::TopologyReset, SOURCE, "set_fast_aging")
            .with_outcome(AuditOutcome::Success)
            .with_details(json!({ "enabled": enabled })));
    }

    /// Flushes the static address table if fast aging is enabled.
    pub fn fast_age(&self) -> usize {
        let flushed = self.state.lock().fast_age();
        crate::audit_log!(AuditRecord::new(AuditCategory::TopologyReset, SOURCE, "fast_age")
            .with_outcome(AuditOutcome::Success)
            .with_details(json!({ "flushed": flushed })));
        flushed
    }

    /// Resolves destination ports and appends the tail tag.
    pub fn transmit(
        &self,
        header: &FrameHeader,
        requested: PortMask,
        flood: PortMask,
        frame: &mut Vec<u8>,
    ) -> Result<PortMask> {
        let mut state = self.state.lock();
        let result = self
            .steering
            .transmit(&state, header, requested, flood, frame);
        let stats = state.stats_mut();
        match &result {
            Ok(_) => stats.tx_frames += 1,
            Err(e) => {
                stats.tx_drops += 1;
                crate::debug_log!(SOURCE, port = header.port, error = %e, "Dropped transmit frame");
            }
        }
        result
    }

    /// Tags a frame for every forwarding port.
    pub fn flood(&self, frame: &mut Vec<u8>) -> Result<TxDestination> {
        let mut state = self.state.lock();
        let result = self.steering.flood(&state, frame);
        let stats = state.stats_mut();
        match &result {
            Ok(_) => stats.tx_frames += 1,
            Err(e) => {
                stats.tx_drops += 1;
                crate::debug_log!(SOURCE, error = %e, "Dropped flooded frame");
            }
        }
        result
    }

    /// Strips the tail tag and hands the frame to its logical port device.
    ///
    /// Returns the logical port, or `None` when the source port is not
    /// forwarding.
    pub fn receive(&self, mut frame: Vec<u8>, sink: &dyn FrameSink) -> Result<Option<u32>> {
        let resolved = {
            let mut state = self.state.lock();
            let resolved = self.steering.receive(&state, &mut frame);
            if !matches!(resolved, Ok(Some(_))) {
                state.stats_mut().rx_drops += 1;
            }
            resolved
        };

        let logical = match resolved {
            Ok(Some(logical)) => logical,
            Ok(None) => return Ok(None),
            Err(e) => {
                crate::debug_log!(SOURCE, error = %e, "Dropped received frame");
                return Err(e);
            }
        };

        let delivered = sink.deliver(logical, frame).map_err(SwitchError::Delivery);
        let mut state = self.state.lock();
        match &delivered {
            Ok(()) => state.stats_mut().rx_frames += 1,
            Err(_) => state.stats_mut().rx_drops += 1,
        }
        delivered.map(|()| Some(logical))
    }

    /// Writes every dirty row through the hardware writer.
    ///
    /// Rows are cleared only if unchanged since the snapshot; rows that
    /// fail or change during the write stay dirty for the next pass.
    pub async fn commit(&self) -> CommitReport {
        let writer = self.bus.lock().await;
        let updates = self.state.lock().dirty_updates();
        let mut report = CommitReport::default();
        if updates.is_empty() {
            return report;
        }

        for update in &updates {
            match writer.write(update).await {
                Ok(()) => {
                    let cleaned = self.state.lock().mark_committed(update);
                    if cleaned {
                        report.written += 1;
                    } else {
                        report.superseded += 1;
                    }
                }
                Err(e) => {
                    crate::warn_log!(
                        SOURCE,
                        table = %update.kind(),
                        index = update.index(),
                        error = %e,
                        "Hardware write failed"
                    );
                    report.failed += 1;
                    report.errors.push(format!("{} row {}: {}", update.kind(), update.index(), e));
                }
            }
        }
        drop(writer);

        {
            let mut state = self.state.lock();
            let stats = state.stats_mut();
            stats.commits += 1;
            stats.rows_written += report.written as u64;
            stats.commit_failures += report.failed as u64;
        }

        let record = AuditRecord::new(AuditCategory::HardwareCommit, SOURCE, "commit")
            .with_object_type("tables")
            .with_details(json!({
                "rows": updates.len(),
                "written": report.written,
                "superseded": report.superseded,
                "failed": report.failed,
            }));
        if report.failed > 0 {
            crate::audit_log!(record.with_error(report.errors.join("; ")));
        } else {
            crate::audit_log!(record.with_outcome(AuditOutcome::Success));
        }
        report
    }

    /// Rows pending a hardware write.
    pub fn pending_updates(&self) -> Vec<TableUpdate> {
        self.state.lock().dirty_updates()
    }
}

fn port_record(action: &str, port: usize, details: serde_json::Value) -> AuditRecord {
    AuditRecord::new(AuditCategory::PortConfig, SOURCE, action)
        .with_object_type("port")
        .with_object_id(port.to_string())
        .with_details(details)
}

/// Emits `record` with the outcome of `result` and passes the result on.
fn audited<T>(record: AuditRecord, result: Result<T>) -> Result<T> {
    match &result {
        Ok(_) => {
            crate::audit_log!(record.with_outcome(AuditOutcome::Success));
        }
        Err(e) => {
            crate::audit_log!(record.with_error(e.to_string()));
        }
    }
    result
}
