//! Integration tests for the switch core with a mocked register bus
//!
//! These tests drive the tables, port steering and hardware commit path
//! together through `VirtualSwitch`.

use async_trait::async_trait;
use ksz_vswitch::{
    AddressTable, CommitReport, ForwardingDomainTable, FrameHeader, FrameSink, MacAddress,
    PortMask, PortSteering, StaticPortMap, StpState, SwitchConfig, SwitchError, SwitchState,
    TableKind, TableUpdate, TableWriter, TailTagCodec, VirtualSwitch, VlanTable,
};
use pretty_assertions::assert_eq;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

const DST: MacAddress = MacAddress::new([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff]);

/// Mock register bus
///
/// Records every row written and can reject rows or pause inside a write.
#[derive(Clone, Default)]
pub struct MockHardware {
    writes: Arc<Mutex<Vec<TableUpdate>>>,
    failing: Arc<Mutex<HashSet<(TableKind, usize)>>>,
    pause: Arc<PauseGate>,
}

/// Holds the first write armed after `arm` until `resume` is notified.
#[derive(Default)]
pub struct PauseGate {
    armed: AtomicBool,
    started: Notify,
    resume: Notify,
}

impl MockHardware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> Vec<TableUpdate> {
        self.writes.lock().unwrap().clone()
    }

    pub fn fail(&self, kind: TableKind, index: usize) {
        self.failing.lock().unwrap().insert((kind, index));
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn gate(&self) -> Arc<PauseGate> {
        self.pause.armed.store(true, Ordering::SeqCst);
        Arc::clone(&self.pause)
    }
}

#[async_trait]
impl TableWriter for MockHardware {
    async fn write(&self, update: &TableUpdate) -> Result<(), String> {
        if self.pause.armed.swap(false, Ordering::SeqCst) {
            self.pause.started.notify_one();
            self.pause.resume.notified().await;
        }
        if self
            .failing
            .lock()
            .unwrap()
            .contains(&(update.kind(), update.index()))
        {
            return Err(format!("bus error at {} row {}", update.kind(), update.index()));
        }
        self.writes.lock().unwrap().push(*update);
        Ok(())
    }
}

/// Mock logical port devices
#[derive(Default)]
pub struct MockPorts {
    delivered: Mutex<Vec<(u32, Vec<u8>)>>,
}

impl FrameSink for MockPorts {
    fn deliver(&self, logical_port: u32, frame: Vec<u8>) -> Result<(), String> {
        self.delivered.lock().unwrap().push((logical_port, frame));
        Ok(())
    }
}

fn switch_with(hw: &MockHardware) -> VirtualSwitch {
    let state = SwitchState::new(5, 4).unwrap();
    let steering = PortSteering::new(
        TailTagCodec::new(5).unwrap(),
        4,
        Arc::new(StaticPortMap::identity(5)),
    );
    VirtualSwitch::new(state, Box::new(hw.clone()), steering)
}

#[test]
fn test_override_address_wins_over_vlan() {
    let hw = MockHardware::new();
    let switch = switch_with(&hw);
    switch.add_vlan(5, PortMask::from_bits(0b00111)).unwrap();
    let fid = switch.with_state(|s| s.vlans().fid(5)).unwrap();
    switch
        .add_static_mac(DST, fid, PortMask::from_bits(0b00011), true, false)
        .unwrap();

    let header = FrameHeader::new(DST, Some(5), 4);
    let ports = switch.with_state(|state| {
        switch
            .steering()
            .resolve_tx(state, &header, PortMask::from_bits(0b00111), PortMask::all(5))
    });
    assert_eq!(ports.unwrap(), PortMask::from_bits(0b00011));

    let mut frame = DST.as_bytes().to_vec();
    frame.resize(60, 0);
    let ports = switch
        .transmit(&header, PortMask::from_bits(0b00111), PortMask::all(5), &mut frame)
        .unwrap();
    assert_eq!(ports.bits(), 0b00011);
    assert_eq!(frame.last().copied(), Some(0b00011));
}

#[test]
fn test_receive_tag_resolution() {
    let hw = MockHardware::new();
    let switch = switch_with(&hw);
    let ports = MockPorts::default();

    let mut frame = vec![0x5a; 60];
    frame.push(0x04);
    assert_eq!(switch.receive(frame, &ports).unwrap(), Some(2));

    let mut frame = vec![0x5a; 60];
    frame.push(0x00);
    let err = switch.receive(frame, &ports).unwrap_err();
    assert!(matches!(err, SwitchError::InvalidTag(0x00)));
    assert!(err.is_frame_error());

    let delivered = ports.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].0, 2);
    assert_eq!(delivered[0].1, vec![0x5a; 60]);
}

#[test]
fn test_tail_tag_round_trip_all_ports() {
    let codec = TailTagCodec::new(5).unwrap();
    for port in 0..5 {
        let tag = codec.encode_single_port(port).unwrap();
        assert_eq!(
            codec.decode(tag).unwrap(),
            ksz_vswitch::RxSource::Port(port)
        );
    }
    assert_eq!(
        codec.encode(ksz_vswitch::TxDestination::Flood).unwrap(),
        ksz_vswitch::tail_tag::TAIL_TAG_FLOOD
    );
    assert!(codec.decode(0b0110).is_err());
}

#[test]
fn test_static_mac_capacity_and_slot_reuse() {
    let mut state = SwitchState::new(5, 4).unwrap();
    let capacity = state.addresses().capacity();
    for i in 0..capacity {
        let address = MacAddress::new([0x02, 0, 0, 0, 0, i as u8]);
        state
            .add_static_mac(address, 0, PortMask::single(0), false, false)
            .unwrap();
    }

    let extra = MacAddress::new([0x02, 0, 0, 0, 1, 0]);
    assert!(matches!(
        state.add_static_mac(extra, 0, PortMask::single(0), false, false),
        Err(SwitchError::CapacityExceeded(TableKind::StaticMac))
    ));

    let victim = MacAddress::new([0x02, 0, 0, 0, 0, 7]);
    state.remove_static_mac(&victim, 0).unwrap();
    let index = state
        .add_static_mac(extra, 0, PortMask::single(0), false, false)
        .unwrap();
    assert_eq!(index, 7);

    assert!(matches!(
        state.add_static_mac(extra, 0, PortMask::single(1), false, false),
        Err(SwitchError::AlreadyExists { table: TableKind::StaticMac, .. })
    ));
}

#[test]
fn test_forwarding_domain_refcount() {
    let mut fids = ForwardingDomainTable::new();
    let free = fids.free_count();
    let fid = fids.acquire(10).unwrap();
    assert_eq!(fids.acquire(10).unwrap(), fid);
    assert_eq!(fids.free_count(), free - 1);

    assert_eq!(fids.release(fid).unwrap(), 1);
    assert_eq!(fids.release(fid).unwrap(), 0);
    assert_eq!(fids.free_count(), free);
    assert!(matches!(fids.release(fid), Err(SwitchError::DomainNotHeld(_))));
}

#[test]
fn test_shared_domain_survives_first_removal() {
    let mut state = SwitchState::with_tables(
        5,
        4,
        AddressTable::with_capacity(8),
        VlanTable::with_capacity(16),
        ForwardingDomainTable::with_capacity(4),
    )
    .unwrap();
    state.add_vlan(100, PortMask::from_bits(0b0011)).unwrap();
    state.add_vlan_shared(200, PortMask::from_bits(0b1100), 100).unwrap();
    let fid = state.vlans().fid(100).unwrap();

    state.remove_vlan(100).unwrap();
    assert!(state.fids().is_held(fid));
    assert_eq!(state.vlans().fid(200).unwrap(), fid);

    // A new VLAN must not be handed the shared domain.
    state.add_vlan(300, PortMask::single(0)).unwrap();
    assert_ne!(state.vlans().fid(300).unwrap(), fid);

    state.remove_vlan(200).unwrap();
    assert!(!state.fids().is_held(fid));
}

#[test]
fn test_reused_domain_does_not_inherit_static_addresses() {
    let hw = MockHardware::new();
    let switch = switch_with(&hw);
    switch.add_vlan(5, PortMask::all(5)).unwrap();
    let fid = switch.with_state(|s| s.vlans().fid(5)).unwrap();
    switch
        .add_static_mac(DST, fid, PortMask::single(0), false, true)
        .unwrap();

    switch.remove_vlan(5).unwrap();
    switch.add_vlan(6, PortMask::all(5)).unwrap();
    assert_eq!(switch.with_state(|s| s.vlans().fid(6)).unwrap(), fid);

    let header = FrameHeader::new(DST, Some(6), 4);
    let mut frame = DST.as_bytes().to_vec();
    frame.resize(60, 0);
    let ports = switch
        .transmit(&header, PortMask::all(5), PortMask::all(5), &mut frame)
        .unwrap();
    assert_eq!(ports, PortMask::all(5));
}

#[test]
fn test_flood_respects_spanning_tree() {
    let hw = MockHardware::new();
    let switch = switch_with(&hw);
    switch.set_stp_state(1, StpState::Blocked).unwrap();
    switch.set_stp_state(2, StpState::Learning).unwrap();

    let mut frame = vec![0u8; 60];
    switch.flood(&mut frame).unwrap();
    assert_eq!(frame.last().copied(), Some(0b11001));
}

#[tokio::test]
async fn test_commit_writes_every_dirty_row() {
    let hw = MockHardware::new();
    let switch = switch_with(&hw);
    switch.add_vlan(5, PortMask::all(5)).unwrap();
    switch
        .add_static_mac(DST, 0, PortMask::single(1), false, false)
        .unwrap();

    let report = switch.commit().await;
    assert_eq!(
        report,
        CommitReport {
            written: 2,
            ..Default::default()
        }
    );
    assert!(!switch.is_dirty());

    let writes = hw.writes();
    assert_eq!(writes.len(), 2);
    assert_eq!(writes[0].kind(), TableKind::StaticMac);
    assert_eq!(writes[1].kind(), TableKind::Vlan);

    // Removal writes an invalidation.
    switch.remove_static_mac(&DST, 0).unwrap();
    switch.commit().await;
    let last = hw.writes().last().copied().unwrap();
    assert!(last.is_invalidation());
    assert_eq!(last.index(), 0);
}

#[tokio::test]
async fn test_failed_write_stays_dirty() {
    let hw = MockHardware::new();
    let switch = switch_with(&hw);
    switch.add_vlan(5, PortMask::all(5)).unwrap();
    hw.fail(TableKind::Vlan, 0);

    let report = switch.commit().await;
    assert_eq!(report.failed, 1);
    assert_eq!(report.errors.len(), 1);
    assert!(switch.is_dirty());
    assert_eq!(switch.stats().commit_failures, 1);

    hw.heal();
    let report = switch.commit().await;
    assert_eq!(report.written, 1);
    assert!(!switch.is_dirty());
}

#[tokio::test]
async fn test_mutation_during_write_stays_dirty() {
    let hw = MockHardware::new();
    let switch = Arc::new(switch_with(&hw));
    switch
        .add_static_mac(DST, 0, PortMask::single(1), false, false)
        .unwrap();

    let gate = hw.gate();
    let committer = {
        let switch = Arc::clone(&switch);
        tokio::spawn(async move { switch.commit().await })
    };

    gate.started.notified().await;
    // The table lock is free while the bus write is in flight.
    switch
        .update_static_mac(&DST, 0, PortMask::single(2), false)
        .unwrap();
    gate.resume.notify_one();

    let report = committer.await.unwrap();
    assert_eq!(report.superseded, 1);
    assert_eq!(report.written, 0);
    assert!(switch.is_dirty());

    let report = switch.commit().await;
    assert_eq!(report.written, 1);
    assert!(!switch.is_dirty());
    match hw.writes().last().copied().unwrap() {
        TableUpdate::StaticMac { entry, .. } => assert_eq!(entry.ports.bits(), 0b00100),
        other => panic!("unexpected write {:?}", other),
    }
}

#[tokio::test]
async fn test_config_driven_switch() {
    let config = SwitchConfig::from_toml(
        r#"
[switch]
fast_aging = true

[[vlan]]
vid = 5
ports = 7

[[static_mac]]
address = "aa:bb:cc:dd:ee:ff"
ports = 3
vlan = 5
override = true

[[port]]
index = 3
vid = 5
"#,
    )
    .unwrap();

    let hw = MockHardware::new();
    let switch = config.build(Box::new(hw.clone())).unwrap();
    config.apply(&switch).unwrap();

    let report = switch.commit().await;
    assert_eq!(report.written, 2);

    switch.with_state(|state| {
        assert_eq!(state.port(3).unwrap().vid, 5);
    });

    // Blocking a forwarding port ages the static table out; every row is
    // rewritten as invalid.
    switch.set_stp_state(1, StpState::Blocked).unwrap();
    assert!(switch.with_state(|s| s.addresses().is_empty()));
    assert_eq!(switch.pending_updates().len(), switch.with_state(|s| s.addresses().capacity()));
}
