//! Transmit and receive port resolution.

use super::port_map::LogicalPortMap;
use super::types::FrameHeader;
use crate::error::{Result, SwitchError};
use crate::fid::FID_NONE;
use crate::port::SpanningTree;
use crate::switch::SwitchState;
use crate::tail_tag::{RxSource, TailTagCodec, TxDestination};
use crate::types::PortMask;
use std::sync::Arc;
use tracing::trace;

/// Decides where frames on the host link go.
///
/// Holds no table state of its own; every decision reads the
/// [`SwitchState`] passed in by a caller that already holds its lock.
pub struct PortSteering {
    codec: TailTagCodec,
    tail_tagging: bool,
    host_port: usize,
    port_map: Arc<dyn LogicalPortMap>,
    spanning_tree: Option<Arc<dyn SpanningTree>>,
}

impl PortSteering {
    pub fn new(codec: TailTagCodec, host_port: usize, port_map: Arc<dyn LogicalPortMap>) -> Self {
        Self {
            codec,
            tail_tagging: true,
            host_port,
            port_map,
            spanning_tree: None,
        }
    }

    /// Composes a spanning tree implementation that may admit control
    /// frames on ports that do not forward.
    pub fn with_spanning_tree(mut self, spanning_tree: Arc<dyn SpanningTree>) -> Self {
        self.spanning_tree = Some(spanning_tree);
        self
    }

    pub fn with_tail_tagging(mut self, enabled: bool) -> Self {
        self.tail_tagging = enabled;
        self
    }

    pub fn codec(&self) -> &TailTagCodec {
        &self.codec
    }

    pub fn tail_tagging(&self) -> bool {
        self.tail_tagging
    }

    /// Destination ports for an outgoing frame.
    ///
    /// An override address entry replaces the VLAN membership, any other
    /// address hit narrows it, and unknown destinations fall back to
    /// `flood`. Ports that are not forwarding are removed last.
    pub fn resolve_tx(
        &self,
        state: &SwitchState,
        header: &FrameHeader,
        requested: PortMask,
        flood: PortMask,
    ) -> Result<PortMask> {
        let vid = match header.vid {
            Some(vid) => vid,
            None => state.port(header.port)?.vid,
        };

        let vlans = state.vlans();
        let (vlan_mask, fid) = match vlans.lookup(vid) {
            Ok(index) => vlans
                .get(index)
                .map(|entry| (entry.member, entry.fid))
                .unwrap_or((flood, FID_NONE)),
            Err(_) => (flood, FID_NONE),
        };

        let mask = match state.addresses().find_forwarding(&header.dst, fid) {
            Some(entry) if entry.overrides => requested & entry.ports,
            Some(entry) => requested & vlan_mask & entry.ports,
            None => requested & vlan_mask & flood,
        };

        let forwarding = forwarding_ports(state, mask);

        trace!(
            dst = %header.dst,
            vid,
            fid,
            requested = %requested,
            resolved = %forwarding,
            "Resolved transmit ports"
        );
        Ok(forwarding)
    }

    /// Logical port for a received tag, without spanning tree gating.
    pub fn resolve_rx(&self, tag: u8) -> Result<u32> {
        let physical = match self.codec.decode(tag)? {
            RxSource::Port(port) => port,
            RxSource::Host => self.host_port,
        };
        self.logical_port(physical)
    }

    /// Whether a frame from `port` may reach the host.
    pub fn admits_rx(&self, state: &SwitchState, port: usize, frame: &[u8]) -> bool {
        let Ok(cfg) = state.port(port) else {
            return false;
        };
        if cfg.stp_state.allows_forwarding() {
            return true;
        }
        self.spanning_tree
            .as_ref()
            .is_some_and(|stp| stp.accepts_control_frame(port, cfg.stp_state, frame))
    }

    /// Resolves and appends the tail tag. Returns the destination ports.
    ///
    /// An empty resolution fails with `InvalidPortMask`; the frame is left
    /// untouched and must be dropped.
    pub fn transmit(
        &self,
        state: &SwitchState,
        header: &FrameHeader,
        requested: PortMask,
        flood: PortMask,
        frame: &mut Vec<u8>,
    ) -> Result<PortMask> {
        let ports = self.resolve_tx(state, header, requested, flood)?;
        if !self.tail_tagging {
            return Ok(ports);
        }
        self.codec
            .pad_and_append(frame, TxDestination::Ports(ports))?;
        Ok(ports)
    }

    /// Where a flooded frame may go.
    ///
    /// The flood sentinel is only used while every port forwards. Otherwise
    /// the forwarding ports are listed explicitly, and a switch with no
    /// forwarding port fails with `InvalidPortMask`.
    pub fn flood_destination(&self, state: &SwitchState) -> Result<TxDestination> {
        let all = state.all_ports();
        let forwarding = forwarding_ports(state, all);
        if forwarding == all {
            Ok(TxDestination::Flood)
        } else if forwarding.is_empty() {
            Err(SwitchError::InvalidPortMask(0))
        } else {
            Ok(TxDestination::Ports(forwarding))
        }
    }

    /// Tags a frame for delivery to every forwarding port.
    pub fn flood(&self, state: &SwitchState, frame: &mut Vec<u8>) -> Result<TxDestination> {
        let destination = self.flood_destination(state)?;
        if self.tail_tagging {
            self.codec.pad_and_append(frame, destination)?;
        }
        trace!(destination = ?destination, "Flooded frame");
        Ok(destination)
    }

    /// Strips the tail tag and returns the logical port to deliver to.
    ///
    /// `Ok(None)` means the source port is not forwarding and the frame
    /// was not admitted as a control frame.
    pub fn receive(&self, state: &SwitchState, frame: &mut Vec<u8>) -> Result<Option<u32>> {
        if !self.tail_tagging {
            return self.logical_port(self.host_port).map(Some);
        }
        let physical = match self.codec.strip(frame)? {
            RxSource::Host => self.host_port,
            RxSource::Port(port) => {
                if !self.admits_rx(state, port, frame) {
                    trace!(port, "Suppressed frame from non-forwarding port");
                    return Ok(None);
                }
                port
            }
        };
        self.logical_port(physical).map(Some)
    }

    fn logical_port(&self, physical: usize) -> Result<u32> {
        self.port_map
            .logical_port(physical)
            .ok_or(SwitchError::UnmappedPort(physical))
    }
}

/// Ports of `mask` whose spanning tree state allows forwarding.
fn forwarding_ports(state: &SwitchState, mask: PortMask) -> PortMask {
    mask.ports()
        .filter(|&port| {
            state
                .port(port)
                .map(|cfg| cfg.stp_state.allows_forwarding())
                .unwrap_or(false)
        })
        .fold(PortMask::EMPTY, PortMask::with)
}
