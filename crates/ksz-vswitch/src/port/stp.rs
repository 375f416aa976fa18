//! Optional spanning tree capability.
//!
//! Ports outside `forwarding`/`simple` neither learn nor forward. A
//! [`SpanningTree`] implementation may carve out an exception for its own
//! control frames while a port is listening or learning; without one there
//! is no exception.

use super::types::StpState;
use crate::types::MacAddress;

/// 802.1D bridge group address used by BPDUs.
pub const BRIDGE_GROUP_ADDRESS: MacAddress = MacAddress::new([0x01, 0x80, 0xc2, 0x00, 0x00, 0x00]);

pub trait SpanningTree: Send + Sync {
    /// Whether a frame received on `port` in `state` must still reach the
    /// host although the port does not forward.
    fn accepts_control_frame(&self, port: usize, state: StpState, frame: &[u8]) -> bool;
}

/// Admits BPDUs (frames to the bridge group address) on listening and
/// learning ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct BpduFilter;

impl SpanningTree for BpduFilter {
    fn accepts_control_frame(&self, _port: usize, state: StpState, frame: &[u8]) -> bool {
        state.admits_control_frames()
            && frame.len() >= 6
            && frame[..6] == BRIDGE_GROUP_ADDRESS.as_bytes()[..]
    }
}
