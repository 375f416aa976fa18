//! Port steering over the shared host link.
//!
//! Transmit: address table and VLAN membership decide the destination
//! ports, which are encoded in the tail tag. Receive: the tail tag names
//! the source port, which maps to a logical port device.

mod port_map;
mod resolver;
mod types;

pub use port_map::{FrameSink, LogicalPortMap, StaticPortMap};
pub use resolver::PortSteering;
pub use types::{FrameHeader, ETH_HLEN, ETH_P_8021Q};
