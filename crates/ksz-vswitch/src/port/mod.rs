//! Port configuration and spanning tree state.

mod stp;
mod types;

pub use stp::{BpduFilter, SpanningTree, BRIDGE_GROUP_ADDRESS};
pub use types::{PortConfig, StpState};
