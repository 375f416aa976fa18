//! Switch aggregate and its thread-safe handle.

mod state;
mod stats;
mod vswitch;

pub use state::SwitchState;
pub use stats::SwitchStats;
pub use vswitch::{CommitReport, VirtualSwitch};
