//! Switch counters.

use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SwitchStats {
    pub entries_added: u64,
    pub entries_removed: u64,
    pub vlans_added: u64,
    pub vlans_removed: u64,
    /// Commit passes that found dirty rows.
    pub commits: u64,
    pub rows_written: u64,
    pub commit_failures: u64,
    pub fast_ages: u64,
    pub rx_frames: u64,
    pub rx_drops: u64,
    pub tx_frames: u64,
    pub tx_drops: u64,
}
