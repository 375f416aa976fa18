//! Hardware commit seam.
//!
//! The tables never touch registers. Dirty rows are handed to a
//! [`TableWriter`] as [`TableUpdate`]s and cleared once written.

use crate::error::TableKind;
use crate::mac_table::MacTableEntry;
use crate::vlan::VlanTableEntry;
use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

/// One row to write to the physical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "table", rename_all = "snake_case")]
pub enum TableUpdate {
    StaticMac { index: usize, entry: MacTableEntry },
    Vlan { index: usize, entry: VlanTableEntry },
}

impl TableUpdate {
    pub fn kind(&self) -> TableKind {
        match self {
            Self::StaticMac { .. } => TableKind::StaticMac,
            Self::Vlan { .. } => TableKind::Vlan,
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Self::StaticMac { index, .. } | Self::Vlan { index, .. } => *index,
        }
    }

    /// True if the update invalidates the hardware row.
    pub fn is_invalidation(&self) -> bool {
        match self {
            Self::StaticMac { entry, .. } => !entry.valid,
            Self::Vlan { entry, .. } => !entry.valid,
        }
    }
}

/// Writes table rows to the switch over its register bus.
///
/// Calls are serialised by the caller; implementations need not lock.
#[async_trait]
pub trait TableWriter: Send + Sync {
    async fn write(&self, update: &TableUpdate) -> Result<(), String>;
}

/// Writer that only logs, for running without a register bus.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingWriter;

#[async_trait]
impl TableWriter for LoggingWriter {
    async fn write(&self, update: &TableUpdate) -> Result<(), String> {
        let details = serde_json::to_string(update).map_err(|e| e.to_string())?;
        debug!(table = %update.kind(), index = update.index(), %details, "Table write");
        Ok(())
    }
}
