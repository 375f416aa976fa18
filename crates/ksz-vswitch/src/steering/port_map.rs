//! Physical to logical port mapping and the frame delivery seam.

use crate::error::{Result, SwitchError};

/// Maps a physical switch port to the logical device registered for it.
pub trait LogicalPortMap: Send + Sync {
    fn logical_port(&self, physical: usize) -> Option<u32>;
}

/// Receives frames resolved to a logical port device.
pub trait FrameSink: Send + Sync {
    fn deliver(&self, logical_port: u32, frame: Vec<u8>) -> std::result::Result<(), String>;
}

/// Fixed mapping set up once at switch initialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticPortMap {
    slots: Vec<Option<u32>>,
}

impl StaticPortMap {
    pub fn new(port_count: usize) -> Self {
        Self {
            slots: vec![None; port_count],
        }
    }

    /// Physical port `i` maps to logical port `i`.
    pub fn identity(port_count: usize) -> Self {
        Self {
            slots: (0..port_count).map(|p| Some(p as u32)).collect(),
        }
    }

    pub fn register(&mut self, physical: usize, logical: u32) -> Result<()> {
        let slot = self
            .slots
            .get_mut(physical)
            .ok_or(SwitchError::InvalidPort(physical))?;
        *slot = Some(logical);
        Ok(())
    }

    pub fn unregister(&mut self, physical: usize) -> Option<u32> {
        self.slots.get_mut(physical).and_then(Option::take)
    }

    pub fn port_count(&self) -> usize {
        self.slots.len()
    }
}

impl LogicalPortMap for StaticPortMap {
    fn logical_port(&self, physical: usize) -> Option<u32> {
        self.slots.get(physical).copied().flatten()
    }
}
