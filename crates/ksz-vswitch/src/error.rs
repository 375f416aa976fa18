//! Error types for switch table and steering operations.
//!
//! Every table error is returned synchronously to the caller and never
//! retried internally. Frame errors mean the frame is dropped.

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for switch operations.
pub type Result<T> = std::result::Result<T, SwitchError>;

/// Hardware table a table error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    StaticMac,
    Vlan,
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::StaticMac => write!(f, "static MAC table"),
            TableKind::Vlan => write!(f, "VLAN table"),
        }
    }
}

/// Errors raised by the switch core.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Every slot of the table is valid.
    #[error("{0} is full")]
    CapacityExceeded(TableKind),

    /// Duplicate key on add.
    #[error("{table} entry already exists: {key}")]
    AlreadyExists {
        /// Table that refused the add.
        table: TableKind,
        /// The duplicate key.
        key: String,
    },

    /// Remove or lookup on an absent key.
    #[error("{table} entry not found: {key}")]
    NotFound {
        /// Table that was searched.
        table: TableKind,
        /// The missing key.
        key: String,
    },

    /// Forwarding domain id space exhausted.
    #[error("No free forwarding domain ids")]
    DomainsExhausted,

    /// Forwarding domain id out of range or not held.
    #[error("Forwarding domain {0} is not held")]
    DomainNotHeld(u16),

    /// Port bitmask wider than the tag or naming inactive ports.
    #[error("Invalid port mask {0:#x}")]
    InvalidPortMask(u32),

    /// Malformed tail tag byte on receive.
    #[error("Invalid tail tag {0:#04x}")]
    InvalidTag(u8),

    /// Frame below the minimum tag-safe length.
    #[error("Frame too short for tail tag: {len} < {min}")]
    FrameTooShort {
        /// Actual frame length.
        len: usize,
        /// Minimum tag-safe length.
        min: usize,
    },

    /// Physical port index out of range.
    #[error("Invalid port {0}")]
    InvalidPort(usize),

    /// VLAN id outside 1..=4095.
    #[error("Invalid VLAN id {0}")]
    InvalidVlan(u16),

    /// No logical device is registered for the physical port.
    #[error("No logical device for physical port {0}")]
    UnmappedPort(usize),

    /// Hardware commit collaborator failed.
    #[error("Hardware write failed: {0}")]
    Hardware(String),

    /// Logical port device refused a received frame.
    #[error("Frame delivery failed: {0}")]
    Delivery(String),

    /// Configuration validation error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl SwitchError {
    pub fn already_exists(table: TableKind, key: impl fmt::Display) -> Self {
        Self::AlreadyExists {
            table,
            key: key.to_string(),
        }
    }

    pub fn not_found(table: TableKind, key: impl fmt::Display) -> Self {
        Self::NotFound {
            table,
            key: key.to_string(),
        }
    }

    /// Returns true if the error means the frame must be dropped.
    pub fn is_frame_error(&self) -> bool {
        matches!(
            self,
            SwitchError::InvalidTag(_)
                | SwitchError::InvalidPortMask(_)
                | SwitchError::FrameTooShort { .. }
                | SwitchError::UnmappedPort(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SwitchError::CapacityExceeded(TableKind::StaticMac);
        assert_eq!(err.to_string(), "static MAC table is full");

        let err = SwitchError::not_found(TableKind::Vlan, 100);
        assert_eq!(err.to_string(), "VLAN table entry not found: 100");

        let err = SwitchError::InvalidTag(0x03);
        assert_eq!(err.to_string(), "Invalid tail tag 0x03");
    }

    #[test]
    fn test_already_exists_key() {
        let err = SwitchError::already_exists(TableKind::StaticMac, "aa:bb:cc:dd:ee:ff/0");
        assert!(matches!(
            err,
            SwitchError::AlreadyExists { table: TableKind::StaticMac, ref key } if key == "aa:bb:cc:dd:ee:ff/0"
        ));
    }

    #[test]
    fn test_is_frame_error() {
        assert!(SwitchError::InvalidTag(0).is_frame_error());
        assert!(SwitchError::FrameTooShort { len: 10, min: 60 }.is_frame_error());
        assert!(SwitchError::UnmappedPort(3).is_frame_error());
        assert!(!SwitchError::DomainsExhausted.is_frame_error());
        assert!(!SwitchError::CapacityExceeded(TableKind::Vlan).is_frame_error());
    }
}
