//! Virtual switch core for tail-tagged KSZ switch chips.
//!
//! The chip's host port is shared by several logical port devices. This
//! crate keeps the software copies of the chip's static tables and decides,
//! per frame, which physical ports a frame reaches:
//!
//! ```text
//!   logical port devices
//!          │ ▲
//!   tx     ▼ │  rx
//! [PortSteering] ── AddressTable / VlanTable / ForwardingDomainTable
//!          │ ▲
//!          ▼ │  one trailing tail tag byte per frame
//!     host link ──> [switch chip] ──> physical ports
//! ```
//!
//! # Key Components
//!
//! - [`switch::SwitchState`]: all tables and per-port configuration
//! - [`switch::VirtualSwitch`]: locked, audited handle and hardware commit
//! - [`steering::PortSteering`]: transmit/receive port resolution
//! - [`tail_tag::TailTagCodec`]: tail tag encoding
//! - [`config::SwitchConfig`]: TOML configuration for the `kszswd` daemon

pub mod audit;
pub mod config;
pub mod error;
pub mod fid;
pub mod hw;
pub mod mac_table;
pub mod port;
pub mod steering;
pub mod switch;
pub mod tail_tag;
pub mod types;
pub mod vlan;

pub use config::SwitchConfig;
pub use error::{Result, SwitchError, TableKind};
pub use fid::{ForwardingDomainTable, FID_NONE};
pub use hw::{LoggingWriter, TableUpdate, TableWriter};
pub use mac_table::{AddressTable, ForwardReason, MacTableEntry};
pub use port::{PortConfig, SpanningTree, StpState};
pub use steering::{FrameHeader, FrameSink, LogicalPortMap, PortSteering, StaticPortMap};
pub use switch::{CommitReport, SwitchState, SwitchStats, VirtualSwitch};
pub use tail_tag::{RxSource, TailTagCodec, TxDestination};
pub use types::{MacAddress, PortMask};
pub use vlan::{VlanTable, VlanTableEntry};
