//! Static VLAN table.
//!
//! Binds each VLAN id to a forwarding domain and a port membership mask.
//! Domains come from [`ForwardingDomainTable`](crate::fid::ForwardingDomainTable).

mod table;
mod types;

pub use table::VlanTable;
pub use types::VlanTableEntry;
