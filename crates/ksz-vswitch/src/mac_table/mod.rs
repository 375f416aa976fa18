//! Static MAC address filtering table.
//!
//! Holds the software mirror of the chip's static MAC table together with
//! the ALU metadata recording which device installed each address and why.
//! Rows are written to the chip by the hardware commit path, which clears
//! the per-row dirty flag.

mod table;
mod types;

pub use table::AddressTable;
pub use types::{AluEntry, ForwardReason, MacTableEntry};
