//! Common types and primitives shared by the whole simulator.

/// Virtual-address and PSR field helpers.
pub mod addr;
/// Bit-field extract/deposit, overflow predicates, endian conversion.
pub mod bits;
/// Trap kinds and the trap packet.
pub mod trap;

pub use addr::VirtAddr;
pub use trap::{Trap, TrapKind};

/// Architectural word: signed 64-bit, also used as address and register value.
pub type Word = i64;

/// Instruction word: 32 bits, big-endian on the wire.
pub type Instr = u32;
