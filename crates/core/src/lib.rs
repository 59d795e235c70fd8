//! T64 system simulator library.
//!
//! This crate implements a functional simulator for the T64 64-bit RISC
//! architecture with the following:
//! 1. **Common:** Bit-field primitives, address helpers, and the trap model.
//! 2. **ISA:** Instruction encoding, one-line assembler, and disassembler.
//! 3. **Core:** CPU state, instruction execution, and trap delivery.
//! 4. **Units:** Instruction/data TLBs and coherent write-back caches.
//! 5. **SoC:** Module bus with address-range routing and snoop broadcast.
//! 6. **Simulation:** Binary loader, configuration, and statistics.

/// Common types and primitives (bit fields, addresses, traps).
pub mod common;
/// Simulator configuration (defaults, hierarchical config structures).
pub mod config;
/// CPU core (architectural state, execution, memory access, trap delivery).
pub mod core;
/// Instruction set (opcodes, field decode, assembler, disassembler, ABI).
pub mod isa;
/// Binary loader.
pub mod sim;
/// System-on-chip (module trait, bus, memory module, processor module).
pub mod soc;
/// Per-processor statistics collection and reporting.
pub mod stats;

/// Root configuration type; use `SimConfig::default()` or deserialize from JSON.
pub use crate::config::SimConfig;
/// CPU architectural state; owned by a processor module.
pub use crate::core::cpu::Cpu;
/// Top-level system (module map, address-range index, bus broadcast).
pub use crate::soc::System;
