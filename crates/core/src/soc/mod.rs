//! System-on-chip: modules, the bus, and address-range routing.

/// Bus operations and the system object.
pub mod bus;
/// Memory module.
pub mod memory;
/// Module trait and address ranges.
pub mod module;
/// Processor module.
pub mod processor;

pub use bus::{BusFault, BusOps, BusView, System};
pub use memory::MemoryModule;
pub use module::{AdrRange, Module, ModuleKind};
pub use processor::ProcessorModule;
