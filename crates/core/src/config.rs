//! Simulator configuration.
//!
//! Hierarchical configuration with sensible defaults; every structure
//! derives `Deserialize` so a whole system can be described in a JSON file.

use serde::Deserialize;

use crate::common::Word;

/// Default upper bound of the physical memory address range.
pub const DEF_PHYS_MEM_LIMIT: Word = 0x0000_00FF_FFFF_FFFF;

/// Base of the hard physical address (HPA) region; module `n` owns the
/// `HPA_SIZE` bytes starting at `HPA_BASE + n * HPA_SIZE`.
pub const HPA_BASE: Word = 0x0000_F000_0000_0000;

/// Size of one module's HPA range in bytes.
pub const HPA_SIZE: Word = 0x1000;

/// Highest module number the system accepts.
pub const MAX_MODULES: usize = 16;

/// TLB geometry.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct TlbConfig {
    /// Number of entries (rounded up to a power of two).
    pub entries: usize,
}

impl Default for TlbConfig {
    fn default() -> Self {
        Self { entries: 64 }
    }
}

/// Cache geometry.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct CacheConfig {
    /// Number of sets.
    pub sets: usize,
    /// Associativity.
    pub ways: usize,
    /// Line size in bytes; must be a power of two and at least 8.
    pub line_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sets: 64,
            ways: 4,
            line_bytes: 32,
        }
    }
}

/// CPU reset state.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct CpuConfig {
    /// Instruction address loaded into the PSR on reset.
    pub start_ia: Word,
    /// Trap vector base loaded into the IVA control register on reset.
    pub iva: Word,
    /// Upper bound of the untranslated physical memory range.
    pub phys_mem_limit: Word,
}

impl Default for CpuConfig {
    fn default() -> Self {
        Self {
            start_ia: 0,
            iva: 0,
            phys_mem_limit: DEF_PHYS_MEM_LIMIT,
        }
    }
}

/// Memory module geometry.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct MemoryConfig {
    /// Base physical address served by the RAM module.
    pub base: Word,
    /// RAM size in bytes.
    pub size: Word,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            base: 0,
            size: 64 * 1024 * 1024,
        }
    }
}

/// Root configuration for a simulated system.
#[derive(Clone, Copy, Debug, Default, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// CPU reset state.
    pub cpu: CpuConfig,
    /// Instruction and data TLB geometry.
    pub tlb: TlbConfig,
    /// Instruction and data cache geometry.
    pub cache: CacheConfig,
    /// RAM module geometry.
    pub memory: MemoryConfig,
}
