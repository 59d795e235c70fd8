//! Memory hierarchy units: TLBs and coherent caches.

/// Coherent write-back cache.
pub mod cache;
/// Translation lookaside buffer.
pub mod tlb;

pub use cache::{Cache, LineState};
pub use tlb::{PageType, Tlb, TlbEntry};
