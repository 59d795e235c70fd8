//! Simulation support: loading guest binaries.

/// Raw binary loader.
pub mod loader;
