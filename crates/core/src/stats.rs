//! Per-processor statistics.

/// Counters a processor module maintains across steps.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessorStats {
    /// Instructions retired, including ones that trapped.
    pub instruction_count: u64,
    /// Simulated cycles; one per step in this functional model.
    pub cycle_count: u64,
    /// Traps delivered.
    pub traps_taken: u64,
}

impl ProcessorStats {
    /// Prints a short report to stdout.
    pub fn print(&self, module_num: usize) {
        println!(
            "module {}: {} instructions, {} cycles, {} traps",
            module_num, self.instruction_count, self.cycle_count, self.traps_taken
        );
    }
}
