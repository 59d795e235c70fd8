//! Test harness: a small system with one processor and 64 KiB of RAM.
//!
//! Instructions are assembled from mnemonic form and placed in physical
//! memory in wire order; stepping goes through the real fetch path.

use t64_core::common::addr::{psr_ia, PSR_X_BIT};
use t64_core::common::bits::deposit_field;
use t64_core::common::Word;
use t64_core::config::SimConfig;
use t64_core::isa::assemble_instr;
use t64_core::soc::{MemoryModule, ProcessorModule, System};

/// RAM size used by the harness.
pub const RAM_SIZE: Word = 64 * 1024;

/// A single-processor system plus convenience accessors.
pub struct TestContext {
    pub system: System,
}

impl TestContext {
    /// One processor (module 0), 64 KiB of RAM at 0, reset IA 0.
    pub fn new() -> Self {
        Self::with_start_ia(0)
    }

    /// Same, with the reset IA at `start_ia`.
    pub fn with_start_ia(start_ia: Word) -> Self {
        let mut config = SimConfig::default();
        config.memory.size = RAM_SIZE;
        config.cpu.start_ia = start_ia;
        let mut system = System::new();
        system
            .add_module(Box::new(ProcessorModule::new(0, &config)))
            .unwrap();
        system
            .add_module(Box::new(MemoryModule::new(1, 0, RAM_SIZE)))
            .unwrap();
        Self { system }
    }

    /// A two-processor system: modules 0 and 1 are processors, module 2 is
    /// RAM. The second processor starts at `ia1`.
    pub fn dual(ia0: Word, ia1: Word) -> Self {
        let mut config = SimConfig::default();
        config.memory.size = RAM_SIZE;
        config.cpu.start_ia = ia0;
        let mut system = System::new();
        system
            .add_module(Box::new(ProcessorModule::new(0, &config)))
            .unwrap();
        config.cpu.start_ia = ia1;
        system
            .add_module(Box::new(ProcessorModule::new(1, &config)))
            .unwrap();
        system
            .add_module(Box::new(MemoryModule::new(2, 0, RAM_SIZE)))
            .unwrap();
        Self { system }
    }

    /// Assembles `line` and stores the instruction at `adr` in wire order.
    pub fn asm_at(&mut self, adr: Word, line: &str) {
        let word = assemble_instr(line)
            .unwrap_or_else(|e| panic!("harness: {:?} assembling {:?}", e, line));
        self.system
            .write_phys(adr, &word.to_be_bytes())
            .expect("harness: instruction store");
    }

    /// Steps every processor once.
    pub fn step(&mut self) {
        self.system.step();
    }

    /// Steps `n` times.
    pub fn step_n(&mut self, n: u64) {
        self.system.run(n);
    }

    // ── Processor 0 state ─────────────────────────────────

    pub fn reg(&mut self, r: usize) -> Word {
        self.proc(0).cpu().general_reg(r)
    }

    pub fn set_reg(&mut self, r: usize, val: Word) {
        self.proc(0).cpu_mut().set_general_reg(r, val);
    }

    pub fn creg(&mut self, c: usize) -> Word {
        self.proc(0).cpu().control_reg(c)
    }

    pub fn set_creg(&mut self, c: usize, val: Word) {
        self.proc(0).cpu_mut().set_control_reg(c, val);
    }

    pub fn psr(&mut self) -> Word {
        self.proc(0).cpu().psr()
    }

    pub fn set_psr(&mut self, psr: Word) {
        self.proc(0).cpu_mut().set_psr(psr);
    }

    pub fn ia(&mut self) -> Word {
        psr_ia(self.psr())
    }

    /// Clears the X bit, dropping processor 0 to user mode.
    pub fn enter_user_mode(&mut self) {
        let psr = deposit_field(self.psr(), PSR_X_BIT, 1, 0);
        self.set_psr(psr);
    }

    /// Any processor module by number.
    pub fn proc(&mut self, num: usize) -> &mut ProcessorModule {
        self.system.processor_mut(num).expect("processor module")
    }

    // ── Physical memory ───────────────────────────────────

    /// Uncached read of `len` bytes.
    pub fn read_mem(&mut self, padr: Word, len: usize) -> Vec<u8> {
        let mut buf = vec![0; len];
        self.system.read_phys(padr, &mut buf).expect("read_phys");
        buf
    }

    /// Uncached write.
    pub fn write_mem(&mut self, padr: Word, data: &[u8]) {
        self.system.write_phys(padr, data).expect("write_phys");
    }
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Packs a TLB insert info word: physical page, page type, and the L/U
/// flag fields.
pub fn tlb_info(phys_page: Word, page_type: u32, locked: bool, uncached: bool) -> Word {
    let mut info = phys_page & 0x000F_FFFF_FFFF_F000;
    info |= (page_type as Word) << 52;
    if locked {
        info |= 0b01 << 56;
    }
    if uncached {
        info |= 0b01 << 58;
    }
    info
}
