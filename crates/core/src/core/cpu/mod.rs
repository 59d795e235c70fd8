//! CPU architectural state.
//!
//! The `Cpu` owns what a program can observe: the general and control
//! register files, the PSR, the reservation for LDR/STC, and the bounds of
//! the untranslated physical memory window. The memory hierarchy lives in
//! the surrounding processor module and is passed in per step.

/// Instruction execution engine.
pub mod execution;
/// Memory access paths (fetch, data read, data write).
pub mod memory;
/// Trap delivery and return.
pub mod trap;

use crate::common::addr::{psr_with_ia, PSR_X_BIT};
use crate::common::bits::deposit_field;
use crate::common::trap::{Trap, TrapKind};
use crate::common::{Instr, Word};
use crate::config::CpuConfig;
use crate::isa::decode;
use crate::isa::opcodes::{CR_IVA, MAX_CREGS, MAX_GREGS};

pub use memory::MemCtx;

/// T64 CPU architectural state.
pub struct Cpu {
    gregs: [Word; MAX_GREGS],
    cregs: [Word; MAX_CREGS],
    psr: Word,
    instr_reg: Instr,
    resv: Option<Word>,
    lower_phys_mem: Word,
    upper_phys_mem: Word,
    start_ia: Word,
    iva: Word,
}

impl Cpu {
    /// Creates a CPU in its reset state.
    pub fn new(config: &CpuConfig) -> Self {
        let mut cpu = Self {
            gregs: [0; MAX_GREGS],
            cregs: [0; MAX_CREGS],
            psr: 0,
            instr_reg: 0,
            resv: None,
            lower_phys_mem: 0,
            upper_phys_mem: config.phys_mem_limit,
            start_ia: config.start_ia,
            iva: config.iva,
        };
        cpu.reset();
        cpu
    }

    /// Returns the CPU to its reset state: registers cleared, PSR pointing
    /// at the start address in privileged mode, IVA reloaded.
    pub fn reset(&mut self) {
        self.gregs = [0; MAX_GREGS];
        self.cregs = [0; MAX_CREGS];
        self.psr = deposit_field(psr_with_ia(0, self.start_ia), PSR_X_BIT, 1, 1);
        self.instr_reg = 0;
        self.resv = None;
        self.cregs[CR_IVA] = self.iva;
    }

    // ── Simulator register access ─────────────────────────

    /// Reads a general register; R0 is always zero.
    pub fn general_reg(&self, index: usize) -> Word {
        if index % MAX_GREGS == 0 {
            0
        } else {
            self.gregs[index % MAX_GREGS]
        }
    }

    /// Writes a general register; writes to R0 are dropped.
    pub fn set_general_reg(&mut self, index: usize, val: Word) {
        if index % MAX_GREGS != 0 {
            self.gregs[index % MAX_GREGS] = val;
        }
    }

    /// Reads a control register.
    pub fn control_reg(&self, index: usize) -> Word {
        self.cregs[index % MAX_CREGS]
    }

    /// Writes a control register.
    pub fn set_control_reg(&mut self, index: usize, val: Word) {
        self.cregs[index % MAX_CREGS] = val;
    }

    /// The program status register.
    pub fn psr(&self) -> Word {
        self.psr
    }

    /// Replaces the program status register.
    pub fn set_psr(&mut self, val: Word) {
        self.psr = val;
    }

    /// The most recently fetched instruction word.
    pub fn instr_reg(&self) -> Instr {
        self.instr_reg
    }

    // ── Register fields of the current instruction ────────

    pub(crate) fn reg_r_val(&self, instr: Instr) -> Word {
        self.general_reg(decode::reg_r(instr))
    }

    pub(crate) fn reg_b_val(&self, instr: Instr) -> Word {
        self.general_reg(decode::reg_b(instr))
    }

    pub(crate) fn reg_a_val(&self, instr: Instr) -> Word {
        self.general_reg(decode::reg_a(instr))
    }

    pub(crate) fn set_reg_r(&mut self, instr: Instr, val: Word) {
        self.set_general_reg(decode::reg_r(instr), val);
    }

    // ── Reservation (LDR / STC) ───────────────────────────

    /// Places the reservation on a physical address.
    pub(crate) fn set_reservation(&mut self, padr: Word) {
        self.resv = Some(padr);
    }

    /// Clears the reservation; returns the address it covered.
    pub(crate) fn take_reservation(&mut self) -> Option<Word> {
        self.resv.take()
    }

    /// The current reservation, if any.
    pub fn reservation(&self) -> Option<Word> {
        self.resv
    }

    /// Drops the reservation when `padr` falls into the same line.
    pub(crate) fn clear_reservation_if_line(&mut self, padr: Word, line_bytes: usize) {
        if let Some(resv) = self.resv {
            let mask = !(line_bytes as u64 - 1);
            if resv as u64 & mask == padr as u64 & mask {
                self.resv = None;
            }
        }
    }

    // ── Trap packet helpers ───────────────────────────────

    /// Builds a trap packet for a fault inside instruction execution.
    pub(crate) fn trap(&self, kind: TrapKind, arg0: Word, arg1: Word) -> Trap {
        Trap::new(kind, self.psr, self.instr_reg, arg0, arg1)
    }

    /// Builds a trap packet for a fault during instruction fetch, before
    /// an instruction word exists.
    pub(crate) fn fetch_trap(&self, kind: TrapKind, arg0: Word) -> Trap {
        Trap::new(kind, self.psr, 0, arg0, 0)
    }
}
