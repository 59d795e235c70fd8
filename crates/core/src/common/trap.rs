//! Trap kinds and the trap packet.
//!
//! Any check that fails during instruction fetch or execution raises a
//! `Trap`, which bubbles through the handler `Result`s until the step
//! boundary catches it and commits it to architectural state (IPSR, IINSTR,
//! IARG0/IARG1, PSR redirected to the trap vector).

use std::error::Error;
use std::fmt::{self, Display, Formatter};

use crate::common::{Instr, Word};

/// The architectural trap taxonomy.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrapKind {
    /// Instruction address not word-aligned.
    InstrAlignment,
    /// I-TLB lookup returned no entry.
    InstrTlbMiss,
    /// Region-ID or access-rights check failed on fetch.
    InstrProtection,
    /// Effective data address not aligned to the data width.
    DataAlignment,
    /// D-TLB lookup returned no entry.
    DataTlbMiss,
    /// Region-ID or access-rights check failed on a data access.
    DataProtection,
    /// Privileged resource touched with the X bit clear.
    PrivOperation,
    /// Signed arithmetic or shift-left overflow.
    Overflow,
    /// Undefined Opt1 value or reserved encoding.
    IllegalInstr,
    /// TRAP instruction; carries the 5-bit info field.
    ProgrammedTrap(u32),
}

/// A trap in flight: the kind plus the architectural state captured at the
/// point of the fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Trap {
    /// What went wrong.
    pub kind: TrapKind,
    /// PSR snapshot at the fault.
    pub psr: Word,
    /// The faulting instruction word (0 when the fault precedes the fetch).
    pub instr: Instr,
    /// Trap-kind specific argument (usually the faulting address).
    pub arg0: Word,
    /// Second trap-kind specific argument.
    pub arg1: Word,
}

impl Trap {
    /// Builds a trap packet capturing the current PSR and instruction word.
    pub fn new(kind: TrapKind, psr: Word, instr: Instr, arg0: Word, arg1: Word) -> Self {
        Self {
            kind,
            psr,
            instr,
            arg0,
            arg1,
        }
    }
}

impl Display for Trap {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.kind {
            TrapKind::InstrAlignment => {
                write!(f, "instruction alignment trap at {:#x}", self.arg0)
            }
            TrapKind::InstrTlbMiss => write!(f, "instruction TLB miss at {:#x}", self.arg0),
            TrapKind::InstrProtection => {
                write!(f, "instruction protection trap at {:#x}", self.arg0)
            }
            TrapKind::DataAlignment => write!(f, "data alignment trap at {:#x}", self.arg0),
            TrapKind::DataTlbMiss => write!(f, "data TLB miss at {:#x}", self.arg0),
            TrapKind::DataProtection => write!(f, "data protection trap at {:#x}", self.arg0),
            TrapKind::PrivOperation => write!(f, "privileged operation trap"),
            TrapKind::Overflow => write!(f, "overflow trap"),
            TrapKind::IllegalInstr => write!(f, "illegal instruction {:#010x}", self.instr),
            TrapKind::ProgrammedTrap(info) => write!(f, "programmed trap {}", info),
        }
    }
}

impl Error for Trap {}

/// Handler result: instruction semantics either complete or raise a trap.
pub type ExecResult<T = ()> = Result<T, Trap>;
