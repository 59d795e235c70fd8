//! Register names of the T64 runtime architecture.
//!
//! The assembler accepts the architectural names `R0`..`R15` and `C0`..`C15`
//! as well as the runtime-convention synonyms (`T0`..`T6`, `ARG0`..`ARG3`,
//! `RET0`..`RET3`, `DP`, `RL`, `SP`, and `SAR` for the shift amount control
//! register). The disassembler always renders architectural names.

/// Return-link register by convention.
pub const REG_RL: usize = 14;
/// Stack pointer by convention.
pub const REG_SP: usize = 15;

/// Resolves a general-register name (uppercase) to its number.
pub fn lookup_greg(name: &str) -> Option<u32> {
    let num = match name {
        "R0" => 0,
        "R1" | "T0" => 1,
        "R2" | "T1" => 2,
        "R3" | "T2" => 3,
        "R4" | "T3" => 4,
        "R5" | "T4" => 5,
        "R6" | "T5" => 6,
        "R7" | "T6" => 7,
        "R8" | "ARG3" | "RET3" => 8,
        "R9" | "ARG2" | "RET2" => 9,
        "R10" | "ARG1" | "RET1" => 10,
        "R11" | "ARG0" | "RET0" => 11,
        "R12" => 12,
        "R13" | "DP" => 13,
        "R14" | "RL" => 14,
        "R15" | "SP" => 15,
        _ => return None,
    };
    Some(num)
}

/// Resolves a control-register name (uppercase) to its number.
pub fn lookup_creg(name: &str) -> Option<u32> {
    if name == "SAR" {
        return Some(crate::isa::opcodes::CR_SHAMT as u32);
    }
    let rest = name.strip_prefix('C')?;
    let num: u32 = rest.parse().ok()?;
    if num < 16 && rest.len() <= 2 && !rest.starts_with('+') {
        Some(num)
    } else {
        None
    }
}
