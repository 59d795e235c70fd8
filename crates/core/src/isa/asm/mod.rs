//! One-line assembler.
//!
//! Assembles a single instruction without further context: no labels, no
//! symbol table, comments ignored. Intended for testing instructions from
//! the simulator command surface. The parser is a straightforward
//! recursive-descent LL(1) parser over a tokenizer value, so concurrent
//! callers never share state.

mod error;
mod lexer;
mod parser;

pub use error::{AsmError, AsmErrorKind};

use crate::common::Instr;

/// Assembles one line of T64 assembly into a 32-bit instruction word.
///
/// On rejection the error carries the column of the offending token for
/// caret highlighting in a UI.
///
/// # Arguments
///
/// * `line` - The mnemonic form, e.g. `"ADD R2, R1, 7"` or `"LD.W R3, 0(R2)"`.
pub fn assemble_instr(line: &str) -> Result<Instr, AsmError> {
    parser::parse_line(line)
}
