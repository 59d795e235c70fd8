//! Instruction disassembler.
//!
//! Formats a 32-bit instruction word as a mnemonic part and an operand part.
//! The two parts can be requested separately so a code window can show them
//! in aligned columns, or combined with [`format_instr`]. Illegal or
//! reserved encodings render as `**…**` placeholders instead of failing.

use crate::common::Instr;
use crate::isa::decode::{
    bit, dw, field_u, imm13, imm13_scaled, imm15, imm19, imm20, op_key, opt1, reg_a, reg_b, reg_r,
};
use crate::isa::opcodes::*;

/// Width of the aligned opcode column.
pub const OPCODE_FIELD_WIDTH: usize = 16;
/// Width of the aligned operand column.
pub const OPERAND_FIELD_WIDTH: usize = 32;

fn cond_suffix(code: u32) -> &'static str {
    match code {
        COND_EQ => ".EQ",
        COND_LT => ".LT",
        COND_GT => ".GT",
        COND_EV => ".EV",
        COND_NE => ".NE",
        COND_GE => ".GE",
        COND_LE => ".LE",
        COND_OD => ".OD",
        _ => ".**",
    }
}

/// The `.D` width is the default and is not rendered.
fn dw_suffix(dw: u32) -> &'static str {
    match dw {
        0 => ".B",
        1 => ".H",
        2 => ".W",
        _ => "",
    }
}

fn and_or_suffix(instr: Instr, out: &mut String) {
    if bit(instr, 20) {
        out.push_str(".C");
    }
    if bit(instr, 21) {
        out.push_str(".N");
    }
}

/// Renders the opcode and option portion of an instruction.
pub fn opcode_str(instr: Instr) -> String {
    let key = op_key(instr);
    let mut s = String::new();

    match key {
        k if k == op_key_of(GRP_ALU, OPC_NOP) => s.push_str("NOP"),

        k if k == op_key_of(GRP_ALU, OPC_ADD) => s.push_str("ADD"),
        k if k == op_key_of(GRP_ALU, OPC_SUB) => s.push_str("SUB"),
        k if k == op_key_of(GRP_MEM, OPC_ADD) => {
            s.push_str("ADD");
            s.push_str(dw_suffix(dw(instr)));
        }
        k if k == op_key_of(GRP_MEM, OPC_SUB) => {
            s.push_str("SUB");
            s.push_str(dw_suffix(dw(instr)));
        }

        k if k == op_key_of(GRP_ALU, OPC_AND) => {
            s.push_str("AND");
            and_or_suffix(instr, &mut s);
        }
        k if k == op_key_of(GRP_MEM, OPC_AND) => {
            s.push_str("AND");
            s.push_str(dw_suffix(dw(instr)));
            and_or_suffix(instr, &mut s);
        }
        k if k == op_key_of(GRP_ALU, OPC_OR) => {
            s.push_str("OR");
            and_or_suffix(instr, &mut s);
        }
        k if k == op_key_of(GRP_MEM, OPC_OR) => {
            s.push_str("OR");
            s.push_str(dw_suffix(dw(instr)));
            and_or_suffix(instr, &mut s);
        }
        k if k == op_key_of(GRP_ALU, OPC_XOR) => {
            s.push_str("XOR");
            if bit(instr, 20) {
                s.push_str(".**");
            }
            if bit(instr, 21) {
                s.push_str(".N");
            }
        }
        k if k == op_key_of(GRP_MEM, OPC_XOR) => {
            s.push_str("XOR");
            s.push_str(dw_suffix(dw(instr)));
            if bit(instr, 20) {
                s.push_str(".**");
            }
            if bit(instr, 21) {
                s.push_str(".N");
            }
        }

        k if k == op_key_of(GRP_ALU, OPC_CMP_A) || k == op_key_of(GRP_ALU, OPC_CMP_B) => {
            s.push_str("CMP");
            s.push_str(cond_suffix(opt1(instr)));
        }
        k if k == op_key_of(GRP_MEM, OPC_CMP_A) || k == op_key_of(GRP_MEM, OPC_CMP_B) => {
            s.push_str("CMP");
            s.push_str(cond_suffix(opt1(instr)));
            s.push_str(dw_suffix(dw(instr)));
        }

        k if k == op_key_of(GRP_ALU, OPC_BITOP) => match opt1(instr) {
            BITOP_EXTR => {
                s.push_str("EXTR");
                if bit(instr, 12) {
                    s.push_str(".S");
                }
            }
            BITOP_DEP => {
                s.push_str("DEP");
                if bit(instr, 12) {
                    s.push_str(".Z");
                }
            }
            BITOP_DSR => s.push_str("DSR"),
            _ => s.push_str("**BITOP**"),
        },

        k if k == op_key_of(GRP_ALU, OPC_SHAOP) => {
            let dir = if opt1(instr) <= 1 { "SHL" } else { "SHR" };
            match (opt1(instr), dw(instr)) {
                (0..=3, x @ 1..=3) => {
                    s.push_str(dir);
                    s.push_str(&format!("{x}A"));
                }
                _ => s.push_str("**SHAOP**"),
            }
        }

        k if k == op_key_of(GRP_ALU, OPC_IMMOP) => match field_u(instr, 20, 2) {
            IMMOP_ADDIL => s.push_str("ADDIL"),
            IMMOP_LDIL_M => s.push_str("LDIL.M"),
            IMMOP_LDIL_U => s.push_str("LDIL.U"),
            _ => s.push_str("LDIL.L"),
        },

        k if k == op_key_of(GRP_ALU, OPC_LDO) => {
            s.push_str("LDO");
            if opt1(instr) == 0 {
                s.push_str(dw_suffix(dw(instr)));
            }
        }

        k if k == op_key_of(GRP_MEM, OPC_LD) => {
            s.push_str("LD");
            if bit(instr, 20) {
                s.push_str(".U");
            }
            s.push_str(dw_suffix(dw(instr)));
        }
        k if k == op_key_of(GRP_MEM, OPC_ST) => {
            s.push_str("ST");
            s.push_str(dw_suffix(dw(instr)));
        }
        k if k == op_key_of(GRP_MEM, OPC_LDR) => {
            s.push_str("LDR");
            if bit(instr, 20) {
                s.push_str(".U");
            }
        }
        k if k == op_key_of(GRP_MEM, OPC_STC) => {
            s.push_str("STC");
            if opt1(instr) != 0 {
                s.push_str(".**");
            }
        }

        k if k == op_key_of(GRP_BR, OPC_B) => {
            s.push_str("B");
            if field_u(instr, 20, 2) != 0 {
                s.push_str(".**");
            }
            if bit(instr, 19) {
                s.push_str(".G");
            }
        }
        k if k == op_key_of(GRP_BR, OPC_BE) => {
            s.push_str("BE");
            if opt1(instr) != 0 {
                s.push_str(".**");
            }
        }
        k if k == op_key_of(GRP_BR, OPC_BR) => {
            s.push_str("BR");
            s.push_str(target_size_suffix(instr));
        }
        k if k == op_key_of(GRP_BR, OPC_BV) => {
            s.push_str("BV");
            s.push_str(target_size_suffix(instr));
        }
        k if k == op_key_of(GRP_BR, OPC_BB) => {
            s.push_str("BB");
            if bit(instr, 21) {
                s.push_str(".**");
            }
            s.push_str(if bit(instr, 19) { ".T" } else { ".F" });
        }
        k if k == op_key_of(GRP_BR, OPC_CBR) => {
            s.push_str("CBR");
            s.push_str(cond_suffix(opt1(instr)));
        }
        k if k == op_key_of(GRP_BR, OPC_MBR) => {
            s.push_str("MBR");
            s.push_str(cond_suffix(opt1(instr)));
        }
        k if k == op_key_of(GRP_BR, OPC_ABR) => {
            s.push_str("ABR");
            s.push_str(cond_suffix(opt1(instr)));
        }

        k if k == op_key_of(GRP_SYS, OPC_MR) => match opt1(instr) {
            MR_MFCR => s.push_str("MFCR"),
            MR_MTCR => s.push_str("MTCR"),
            4 => s.push_str("MFIA"),
            5 => s.push_str("MFIA.L"),
            6 => s.push_str("MFIA.M"),
            7 => s.push_str("MFIA.U"),
            _ => s.push_str("**MROP**"),
        },
        k if k == op_key_of(GRP_SYS, OPC_LPA) => {
            if opt1(instr) == 0 {
                s.push_str("LPA");
            } else {
                s.push_str("**LPAOP**");
            }
        }
        k if k == op_key_of(GRP_SYS, OPC_PRB) => {
            if opt1(instr) == 0 {
                s.push_str("PRB");
            } else {
                s.push_str("**PRBOP**");
            }
        }
        k if k == op_key_of(GRP_SYS, OPC_TLB) => match opt1(instr) {
            TLB_INSERT_I => s.push_str("IITLB"),
            TLB_INSERT_D => s.push_str("IDTLB"),
            TLB_PURGE_I => s.push_str("PITLB"),
            TLB_PURGE_D => s.push_str("PDTLB"),
            _ => s.push_str("**TLB**"),
        },
        k if k == op_key_of(GRP_SYS, OPC_CA) => match opt1(instr) {
            CA_PURGE_I => s.push_str("PICA"),
            CA_PURGE_D => s.push_str("PDCA"),
            CA_FLUSH_I => s.push_str("FICA"),
            CA_FLUSH_D => s.push_str("FDCA"),
            _ => s.push_str("**CA**"),
        },
        k if k == op_key_of(GRP_SYS, OPC_MST) => match opt1(instr) {
            MST_RSM => s.push_str("RSM"),
            MST_SSM => s.push_str("SSM"),
            _ => s.push_str("**MST**"),
        },
        k if k == op_key_of(GRP_SYS, OPC_RFI) => s.push_str("RFI"),
        k if k == op_key_of(GRP_SYS, OPC_DIAG) => s.push_str("DIAG"),
        k if k == op_key_of(GRP_SYS, OPC_TRAP) => s.push_str("TRAP"),

        _ => s.push_str(&format!("**OPC:{key}**")),
    }

    s.truncate(OPCODE_FIELD_WIDTH);
    s
}

/// Renders the operand portion of an instruction.
pub fn operand_str(instr: Instr) -> String {
    let key = op_key(instr);
    let r = reg_r(instr);
    let b = reg_b(instr);
    let a = reg_a(instr);

    let s = match key {
        k if k == op_key_of(GRP_ALU, OPC_NOP) || k == op_key_of(GRP_SYS, OPC_RFI) => String::new(),

        // ── ALU register / immediate forms ────────────────
        k if k == op_key_of(GRP_ALU, OPC_ADD)
            || k == op_key_of(GRP_ALU, OPC_SUB)
            || k == op_key_of(GRP_ALU, OPC_AND)
            || k == op_key_of(GRP_ALU, OPC_OR)
            || k == op_key_of(GRP_ALU, OPC_XOR) =>
        {
            if bit(instr, 19) {
                format!("R{r},R{b},{}", imm15(instr))
            } else {
                format!("R{r},R{b},R{a}")
            }
        }
        k if k == op_key_of(GRP_ALU, OPC_CMP_A) => format!("R{r},R{b},R{a}"),
        k if k == op_key_of(GRP_ALU, OPC_CMP_B) => {
            format!("R{r},R{b},{}", imm15(instr))
        }

        k if k == op_key_of(GRP_ALU, OPC_BITOP) => match opt1(instr) {
            BITOP_EXTR => {
                if bit(instr, 13) {
                    format!("R{r},R{b},SAR,{}", field_u(instr, 0, 6))
                } else {
                    format!("R{r},R{b},{},{}", field_u(instr, 6, 6), field_u(instr, 0, 6))
                }
            }
            BITOP_DEP => {
                let src = if bit(instr, 14) {
                    format!("{}", field_u(instr, 15, 4))
                } else {
                    format!("R{b}")
                };
                if bit(instr, 13) {
                    format!("R{r},{src},SAR,{}", field_u(instr, 0, 6))
                } else {
                    format!("R{r},{src},{},{}", field_u(instr, 6, 6), field_u(instr, 0, 6))
                }
            }
            BITOP_DSR => {
                if bit(instr, 13) {
                    format!("R{r},R{b},R{a},SAR")
                } else {
                    format!("R{r},R{b},R{a},{}", field_u(instr, 0, 6))
                }
            }
            _ => "**BITOP**".to_string(),
        },

        k if k == op_key_of(GRP_ALU, OPC_SHAOP) => {
            if opt1(instr) & 1 != 0 {
                format!("R{r},R{b},{}", imm13(instr))
            } else {
                format!("R{r},R{b},R{a}")
            }
        }

        k if k == op_key_of(GRP_ALU, OPC_IMMOP) => format!("R{r},{}", imm20(instr)),

        k if k == op_key_of(GRP_ALU, OPC_LDO) => match opt1(instr) {
            0 => format!("R{r},{}(R{b})", imm13_scaled(instr)),
            1 => format!("R{r},R{a}(R{b})"),
            _ => "***".to_string(),
        },

        // ── MEM operand forms ─────────────────────────────
        k if k == op_key_of(GRP_MEM, OPC_ADD)
            || k == op_key_of(GRP_MEM, OPC_SUB)
            || k == op_key_of(GRP_MEM, OPC_AND)
            || k == op_key_of(GRP_MEM, OPC_OR)
            || k == op_key_of(GRP_MEM, OPC_XOR)
            || k == op_key_of(GRP_MEM, OPC_LD)
            || k == op_key_of(GRP_MEM, OPC_ST)
            || k == op_key_of(GRP_MEM, OPC_LDR)
            || k == op_key_of(GRP_MEM, OPC_STC) =>
        {
            if bit(instr, 19) {
                format!("R{r},R{a}(R{b})")
            } else {
                format!("R{r},{}(R{b})", imm13_scaled(instr))
            }
        }
        k if k == op_key_of(GRP_MEM, OPC_CMP_A) => {
            format!("R{r},{}(R{b})", imm13_scaled(instr))
        }
        k if k == op_key_of(GRP_MEM, OPC_CMP_B) => format!("R{r},R{a}(R{b})"),

        // ── Branches ──────────────────────────────────────
        k if k == op_key_of(GRP_BR, OPC_B) => {
            let mut s = format!("{}", imm19(instr) << 2);
            if r != 0 {
                s.push_str(&format!(",R{r}"));
            }
            s
        }
        k if k == op_key_of(GRP_BR, OPC_BE) => {
            let mut s = String::new();
            if imm15(instr) != 0 {
                s.push_str(&format!("{}", imm15(instr) << 2));
            }
            s.push_str(&format!("(R{b})"));
            if r != 0 {
                s.push_str(&format!(",R{r}"));
            }
            s
        }
        k if k == op_key_of(GRP_BR, OPC_BR) => {
            let mut s = format!("R{b}");
            if r != 0 {
                s.push_str(&format!(",R{r}"));
            }
            s
        }
        k if k == op_key_of(GRP_BR, OPC_BV) => {
            let mut s = String::new();
            if a != 0 {
                s.push_str(&format!("R{a}"));
            }
            s.push_str(&format!("(R{b})"));
            if r != 0 {
                s.push_str(&format!(",R{r}"));
            }
            s
        }
        k if k == op_key_of(GRP_BR, OPC_BB) => {
            let pos = if bit(instr, 20) {
                "SAR".to_string()
            } else {
                format!("{}", field_u(instr, 13, 6))
            };
            format!("R{r},{pos},{}", imm13(instr) << 2)
        }
        k if k == op_key_of(GRP_BR, OPC_CBR)
            || k == op_key_of(GRP_BR, OPC_MBR)
            || k == op_key_of(GRP_BR, OPC_ABR) =>
        {
            format!("R{r},R{b},{}", imm15(instr) << 2)
        }

        // ── System ────────────────────────────────────────
        k if k == op_key_of(GRP_SYS, OPC_MR) => match opt1(instr) {
            MR_MFCR => format!("R{r},C{}", field_u(instr, 0, 4)),
            MR_MTCR => format!("C{},R{r}", field_u(instr, 0, 4)),
            4..=7 => format!("R{r}"),
            _ => "**MROP**".to_string(),
        },
        k if k == op_key_of(GRP_SYS, OPC_LPA) || k == op_key_of(GRP_SYS, OPC_CA) => {
            indexed_adr_operands(r, a, b)
        }
        k if k == op_key_of(GRP_SYS, OPC_PRB) => {
            let mode = field_u(instr, 13, 2);
            if mode == 3 {
                format!("R{r},R{b},R{a}")
            } else {
                format!("R{r},R{b},{mode}")
            }
        }
        k if k == op_key_of(GRP_SYS, OPC_TLB) => match opt1(instr) {
            TLB_INSERT_I | TLB_INSERT_D => format!("R{r},R{b},R{a}"),
            TLB_PURGE_I | TLB_PURGE_D => indexed_adr_operands(r, a, b),
            _ => "**TLB**".to_string(),
        },
        k if k == op_key_of(GRP_SYS, OPC_MST) => {
            format!("R{r},{}", field_u(instr, 0, 8))
        }
        k if k == op_key_of(GRP_SYS, OPC_TRAP) => {
            let info = (opt1(instr) << 2) + field_u(instr, 13, 2);
            format!("{info},R{b},R{a}")
        }
        k if k == op_key_of(GRP_SYS, OPC_DIAG) => {
            let op = (opt1(instr) << 2) + field_u(instr, 13, 2);
            format!("R{r},{op},R{b},R{a}")
        }

        _ => format!("**OPC:{key}**"),
    };

    let mut s = s;
    s.truncate(OPERAND_FIELD_WIDTH);
    s
}

/// Renders the whole instruction: opcode part, a space, and operands.
pub fn format_instr(instr: Instr) -> String {
    let opc = opcode_str(instr);
    let ops = operand_str(instr);
    if ops.is_empty() {
        opc
    } else {
        format!("{opc} {ops}")
    }
}

fn indexed_adr_operands(r: usize, a: usize, b: usize) -> String {
    let mut s = format!("R{r},");
    if a != 0 {
        s.push_str(&format!("R{a}"));
    }
    s.push_str(&format!("(R{b})"));
    s
}

fn target_size_suffix(instr: Instr) -> &'static str {
    match dw(instr) {
        0 => ".W",
        1 => ".D",
        2 => ".Q",
        _ => ".**",
    }
}

#[inline]
const fn op_key_of(group: u32, opcode: u32) -> u32 {
    crate::isa::opcodes::op_key(group, opcode)
}
