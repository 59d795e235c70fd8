//! Recursive-descent parser for the one-line assembler.
//!
//! The grammar is LL(1): one mnemonic, an optional `.opt` chain, and the
//! operand list. The parser starts from the mnemonic's instruction template
//! (group, opcode family, default Opt1) and deposits fields as operands are
//! recognized. For the mode-type instructions (ADD, SUB, AND, OR, XOR, CMP)
//! the operand shape decides between the ALU and MEM groups, so the group
//! field is rewritten after the shape is known.

use crate::common::bits::{fits_signed_field, fits_unsigned_field, is_aligned_data_adr};
use crate::common::{bits, Instr, Word};
use crate::isa::asm::error::{AsmError, AsmErrorKind};
use crate::isa::asm::lexer::{Lexer, Mnemonic, TokKind, Token};
use crate::isa::decode::{deposit, deposit_bit};
use crate::isa::opcodes::*;

// ── Instruction option flags ──────────────────────────────

const IF_A: u32 = 1 << 1;
const IF_B: u32 = 1 << 2;
const IF_C: u32 = 1 << 3;
const IF_D: u32 = 1 << 4;
const IF_F: u32 = 1 << 5;
const IF_G: u32 = 1 << 6;
const IF_H: u32 = 1 << 7;
const IF_I: u32 = 1 << 8;
const IF_L: u32 = 1 << 9;
const IF_M: u32 = 1 << 11;
const IF_N: u32 = 1 << 12;
const IF_Q: u32 = 1 << 13;
const IF_S: u32 = 1 << 15;
const IF_T: u32 = 1 << 16;
const IF_U: u32 = 1 << 17;
const IF_W: u32 = 1 << 18;
const IF_Z: u32 = 1 << 19;

const IF_EQ: u32 = 1 << 24;
const IF_LT: u32 = 1 << 25;
const IF_NE: u32 = 1 << 26;
const IF_LE: u32 = 1 << 27;
const IF_GT: u32 = 1 << 28;
const IF_GE: u32 = 1 << 29;
const IF_EV: u32 = 1 << 30;
const IF_OD: u32 = 1 << 31;

const IM_DW: u32 = IF_B | IF_H | IF_W | IF_D;
const IM_COND: u32 = IF_EQ | IF_LT | IF_NE | IF_LE | IF_GT | IF_GE | IF_EV | IF_OD;

/// Per-mnemonic mask of option flags the instruction accepts.
fn valid_option_mask(m: Mnemonic) -> u32 {
    use Mnemonic::*;
    match m {
        Add | Sub | St | Ldo => IM_DW,
        And | Or => IM_DW | IF_N | IF_C,
        Xor => IM_DW | IF_N,
        Cmp => IM_DW | IM_COND,
        Extr => IF_S,
        Dep => IF_Z | IF_I,
        Shl1a | Shl2a | Shl3a | Shr1a | Shr2a | Shr3a => IF_I,
        Ldil => IF_L | IF_M | IF_U,
        Ld => IM_DW | IF_U,
        Ldr => IF_D | IF_U,
        Stc => IF_D,
        B => IF_G,
        Br | Bv => IF_W | IF_D | IF_Q,
        Bb => IF_T | IF_F,
        Cbr => IF_EQ | IF_LT | IF_NE | IF_LE | IF_GT | IF_GE,
        Mbr | Abr => IM_COND,
        Mfia => IF_A | IF_L | IF_M | IF_U,
        _ => 0,
    }
}

/// Instruction template: group, opcode family, and initial Opt1 value.
fn template_for(m: Mnemonic) -> Instr {
    use Mnemonic::*;
    match m {
        Nop => template(GRP_ALU, OPC_NOP, 0),
        Add => template(GRP_ALU, OPC_ADD, 0),
        Sub => template(GRP_ALU, OPC_SUB, 0),
        And => template(GRP_ALU, OPC_AND, 0),
        Or => template(GRP_ALU, OPC_OR, 0),
        Xor => template(GRP_ALU, OPC_XOR, 0),
        Cmp => template(GRP_ALU, OPC_CMP_A, 0),
        Extr => template(GRP_ALU, OPC_BITOP, BITOP_EXTR),
        Dep => template(GRP_ALU, OPC_BITOP, BITOP_DEP),
        Dsr => template(GRP_ALU, OPC_BITOP, BITOP_DSR),
        Shl1a | Shl2a | Shl3a => template(GRP_ALU, OPC_SHAOP, 0),
        Shr1a | Shr2a | Shr3a => template(GRP_ALU, OPC_SHAOP, 2),
        Ldil | Addil => template(GRP_ALU, OPC_IMMOP, 0),
        Ldo => template(GRP_ALU, OPC_LDO, 0),
        Ld => template(GRP_MEM, OPC_LD, 0),
        Ldr => template(GRP_MEM, OPC_LDR, 0),
        St => template(GRP_MEM, OPC_ST, 0),
        Stc => template(GRP_MEM, OPC_STC, 0),
        B => template(GRP_BR, OPC_B, 0),
        Be => template(GRP_BR, OPC_BE, 0),
        Br => template(GRP_BR, OPC_BR, 0),
        Bv => template(GRP_BR, OPC_BV, 0),
        Bb => template(GRP_BR, OPC_BB, 0),
        Cbr => template(GRP_BR, OPC_CBR, 0),
        Mbr => template(GRP_BR, OPC_MBR, 0),
        Abr => template(GRP_BR, OPC_ABR, 0),
        Mfcr => template(GRP_SYS, OPC_MR, MR_MFCR),
        Mtcr => template(GRP_SYS, OPC_MR, MR_MTCR),
        Mfia => template(GRP_SYS, OPC_MR, MR_MFIA),
        Lpa => template(GRP_SYS, OPC_LPA, 0),
        Prb => template(GRP_SYS, OPC_PRB, 0),
        Iitlb => template(GRP_SYS, OPC_TLB, TLB_INSERT_I),
        Idtlb => template(GRP_SYS, OPC_TLB, TLB_INSERT_D),
        Pitlb => template(GRP_SYS, OPC_TLB, TLB_PURGE_I),
        Pdtlb => template(GRP_SYS, OPC_TLB, TLB_PURGE_D),
        Pica => template(GRP_SYS, OPC_CA, CA_PURGE_I),
        Pdca => template(GRP_SYS, OPC_CA, CA_PURGE_D),
        Fica => template(GRP_SYS, OPC_CA, CA_FLUSH_I),
        Fdca => template(GRP_SYS, OPC_CA, CA_FLUSH_D),
        Rsm => template(GRP_SYS, OPC_MST, MST_RSM),
        Ssm => template(GRP_SYS, OPC_MST, MST_SSM),
        Rfi => template(GRP_SYS, OPC_RFI, 0),
        Diag => template(GRP_SYS, OPC_DIAG, 0),
        Trap => template(GRP_SYS, OPC_TRAP, 0),
    }
}

/// A reduced expression value: a number or a register reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ExprVal {
    Num(Word),
    GReg(u32),
    CReg(u32),
}

fn has_dw_flags(flags: u32) -> bool {
    flags & IM_DW != 0
}

fn has_cond_flags(flags: u32) -> bool {
    flags & IM_COND != 0
}

fn dw_from_flags(flags: u32) -> u32 {
    if flags & IF_B != 0 {
        0
    } else if flags & IF_H != 0 {
        1
    } else if flags & IF_W != 0 {
        2
    } else {
        3
    }
}

fn replace_group(instr: Instr, group: u32) -> Instr {
    deposit(instr, 30, 2, group)
}

fn replace_opcode(instr: Instr, opcode: u32) -> Instr {
    deposit(instr, 26, 4, opcode)
}

fn cond_code(flags: u32) -> u32 {
    if flags & IF_EQ != 0 {
        COND_EQ
    } else if flags & IF_LT != 0 {
        COND_LT
    } else if flags & IF_GT != 0 {
        COND_GT
    } else if flags & IF_EV != 0 {
        COND_EV
    } else if flags & IF_NE != 0 {
        COND_NE
    } else if flags & IF_GE != 0 {
        COND_GE
    } else if flags & IF_LE != 0 {
        COND_LE
    } else {
        COND_OD
    }
}

/// Parses one input line into an instruction word.
pub(crate) fn parse_line(line: &str) -> Result<Instr, AsmError> {
    let mut p = Parser::new(line)?;
    p.parse_instr()
}

struct Parser {
    lex: Lexer,
    tok: Token,
}

impl Parser {
    fn new(line: &str) -> Result<Self, AsmError> {
        let mut lex = Lexer::new(line);
        let tok = lex.next_token()?;
        Ok(Self { lex, tok })
    }

    fn advance(&mut self) -> Result<(), AsmError> {
        self.tok = self.lex.next_token()?;
        Ok(())
    }

    fn err(&self, kind: AsmErrorKind) -> AsmError {
        AsmError::new(kind, self.tok.col)
    }

    fn accept_comma(&mut self) -> Result<(), AsmError> {
        if self.tok.kind == TokKind::Comma {
            self.advance()
        } else {
            Err(self.err(AsmErrorKind::ExpectedComma))
        }
    }

    fn accept_lparen(&mut self) -> Result<(), AsmError> {
        if self.tok.kind == TokKind::LParen {
            self.advance()
        } else {
            Err(self.err(AsmErrorKind::ExpectedLParen))
        }
    }

    fn accept_rparen(&mut self) -> Result<(), AsmError> {
        if self.tok.kind == TokKind::RParen {
            self.advance()
        } else {
            Err(self.err(AsmErrorKind::ExpectedRParen))
        }
    }

    fn accept_eos(&mut self) -> Result<(), AsmError> {
        if self.tok.kind == TokKind::Eos {
            Ok(())
        } else {
            Err(self.err(AsmErrorKind::ExtraToken))
        }
    }

    // ── Expressions ───────────────────────────────────────

    fn parse_factor(&mut self) -> Result<ExprVal, AsmError> {
        match self.tok.kind {
            TokKind::Num(v) => {
                self.advance()?;
                Ok(ExprVal::Num(v))
            }
            TokKind::GReg(r) => {
                self.advance()?;
                Ok(ExprVal::GReg(r))
            }
            TokKind::CReg(c) => {
                self.advance()?;
                Ok(ExprVal::CReg(c))
            }
            TokKind::Tilde => {
                self.advance()?;
                match self.parse_factor()? {
                    ExprVal::Num(v) => Ok(ExprVal::Num(!v)),
                    _ => Err(self.err(AsmErrorKind::ExpectedNumeric)),
                }
            }
            TokKind::LParen => {
                self.advance()?;
                let v = self.parse_expr()?;
                self.accept_rparen()?;
                Ok(v)
            }
            TokKind::Eos => Err(self.err(AsmErrorKind::UnexpectedEos)),
            _ => Err(self.err(AsmErrorKind::InvalidExpr)),
        }
    }

    fn num_operands(&self, a: ExprVal, b: ExprVal) -> Result<(Word, Word), AsmError> {
        match (a, b) {
            (ExprVal::Num(x), ExprVal::Num(y)) => Ok((x, y)),
            (ExprVal::Num(_), _) | (_, ExprVal::Num(_)) => {
                Err(self.err(AsmErrorKind::ExprTypeMismatch))
            }
            _ => Err(self.err(AsmErrorKind::ExpectedNumeric)),
        }
    }

    fn parse_term(&mut self) -> Result<ExprVal, AsmError> {
        let mut lhs = self.parse_factor()?;
        loop {
            let op = self.tok.kind;
            if !matches!(
                op,
                TokKind::Star | TokKind::Slash | TokKind::Percent | TokKind::Amp
            ) {
                return Ok(lhs);
            }
            self.advance()?;
            let rhs = self.parse_factor()?;
            let (x, y) = self.num_operands(lhs, rhs)?;
            let v = match op {
                TokKind::Star => {
                    if bits::will_mult_overflow(x, y) {
                        return Err(self.err(AsmErrorKind::NumericOverflow));
                    }
                    x * y
                }
                TokKind::Slash => {
                    if bits::will_div_overflow(x, y) {
                        return Err(self.err(AsmErrorKind::NumericOverflow));
                    }
                    x / y
                }
                TokKind::Percent => {
                    if bits::will_div_overflow(x, y) {
                        return Err(self.err(AsmErrorKind::NumericOverflow));
                    }
                    x % y
                }
                _ => x & y,
            };
            lhs = ExprVal::Num(v);
        }
    }

    fn parse_expr(&mut self) -> Result<ExprVal, AsmError> {
        let mut lhs = match self.tok.kind {
            TokKind::Plus => {
                self.advance()?;
                match self.parse_term()? {
                    ExprVal::Num(v) => ExprVal::Num(v),
                    _ => return Err(self.err(AsmErrorKind::ExpectedNumeric)),
                }
            }
            TokKind::Minus => {
                self.advance()?;
                match self.parse_term()? {
                    ExprVal::Num(v) => {
                        if v == i64::MIN {
                            return Err(self.err(AsmErrorKind::NumericOverflow));
                        }
                        ExprVal::Num(-v)
                    }
                    _ => return Err(self.err(AsmErrorKind::ExpectedNumeric)),
                }
            }
            _ => self.parse_term()?,
        };

        loop {
            let op = self.tok.kind;
            if !matches!(
                op,
                TokKind::Plus | TokKind::Minus | TokKind::Pipe | TokKind::Caret
            ) {
                return Ok(lhs);
            }
            self.advance()?;
            let rhs = self.parse_term()?;
            let (x, y) = self.num_operands(lhs, rhs)?;
            let v = match op {
                TokKind::Plus => {
                    if bits::will_add_overflow(x, y) {
                        return Err(self.err(AsmErrorKind::NumericOverflow));
                    }
                    x + y
                }
                TokKind::Minus => {
                    if bits::will_sub_overflow(x, y) {
                        return Err(self.err(AsmErrorKind::NumericOverflow));
                    }
                    x - y
                }
                TokKind::Pipe => x | y,
                _ => x ^ y,
            };
            lhs = ExprVal::Num(v);
        }
    }

    // ── Field deposit with range checks ───────────────────

    fn deposit_s(
        &self,
        instr: Instr,
        pos: u32,
        len: u32,
        val: Word,
        col: usize,
    ) -> Result<Instr, AsmError> {
        if fits_signed_field(val, len) {
            Ok(deposit(instr, pos, len, val as u32))
        } else {
            Err(AsmError::new(AsmErrorKind::ImmValRange, col))
        }
    }

    fn deposit_u(
        &self,
        instr: Instr,
        pos: u32,
        len: u32,
        val: Word,
        col: usize,
    ) -> Result<Instr, AsmError> {
        if fits_unsigned_field(val, len) {
            Ok(deposit(instr, pos, len, val as u32))
        } else {
            Err(AsmError::new(AsmErrorKind::ImmValRange, col))
        }
    }

    /// Checks the offset against the data width, then deposits `ofs >> dw`
    /// as the scaled 13-bit immediate.
    fn deposit_scaled_imm13(
        &self,
        instr: Instr,
        flags: u32,
        ofs: Word,
        col: usize,
    ) -> Result<Instr, AsmError> {
        let dw = dw_from_flags(flags);
        if !is_aligned_data_adr(ofs, 1 << dw) {
            return Err(AsmError::new(AsmErrorKind::InvalidOffset, col));
        }
        self.deposit_s(instr, 0, 13, ofs >> dw, col)
    }

    // ── Register operands ─────────────────────────────────

    fn accept_reg(&mut self, instr: Instr, pos: u32) -> Result<Instr, AsmError> {
        let col = self.tok.col;
        match self.parse_expr()? {
            ExprVal::GReg(r) => Ok(deposit(instr, pos, 4, r)),
            _ => Err(AsmError::new(AsmErrorKind::ExpectedGeneralReg, col)),
        }
    }

    fn accept_reg_r(&mut self, instr: Instr) -> Result<Instr, AsmError> {
        self.accept_reg(instr, 22)
    }

    fn accept_reg_b(&mut self, instr: Instr) -> Result<Instr, AsmError> {
        self.accept_reg(instr, 15)
    }

    fn accept_reg_a(&mut self, instr: Instr) -> Result<Instr, AsmError> {
        self.accept_reg(instr, 9)
    }

    // ── Options ───────────────────────────────────────────

    /// Parses the `.opt` chain following the mnemonic and returns the flag
    /// set, validated against the instruction's option mask.
    fn parse_options(&mut self, m: Mnemonic) -> Result<u32, AsmError> {
        let mut flags = 0u32;
        let mut opt_col = self.tok.col;

        while self.tok.kind == TokKind::Period {
            self.advance()?;
            opt_col = self.tok.col;
            let name = self.tok.lexeme.clone();
            if name.is_empty() {
                return Err(self.err(AsmErrorKind::InvalidInstrOption));
            }

            match name.as_str() {
                "EQ" => flags |= IF_EQ,
                "LT" => flags |= IF_LT,
                "NE" => flags |= IF_NE,
                "GE" => flags |= IF_GE,
                "GT" => flags |= IF_GT,
                "LE" => flags |= IF_LE,
                "OD" => flags |= IF_OD,
                "EV" => flags |= IF_EV,
                _ => {
                    for ch in name.chars() {
                        flags |= match ch {
                            'A' => IF_A,
                            'B' => IF_B,
                            'C' => IF_C,
                            'D' => IF_D,
                            'F' => IF_F,
                            'G' => IF_G,
                            'H' => IF_H,
                            'I' => IF_I,
                            'L' => IF_L,
                            'M' => IF_M,
                            'N' => IF_N,
                            'Q' => IF_Q,
                            'S' => IF_S,
                            'T' => IF_T,
                            'U' => IF_U,
                            'W' => IF_W,
                            'Z' => IF_Z,
                            _ => return Err(AsmError::new(AsmErrorKind::InvalidInstrOption, opt_col)),
                        };
                    }
                }
            }
            self.advance()?;
        }

        for group in [
            IF_W | IF_D | IF_Q,
            IM_DW,
            IM_COND,
            IF_T | IF_F,
            IF_L | IF_M | IF_U,
        ] {
            if (flags & group).count_ones() > 1 {
                return Err(AsmError::new(AsmErrorKind::DuplicateInstrOption, opt_col));
            }
        }

        if flags & !valid_option_mask(m) != 0 {
            return Err(AsmError::new(AsmErrorKind::InvalidInstrOption, opt_col));
        }

        Ok(flags)
    }

    // ── Instruction dispatch ──────────────────────────────

    fn parse_instr(&mut self) -> Result<Instr, AsmError> {
        use Mnemonic::*;

        let m = match self.tok.kind {
            TokKind::Opcode(m) => m,
            _ => return Err(self.err(AsmErrorKind::ExpectedOpCode)),
        };
        let instr = template_for(m);
        self.advance()?;

        match m {
            Nop => {
                self.accept_eos()?;
                Ok(instr)
            }
            Add | Sub | And | Or | Xor | Cmp => self.parse_mode_type(instr, m),
            Extr => self.parse_extr(instr, m),
            Dep => self.parse_dep(instr, m),
            Dsr => self.parse_dsr(instr),
            Shl1a | Shl2a | Shl3a => self.parse_shxa(instr, m, true),
            Shr1a | Shr2a | Shr3a => self.parse_shxa(instr, m, false),
            Ldil | Addil => self.parse_immop(instr, m),
            Ldo => self.parse_ldo(instr, m),
            Ld | Ldr | St | Stc => self.parse_mem(instr, m),
            B => self.parse_b(instr, m),
            Be => self.parse_be(instr),
            Br => self.parse_br(instr, m),
            Bv => self.parse_bv(instr, m),
            Bb => self.parse_bb(instr, m),
            Cbr | Mbr | Abr => self.parse_xbr(instr, m),
            Mfcr => self.parse_mfcr(instr),
            Mtcr => self.parse_mtcr(instr),
            Mfia => self.parse_mfia(instr, m),
            Lpa => self.parse_adr_op(instr),
            Prb => self.parse_prb(instr),
            Iitlb | Idtlb => self.parse_insert_tlb(instr),
            Pitlb | Pdtlb | Pica | Pdca | Fica | Fdca => self.parse_adr_op(instr),
            Rsm | Ssm => self.parse_mst(instr),
            Rfi => {
                self.accept_eos()?;
                Ok(instr)
            }
            Diag => self.parse_diag(instr),
            Trap => self.parse_trap(instr),
        }
    }

    /// Mode-type instructions: the operand shape picks the group.
    ///
    /// ```text
    ///   op [.opt] R, B, num     ALU, immediate
    ///   op [.opt] R, B, A       ALU, register
    ///   op [.opt] R, ofs(B)     MEM, offset
    ///   op [.opt] R, A(B)       MEM, indexed
    /// ```
    fn parse_mode_type(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(ofs) => {
                instr = replace_group(instr, GRP_MEM);
                if m == Mnemonic::Cmp {
                    instr = replace_opcode(instr, OPC_CMP_A);
                }
                instr = deposit(instr, 13, 2, dw_from_flags(flags));
                instr = self.deposit_scaled_imm13(instr, flags, ofs, vcol)?;
                self.accept_lparen()?;
                instr = self.accept_reg_b(instr)?;
                self.accept_rparen()?;
                self.accept_eos()?;
            }
            ExprVal::GReg(reg) => {
                if self.tok.kind == TokKind::Comma {
                    // ALU form; the data width options belong to the MEM form.
                    if has_dw_flags(flags) {
                        return Err(AsmError::new(AsmErrorKind::InvalidInstrMode, vcol));
                    }
                    instr = deposit(instr, 15, 4, reg);

                    self.advance()?;
                    let scol = self.tok.col;
                    match self.parse_expr()? {
                        ExprVal::Num(v) => {
                            if m == Mnemonic::Cmp {
                                instr = replace_opcode(instr, OPC_CMP_B);
                            } else {
                                instr = deposit_bit(instr, 19, true);
                            }
                            instr = self.deposit_s(instr, 0, 15, v, scol)?;
                        }
                        ExprVal::GReg(a) => {
                            if m == Mnemonic::Cmp {
                                instr = replace_opcode(instr, OPC_CMP_A);
                            }
                            instr = deposit(instr, 9, 4, a);
                        }
                        ExprVal::CReg(_) => {
                            return Err(AsmError::new(AsmErrorKind::ExpectedGeneralReg, scol))
                        }
                    }
                    self.accept_eos()?;
                } else if self.tok.kind == TokKind::LParen {
                    instr = replace_group(instr, GRP_MEM);
                    if m == Mnemonic::Cmp {
                        instr = replace_opcode(instr, OPC_CMP_B);
                    } else {
                        instr = deposit_bit(instr, 19, true);
                    }
                    instr = deposit(instr, 13, 2, dw_from_flags(flags));
                    instr = deposit(instr, 9, 4, reg);

                    self.advance()?;
                    instr = self.accept_reg_b(instr)?;
                    self.accept_rparen()?;
                    self.accept_eos()?;
                } else {
                    return Err(self.err(AsmErrorKind::ExpectedComma));
                }
            }
            ExprVal::CReg(_) => return Err(AsmError::new(AsmErrorKind::ExpectedGeneralReg, vcol)),
        }

        match m {
            Mnemonic::And | Mnemonic::Or => {
                if flags & IF_C != 0 {
                    instr = deposit_bit(instr, 20, true);
                }
                if flags & IF_N != 0 {
                    instr = deposit_bit(instr, 21, true);
                }
            }
            Mnemonic::Xor => {
                if flags & IF_N != 0 {
                    instr = deposit_bit(instr, 21, true);
                }
            }
            Mnemonic::Cmp => {
                if !has_cond_flags(flags) {
                    return Err(self.err(AsmErrorKind::InvalidInstrMode));
                }
                instr = deposit(instr, 19, 3, cond_code(flags));
            }
            _ => {}
        }

        Ok(instr)
    }

    /// `EXTR [.S] R, B, pos|SAR, len`
    fn parse_extr(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;
        instr = self.accept_reg_b(instr)?;
        self.accept_comma()?;

        let mut pos: Word = 0;
        let pcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(v) => {
                instr = self.deposit_u(instr, 6, 6, v, pcol)?;
                pos = v;
            }
            ExprVal::CReg(c) if c as usize == CR_SHAMT => {
                instr = deposit_bit(instr, 13, true);
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedPosArg, pcol)),
        }
        self.accept_comma()?;

        let lcol = self.tok.col;
        let len = match self.parse_expr()? {
            ExprVal::Num(v) => {
                instr = self.deposit_u(instr, 0, 6, v, lcol)?;
                v
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedLenArg, lcol)),
        };

        if flags & IF_S != 0 {
            instr = deposit_bit(instr, 12, true);
        }
        self.accept_eos()?;

        if pos + len > 64 {
            return Err(AsmError::new(AsmErrorKind::BitRangeExceeds, lcol));
        }
        Ok(instr)
    }

    /// `DEP [.Z] R, (B | imm4), pos|SAR, len`
    fn parse_dep(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        if flags & IF_Z != 0 {
            instr = deposit_bit(instr, 12, true);
        }
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::GReg(b) => instr = deposit(instr, 15, 4, b),
            ExprVal::Num(v) => {
                instr = self.deposit_u(instr, 15, 4, v, vcol)?;
                instr = deposit_bit(instr, 14, true);
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedPosArg, vcol)),
        }
        self.accept_comma()?;

        let mut pos: Word = 0;
        let pcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::CReg(c) if c as usize == CR_SHAMT => {
                instr = deposit_bit(instr, 13, true);
            }
            ExprVal::Num(v) => {
                instr = self.deposit_u(instr, 6, 6, v, pcol)?;
                pos = v;
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedPosArg, pcol)),
        }
        self.accept_comma()?;

        let lcol = self.tok.col;
        let len = match self.parse_expr()? {
            ExprVal::Num(v) => {
                instr = self.deposit_u(instr, 0, 6, v, lcol)?;
                v
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedLenArg, lcol)),
        };
        self.accept_eos()?;

        if pos + len > 64 {
            return Err(AsmError::new(AsmErrorKind::BitRangeExceeds, lcol));
        }
        Ok(instr)
    }

    /// `DSR R, B, A, shamt|SAR`
    fn parse_dsr(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;
        instr = self.accept_reg_b(instr)?;
        self.accept_comma()?;
        instr = self.accept_reg_a(instr)?;
        self.accept_comma()?;

        let scol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(v) => instr = self.deposit_u(instr, 0, 6, v, scol)?,
            ExprVal::CReg(c) if c as usize == CR_SHAMT => {
                instr = deposit_bit(instr, 13, true);
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedLenArg, scol)),
        }
        self.accept_eos()?;
        Ok(instr)
    }

    /// `SHLxA / SHRxA R, B, (A | imm13)` — x lives in the data-width field.
    fn parse_shxa(&mut self, mut instr: Instr, m: Mnemonic, shl: bool) -> Result<Instr, AsmError> {
        use Mnemonic::*;
        self.parse_options(m)?;

        let x = match m {
            Shl1a | Shr1a => 1,
            Shl2a | Shr2a => 2,
            _ => 3,
        };
        instr = deposit(instr, 13, 2, x);

        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;
        instr = self.accept_reg_b(instr)?;
        self.accept_comma()?;

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::GReg(a) => {
                instr = deposit(instr, 19, 3, if shl { 0 } else { 2 });
                instr = deposit(instr, 9, 4, a);
            }
            ExprVal::Num(v) => {
                instr = deposit(instr, 19, 3, if shl { 1 } else { 3 });
                instr = self.deposit_s(instr, 0, 13, v, vcol)?;
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedGeneralReg, vcol)),
        }
        self.accept_eos()?;
        Ok(instr)
    }

    /// `LDIL [.L/M/U] R, imm20` and `ADDIL R, imm20`
    fn parse_immop(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;

        let mode = if m == Mnemonic::Addil {
            IMMOP_ADDIL
        } else if flags & IF_M != 0 {
            IMMOP_LDIL_M
        } else if flags & IF_U != 0 {
            IMMOP_LDIL_U
        } else {
            IMMOP_LDIL_L
        };
        instr = deposit(instr, 20, 2, mode);

        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(v) => instr = self.deposit_u(instr, 0, 20, v, vcol)?,
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedNumeric, vcol)),
        }
        self.accept_eos()?;
        Ok(instr)
    }

    /// `LDO [.B/H/W/D] R, ofs(B)` or `LDO R, A(B)`
    fn parse_ldo(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        instr = deposit(instr, 13, 2, dw_from_flags(flags));
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(ofs) => {
                instr = self.deposit_scaled_imm13(instr, flags, ofs, vcol)?;
            }
            ExprVal::GReg(a) => {
                // The indexed form has no width scaling.
                if has_dw_flags(flags) && flags & IF_D == 0 {
                    return Err(AsmError::new(AsmErrorKind::InvalidInstrOption, vcol));
                }
                instr = deposit(instr, 13, 2, 0);
                instr = deposit_bit(instr, 19, true);
                instr = deposit(instr, 9, 4, a);
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedNumeric, vcol)),
        }

        self.accept_lparen()?;
        instr = self.accept_reg_b(instr)?;
        self.accept_rparen()?;
        self.accept_eos()?;
        Ok(instr)
    }

    /// `LD/ST [.B/H/W/D/U] R, ofs(B)` or `R, A(B)`; `LDR/STC R, ofs(B)`
    fn parse_mem(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        instr = deposit(instr, 13, 2, dw_from_flags(flags));
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;

        if flags & IF_U != 0 {
            instr = deposit_bit(instr, 20, true);
        }

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(ofs) => {
                instr = deposit_bit(instr, 19, false);
                instr = self.deposit_scaled_imm13(instr, flags, ofs, vcol)?;
            }
            ExprVal::GReg(a) => {
                if matches!(m, Mnemonic::Ldr | Mnemonic::Stc) {
                    return Err(AsmError::new(AsmErrorKind::InvalidInstrMode, vcol));
                }
                instr = deposit_bit(instr, 19, true);
                instr = deposit(instr, 9, 4, a);
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedNumeric, vcol)),
        }

        self.accept_lparen()?;
        instr = self.accept_reg_b(instr)?;
        self.accept_rparen()?;
        self.accept_eos()?;
        Ok(instr)
    }

    /// `B [.G] ofs [, R]`
    fn parse_b(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        if flags & IF_G != 0 {
            instr = deposit_bit(instr, 19, true);
        }

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(ofs) => {
                if ofs & 0x3 != 0 {
                    return Err(AsmError::new(AsmErrorKind::InvalidOffset, vcol));
                }
                instr = self.deposit_s(instr, 0, 19, ofs >> 2, vcol)?;
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedBrOfs, vcol)),
        }

        instr = self.opt_link_reg(instr)?;
        Ok(instr)
    }

    /// `BE ofs(B) [, R]` or `BE (B) [, R]`
    fn parse_be(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(ofs) => {
                if ofs & 0x3 != 0 {
                    return Err(AsmError::new(AsmErrorKind::InvalidOffset, vcol));
                }
                instr = self.deposit_s(instr, 0, 15, ofs >> 2, vcol)?;
                self.accept_lparen()?;
                instr = self.accept_reg_b(instr)?;
                self.accept_rparen()?;
            }
            // A parenthesized base alone reduces to a register expression.
            ExprVal::GReg(b) => instr = deposit(instr, 15, 4, b),
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedBrOfs, vcol)),
        }

        instr = self.opt_link_reg(instr)?;
        Ok(instr)
    }

    /// `BR [.W/D/Q] B [, R]`
    fn parse_br(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        instr = deposit(instr, 13, 2, target_size_mode(flags));
        instr = self.accept_reg_b(instr)?;
        instr = self.opt_link_reg(instr)?;
        Ok(instr)
    }

    /// `BV [.W/D/Q] [X,] (B) [, R]`
    fn parse_bv(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        instr = deposit(instr, 13, 2, target_size_mode(flags));

        if let TokKind::GReg(_) = self.tok.kind {
            instr = self.accept_reg_a(instr)?;
            if self.tok.kind == TokKind::Comma {
                self.advance()?;
            }
        }

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::GReg(b) => instr = deposit(instr, 15, 4, b),
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedLParen, vcol)),
        }

        instr = self.opt_link_reg(instr)?;
        Ok(instr)
    }

    /// `BB .T/F R, pos|SAR, ofs`
    fn parse_bb(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        if flags & IF_T != 0 {
            instr = deposit_bit(instr, 19, true);
        } else if flags & IF_F == 0 {
            return Err(self.err(AsmErrorKind::InvalidInstrOption));
        }

        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;

        let pcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(v) => instr = self.deposit_u(instr, 13, 6, v, pcol)?,
            ExprVal::CReg(c) if c as usize == CR_SHAMT => {
                instr = deposit_bit(instr, 20, true);
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedPosArg, pcol)),
        }
        self.accept_comma()?;

        let ocol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(ofs) => {
                if ofs & 0x3 != 0 {
                    return Err(AsmError::new(AsmErrorKind::InvalidOffset, ocol));
                }
                instr = self.deposit_s(instr, 0, 13, ofs >> 2, ocol)?;
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedBrOfs, ocol)),
        }
        self.accept_eos()?;
        Ok(instr)
    }

    /// `CBR/MBR/ABR .cond R, B, ofs`
    fn parse_xbr(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        if !has_cond_flags(flags) {
            return Err(self.err(AsmErrorKind::InvalidInstrOption));
        }
        instr = deposit(instr, 19, 3, cond_code(flags));

        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;
        instr = self.accept_reg_b(instr)?;
        self.accept_comma()?;

        let ocol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(ofs) => {
                if ofs & 0x3 != 0 {
                    return Err(AsmError::new(AsmErrorKind::InvalidOffset, ocol));
                }
                instr = self.deposit_s(instr, 0, 15, ofs >> 2, ocol)?;
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedBrOfs, ocol)),
        }
        self.accept_eos()?;
        Ok(instr)
    }

    /// `MFCR R, C`
    fn parse_mfcr(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;

        let ccol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::CReg(c) => instr = deposit(instr, 0, 4, c),
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedControlReg, ccol)),
        }
        self.accept_eos()?;
        Ok(instr)
    }

    /// `MTCR C, R`
    fn parse_mtcr(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        let ccol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::CReg(c) => instr = deposit(instr, 0, 4, c),
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedControlReg, ccol)),
        }
        self.accept_comma()?;
        instr = self.accept_reg_r(instr)?;
        self.accept_eos()?;
        Ok(instr)
    }

    /// `MFIA [.A/L/M/U] R`
    fn parse_mfia(&mut self, mut instr: Instr, m: Mnemonic) -> Result<Instr, AsmError> {
        let flags = self.parse_options(m)?;
        let opt = if flags & IF_L != 0 {
            5
        } else if flags & IF_M != 0 {
            6
        } else if flags & IF_U != 0 {
            7
        } else {
            4
        };
        instr = deposit(instr, 19, 3, opt);
        instr = self.accept_reg_r(instr)?;
        self.accept_eos()?;
        Ok(instr)
    }

    /// `LPA / PITLB / PDTLB / PICA / PDCA / FICA / FDCA R, [X](B)`
    fn parse_adr_op(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;

        if let TokKind::GReg(_) = self.tok.kind {
            instr = self.accept_reg_a(instr)?;
        }

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::GReg(b) => instr = deposit(instr, 15, 4, b),
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedLParen, vcol)),
        }
        self.accept_eos()?;
        Ok(instr)
    }

    /// `PRB R, B, (A | mode)`
    fn parse_prb(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;
        instr = self.accept_reg_b(instr)?;
        self.accept_comma()?;

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::GReg(a) => {
                instr = deposit(instr, 9, 4, a);
                instr = deposit(instr, 13, 2, 3);
            }
            ExprVal::Num(v) => {
                if !(0..=2).contains(&v) {
                    return Err(AsmError::new(AsmErrorKind::ImmValRange, vcol));
                }
                instr = deposit(instr, 13, 2, v as u32);
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedGeneralReg, vcol)),
        }
        self.accept_eos()?;
        Ok(instr)
    }

    /// `IITLB / IDTLB R, B, A`
    fn parse_insert_tlb(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;
        instr = self.accept_reg_b(instr)?;
        self.accept_comma()?;
        instr = self.accept_reg_a(instr)?;
        self.accept_eos()?;
        Ok(instr)
    }

    /// `RSM / SSM R, mask`
    fn parse_mst(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(v) => instr = self.deposit_u(instr, 0, 8, v, vcol)?,
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedNumeric, vcol)),
        }
        self.accept_eos()?;
        Ok(instr)
    }

    /// `DIAG R, op, B, A`
    fn parse_diag(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        instr = self.accept_reg_r(instr)?;
        self.accept_comma()?;

        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(v) => {
                if !fits_unsigned_field(v, 5) {
                    return Err(AsmError::new(AsmErrorKind::ImmValRange, vcol));
                }
                instr = deposit(instr, 19, 3, (v >> 2) as u32);
                instr = deposit(instr, 13, 2, (v & 0x3) as u32);
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedNumeric, vcol)),
        }
        self.accept_comma()?;
        instr = self.accept_reg_b(instr)?;
        self.accept_comma()?;
        instr = self.accept_reg_a(instr)?;
        self.accept_eos()?;
        Ok(instr)
    }

    /// `TRAP info, B, A`
    fn parse_trap(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        let vcol = self.tok.col;
        match self.parse_expr()? {
            ExprVal::Num(v) => {
                if !fits_unsigned_field(v, 5) {
                    return Err(AsmError::new(AsmErrorKind::ImmValRange, vcol));
                }
                instr = deposit(instr, 13, 2, (v & 0x3) as u32);
                instr = deposit(instr, 19, 3, ((v >> 2) & 0x7) as u32);
            }
            _ => return Err(AsmError::new(AsmErrorKind::ExpectedNumeric, vcol)),
        }
        self.accept_comma()?;
        instr = self.accept_reg_b(instr)?;
        self.accept_comma()?;
        instr = self.accept_reg_a(instr)?;
        self.accept_eos()?;
        Ok(instr)
    }

    /// Parses the optional trailing `, R` link register and the end of line.
    fn opt_link_reg(&mut self, mut instr: Instr) -> Result<Instr, AsmError> {
        if self.tok.kind == TokKind::Comma {
            self.advance()?;
            instr = self.accept_reg_r(instr)?;
        }
        self.accept_eos()?;
        Ok(instr)
    }
}

fn target_size_mode(flags: u32) -> u32 {
    if flags & IF_D != 0 {
        1
    } else if flags & IF_Q != 0 {
        2
    } else {
        0
    }
}
