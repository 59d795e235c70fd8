//! Instruction execution engine.
//!
//! `step` fetches one instruction, dispatches on the `group * 16 + opcode`
//! key, runs the family handler, and delivers any raised trap before
//! returning. Architectural writes happen only after every check in the
//! handler has passed; the PSR advance is the last thing a non-branching
//! handler does.

use tracing::{event, Level};

use super::memory::{page_permits, Access, MemCtx};
use super::Cpu;
use crate::common::addr::{psr_ia, psr_with_ia, psr_x_bit, PSR_X_BIT};
use crate::common::bits::{
    add_adr_ofs32, deposit_field, extract_bit64, extract_field64, extract_signed_field64,
    shift_right128, will_add_overflow, will_shift_left_overflow, will_sub_overflow,
};
use crate::common::trap::{ExecResult, TrapKind};
use crate::common::{Instr, VirtAddr, Word};
use crate::isa::decode::{bit, dw, field_u, imm13, imm15, imm19, imm20, op_key, opt1};
use crate::isa::opcodes::{op_key as opk, *};

const K_ALU_NOP: u32 = opk(GRP_ALU, OPC_NOP);
const K_ALU_ADD: u32 = opk(GRP_ALU, OPC_ADD);
const K_ALU_SUB: u32 = opk(GRP_ALU, OPC_SUB);
const K_ALU_AND: u32 = opk(GRP_ALU, OPC_AND);
const K_ALU_OR: u32 = opk(GRP_ALU, OPC_OR);
const K_ALU_XOR: u32 = opk(GRP_ALU, OPC_XOR);
const K_ALU_CMP_A: u32 = opk(GRP_ALU, OPC_CMP_A);
const K_ALU_CMP_B: u32 = opk(GRP_ALU, OPC_CMP_B);
const K_ALU_BITOP: u32 = opk(GRP_ALU, OPC_BITOP);
const K_ALU_SHAOP: u32 = opk(GRP_ALU, OPC_SHAOP);
const K_ALU_IMMOP: u32 = opk(GRP_ALU, OPC_IMMOP);
const K_ALU_LDO: u32 = opk(GRP_ALU, OPC_LDO);

const K_MEM_ADD: u32 = opk(GRP_MEM, OPC_ADD);
const K_MEM_SUB: u32 = opk(GRP_MEM, OPC_SUB);
const K_MEM_AND: u32 = opk(GRP_MEM, OPC_AND);
const K_MEM_OR: u32 = opk(GRP_MEM, OPC_OR);
const K_MEM_XOR: u32 = opk(GRP_MEM, OPC_XOR);
const K_MEM_CMP_A: u32 = opk(GRP_MEM, OPC_CMP_A);
const K_MEM_CMP_B: u32 = opk(GRP_MEM, OPC_CMP_B);
const K_MEM_LD: u32 = opk(GRP_MEM, OPC_LD);
const K_MEM_ST: u32 = opk(GRP_MEM, OPC_ST);
const K_MEM_LDR: u32 = opk(GRP_MEM, OPC_LDR);
const K_MEM_STC: u32 = opk(GRP_MEM, OPC_STC);

const K_BR_B: u32 = opk(GRP_BR, OPC_B);
const K_BR_BE: u32 = opk(GRP_BR, OPC_BE);
const K_BR_BR: u32 = opk(GRP_BR, OPC_BR);
const K_BR_BV: u32 = opk(GRP_BR, OPC_BV);
const K_BR_BB: u32 = opk(GRP_BR, OPC_BB);
const K_BR_CBR: u32 = opk(GRP_BR, OPC_CBR);
const K_BR_ABR: u32 = opk(GRP_BR, OPC_ABR);
const K_BR_MBR: u32 = opk(GRP_BR, OPC_MBR);

const K_SYS_MR: u32 = opk(GRP_SYS, OPC_MR);
const K_SYS_LPA: u32 = opk(GRP_SYS, OPC_LPA);
const K_SYS_PRB: u32 = opk(GRP_SYS, OPC_PRB);
const K_SYS_TLB: u32 = opk(GRP_SYS, OPC_TLB);
const K_SYS_CA: u32 = opk(GRP_SYS, OPC_CA);
const K_SYS_MST: u32 = opk(GRP_SYS, OPC_MST);
const K_SYS_RFI: u32 = opk(GRP_SYS, OPC_RFI);
const K_SYS_DIAG: u32 = opk(GRP_SYS, OPC_DIAG);
const K_SYS_TRAP: u32 = opk(GRP_SYS, OPC_TRAP);

/// Evaluates a compare condition code.
fn eval_cond(cond: u32, v1: Word, v2: Word) -> Word {
    let taken = match cond {
        COND_EQ => v1 == v2,
        COND_LT => v1 < v2,
        COND_GT => v1 > v2,
        COND_EV => v1 & 1 == 0,
        COND_NE => v1 != v2,
        COND_GE => v1 >= v2,
        COND_LE => v1 <= v2,
        _ => v1 & 1 == 1,
    };
    taken as Word
}

impl Cpu {
    /// Fetches, executes, and retires one instruction; a raised trap is
    /// delivered to architectural state before returning.
    ///
    /// Returns the trap kind when the instruction trapped.
    pub fn step(&mut self, mem: &mut MemCtx) -> Option<TrapKind> {
        let result = self.fetch_and_execute(mem);
        match result {
            Ok(()) => None,
            Err(t) => {
                event!(Level::DEBUG, trap = %t, "trap delivered");
                self.deliver_trap(&t);
                Some(t.kind)
            }
        }
    }

    fn fetch_and_execute(&mut self, mem: &mut MemCtx) -> ExecResult {
        let ia = psr_ia(self.psr());
        let instr = self.instr_read(mem, VirtAddr(ia))?;
        self.set_instr_reg(instr);
        event!(Level::TRACE, ia, instr, "execute");
        self.execute(mem, instr)
    }

    /// Advances the PSR to the next sequential instruction.
    fn next_instr(&mut self) {
        let psr = add_adr_ofs32(self.psr(), 4);
        self.set_psr(psr);
    }

    /// Current instruction address.
    fn ia(&self) -> Word {
        psr_ia(self.psr())
    }

    /// The IA-relative branch target with 32-bit offset wraparound.
    fn branch_to_ofs(&mut self, ofs: Word) {
        let psr = add_adr_ofs32(self.psr(), ofs);
        self.set_psr(psr);
    }

    /// Redirects the IA to an absolute target.
    fn branch_to(&mut self, target: Word) {
        let psr = psr_with_ia(self.psr(), extract_field64(target, 0, 52));
        self.set_psr(psr);
    }

    /// The return-link value: address of the following instruction.
    fn link_val(&self) -> Word {
        psr_ia(add_adr_ofs32(self.psr(), 4))
    }

    fn illegal(&self) -> ExecResult {
        Err(self.trap(TrapKind::IllegalInstr, 0, 0))
    }

    fn priv_op_check(&self) -> ExecResult {
        if psr_x_bit(self.psr()) {
            Ok(())
        } else {
            Err(self.trap(TrapKind::PrivOperation, 0, 0))
        }
    }

    fn overflow_add_check(&self, a: Word, b: Word) -> ExecResult {
        if will_add_overflow(a, b) {
            Err(self.trap(TrapKind::Overflow, 0, 0))
        } else {
            Ok(())
        }
    }

    fn overflow_sub_check(&self, a: Word, b: Word) -> ExecResult {
        if will_sub_overflow(a, b) {
            Err(self.trap(TrapKind::Overflow, 0, 0))
        } else {
            Ok(())
        }
    }

    /// Shift amount from the SAR control register.
    fn sar_val(&self) -> u32 {
        (self.control_reg(CR_SHAMT) & 0x3F) as u32
    }

    /// Dispatches one decoded instruction to its family handler.
    pub(crate) fn execute(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        match op_key(instr) {
            K_ALU_NOP => {
                self.next_instr();
                Ok(())
            }
            K_ALU_ADD => self.alu_add(instr),
            K_ALU_SUB => self.alu_sub(instr),
            K_ALU_AND | K_ALU_OR | K_ALU_XOR => self.alu_logical(instr),
            K_ALU_CMP_A | K_ALU_CMP_B => self.alu_cmp(instr),
            K_ALU_BITOP => self.alu_bitop(instr),
            K_ALU_SHAOP => self.alu_shaop(instr),
            K_ALU_IMMOP => self.alu_immop(instr),
            K_ALU_LDO => self.alu_ldo(instr),

            K_MEM_ADD => self.mem_add(mem, instr),
            K_MEM_SUB => self.mem_sub(mem, instr),
            K_MEM_AND | K_MEM_OR | K_MEM_XOR => self.mem_logical(mem, instr),
            K_MEM_CMP_A | K_MEM_CMP_B => self.mem_cmp(mem, instr),
            K_MEM_LD => self.mem_ld(mem, instr),
            K_MEM_ST => self.mem_st(mem, instr),
            K_MEM_LDR => self.mem_ldr(mem, instr),
            K_MEM_STC => self.mem_stc(mem, instr),

            K_BR_B => self.br_b(instr),
            K_BR_BE => self.br_be(instr),
            K_BR_BR => self.br_br(instr),
            K_BR_BV => self.br_bv(instr),
            K_BR_BB => self.br_bb(instr),
            K_BR_CBR => self.br_cbr(instr),
            K_BR_ABR => self.br_abr(instr),
            K_BR_MBR => self.br_mbr(instr),

            K_SYS_MR => self.sys_mr(instr),
            K_SYS_LPA => self.sys_lpa(mem, instr),
            K_SYS_PRB => self.sys_prb(mem, instr),
            K_SYS_TLB => self.sys_tlb(mem, instr),
            K_SYS_CA => self.sys_ca(mem, instr),
            K_SYS_MST => self.sys_mst(instr),
            K_SYS_RFI => self.sys_rfi(instr),
            K_SYS_DIAG => self.sys_diag(instr),
            K_SYS_TRAP => self.sys_trap(instr),

            _ => self.illegal(),
        }
    }

    pub(crate) fn set_instr_reg(&mut self, instr: Instr) {
        self.instr_reg = instr;
    }

    // ── ALU group ─────────────────────────────────────────

    fn alu_src(&self, instr: Instr) -> ExecResult<Word> {
        match opt1(instr) {
            0 => Ok(self.reg_a_val(instr)),
            1 => Ok(imm15(instr)),
            _ => Err(self.trap(TrapKind::IllegalInstr, 0, 0)),
        }
    }

    fn alu_add(&mut self, instr: Instr) -> ExecResult {
        let val1 = self.reg_b_val(instr);
        let val2 = self.alu_src(instr)?;
        self.overflow_add_check(val1, val2)?;
        self.set_reg_r(instr, val1 + val2);
        self.next_instr();
        Ok(())
    }

    fn alu_sub(&mut self, instr: Instr) -> ExecResult {
        let val1 = self.reg_b_val(instr);
        let val2 = self.alu_src(instr)?;
        self.overflow_sub_check(val1, val2)?;
        self.set_reg_r(instr, val1 - val2);
        self.next_instr();
        Ok(())
    }

    /// AND/OR with the C (complement left operand) and N (negate result)
    /// bits; XOR supports N only.
    fn alu_logical(&mut self, instr: Instr) -> ExecResult {
        let mut val1 = self.reg_b_val(instr);
        let val2 = if bit(instr, 19) {
            imm15(instr)
        } else {
            self.reg_a_val(instr)
        };

        let is_xor = op_key(instr) == K_ALU_XOR;
        if bit(instr, 20) {
            if is_xor {
                return self.illegal();
            }
            val1 = !val1;
        }
        let mut res = match op_key(instr) {
            K_ALU_AND => val1 & val2,
            K_ALU_OR => val1 | val2,
            _ => val1 ^ val2,
        };
        if bit(instr, 21) {
            res = !res;
        }
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    fn alu_cmp(&mut self, instr: Instr) -> ExecResult {
        let val1 = self.reg_b_val(instr);
        let val2 = if crate::isa::decode::op_code(instr) == OPC_CMP_B {
            imm15(instr)
        } else {
            self.reg_a_val(instr)
        };
        self.set_reg_r(instr, eval_cond(opt1(instr), val1, val2));
        self.next_instr();
        Ok(())
    }

    /// EXTR / DEP / DSR, selected by Opt1.
    fn alu_bitop(&mut self, instr: Instr) -> ExecResult {
        match opt1(instr) {
            BITOP_EXTR => {
                let val = self.reg_b_val(instr);
                let len = field_u(instr, 0, 6);
                let pos = if bit(instr, 13) {
                    self.sar_val()
                } else {
                    field_u(instr, 6, 6)
                };
                let res = if bit(instr, 12) {
                    extract_signed_field64(val, pos, len)
                } else {
                    extract_field64(val, pos, len)
                };
                self.set_reg_r(instr, res);
            }
            BITOP_DEP => {
                let len = field_u(instr, 0, 6);
                let pos = if bit(instr, 13) {
                    self.sar_val()
                } else {
                    field_u(instr, 6, 6)
                };
                let base = if bit(instr, 12) {
                    0
                } else {
                    self.reg_r_val(instr)
                };
                let val = if bit(instr, 14) {
                    field_u(instr, 15, 4) as Word
                } else {
                    self.reg_b_val(instr)
                };
                self.set_reg_r(instr, deposit_field(base, pos, len, val));
            }
            BITOP_DSR => {
                let hi = self.reg_b_val(instr);
                let lo = self.reg_a_val(instr);
                let shamt = if bit(instr, 13) {
                    self.sar_val()
                } else {
                    field_u(instr, 0, 6)
                };
                self.set_reg_r(instr, shift_right128(hi, lo, shamt));
            }
            _ => return self.illegal(),
        }
        self.next_instr();
        Ok(())
    }

    /// SHLxA / SHRxA: shift B by the width-encoded amount, then add.
    fn alu_shaop(&mut self, instr: Instr) -> ExecResult {
        let val1 = self.reg_b_val(instr);
        let shamt = dw(instr);
        let opt = opt1(instr);

        let val2 = match opt {
            0 | 2 => self.reg_a_val(instr),
            1 | 3 => imm13(instr),
            _ => return self.illegal(),
        };

        let res = if opt <= 1 {
            if will_shift_left_overflow(val1, shamt) {
                return Err(self.trap(TrapKind::Overflow, 0, 0));
            }
            val1 << shamt
        } else {
            val1 >> shamt
        };

        self.overflow_add_check(res, val2)?;
        self.set_reg_r(instr, res + val2);
        self.next_instr();
        Ok(())
    }

    /// ADDIL and the LDIL.L/M/U wide-constant loads.
    fn alu_immop(&mut self, instr: Instr) -> ExecResult {
        let val = imm20(instr);
        let old = self.reg_r_val(instr);
        let res = match field_u(instr, 20, 2) {
            IMMOP_ADDIL => add_adr_ofs32(old, val),
            IMMOP_LDIL_L => val << 12,
            IMMOP_LDIL_M => deposit_field(old, 32, 20, val),
            _ => deposit_field(old, 52, 12, val),
        };
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    /// Effective address computation without memory access.
    fn alu_ldo(&mut self, instr: Instr) -> ExecResult {
        let ea = match opt1(instr) {
            0 => self.ea_ofs_imm13(instr),
            1 => self.ea_ofs_regx(instr),
            _ => return self.illegal(),
        };
        self.set_reg_r(instr, ea.0);
        self.next_instr();
        Ok(())
    }

    // ── MEM group ─────────────────────────────────────────

    fn mem_operand(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult<Word> {
        if bit(instr, 19) {
            self.data_read_ofs_regx(mem, instr, true)
        } else {
            self.data_read_ofs_imm13(mem, instr, true)
        }
    }

    fn mem_add(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        let val1 = self.reg_r_val(instr);
        let val2 = self.mem_operand(mem, instr)?;
        self.overflow_add_check(val1, val2)?;
        self.set_reg_r(instr, val1 + val2);
        self.next_instr();
        Ok(())
    }

    fn mem_sub(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        let val1 = self.reg_r_val(instr);
        let val2 = self.mem_operand(mem, instr)?;
        self.overflow_sub_check(val1, val2)?;
        self.set_reg_r(instr, val1 - val2);
        self.next_instr();
        Ok(())
    }

    fn mem_logical(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        let mut val1 = self.reg_r_val(instr);
        let val2 = self.mem_operand(mem, instr)?;

        let is_xor = op_key(instr) == K_MEM_XOR;
        if bit(instr, 20) {
            if is_xor {
                return self.illegal();
            }
            val1 = !val1;
        }
        let mut res = match op_key(instr) {
            K_MEM_AND => val1 & val2,
            K_MEM_OR => val1 | val2,
            _ => val1 ^ val2,
        };
        if bit(instr, 21) {
            res = !res;
        }
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    fn mem_cmp(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        let val1 = self.reg_r_val(instr);
        let val2 = if crate::isa::decode::op_code(instr) == OPC_CMP_B {
            self.data_read_ofs_regx(mem, instr, true)?
        } else {
            self.data_read_ofs_imm13(mem, instr, true)?
        };
        self.set_reg_r(instr, eval_cond(opt1(instr), val1, val2));
        self.next_instr();
        Ok(())
    }

    fn mem_ld(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        let sext = !bit(instr, 20);
        let val = match opt1(instr) {
            0 => self.data_read_ofs_imm13(mem, instr, sext)?,
            1 => self.data_read_ofs_regx(mem, instr, sext)?,
            _ => return self.illegal(),
        };
        self.set_reg_r(instr, val);
        self.next_instr();
        Ok(())
    }

    fn mem_st(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        match opt1(instr) {
            0 => self.data_write_ofs_imm13(mem, instr)?,
            1 => self.data_write_ofs_regx(mem, instr)?,
            _ => return self.illegal(),
        }
        self.next_instr();
        Ok(())
    }

    /// Load-reserved: the load plus a reservation on the physical line.
    fn mem_ldr(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        if opt1(instr) != 0 {
            return self.illegal();
        }
        let sext = !bit(instr, 20);
        let vadr = self.ea_ofs_imm13(instr);
        let val = self.data_read(mem, vadr, crate::isa::decode::dw_len(instr), sext)?;
        let padr = self.resolve_data_padr(mem, vadr)?;
        self.set_reservation(padr);
        self.set_reg_r(instr, val);
        self.next_instr();
        Ok(())
    }

    /// Store-conditional: the store happens only while the reservation
    /// still stands; R reports 1 for success, 0 for failure. The
    /// reservation is consumed either way.
    fn mem_stc(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        if opt1(instr) != 0 {
            return self.illegal();
        }
        let vadr = self.ea_ofs_imm13(instr);
        let padr = self.resolve_data_padr(mem, vadr)?;
        let held = self.take_reservation() == Some(padr);
        if held {
            let val = self.reg_r_val(instr);
            self.data_write(mem, vadr, val, crate::isa::decode::dw_len(instr))?;
        }
        self.set_reg_r(instr, held as Word);
        self.next_instr();
        Ok(())
    }

    // ── BR group ──────────────────────────────────────────

    /// IA-relative branch; Opt1 bit 19 is the gateway form, which enters
    /// privileged execution at the target.
    fn br_b(&mut self, instr: Instr) -> ExecResult {
        let ofs = imm19(instr) << 2;
        let rl = self.link_val();
        if bit(instr, 19) {
            let psr = deposit_field(self.psr(), PSR_X_BIT, 1, 1);
            self.set_psr(psr);
        }
        self.branch_to_ofs(ofs);
        self.set_reg_r(instr, rl);
        Ok(())
    }

    /// External branch: target is `B + (imm15 << 2)`.
    fn br_be(&mut self, instr: Instr) -> ExecResult {
        if opt1(instr) != 0 {
            return self.illegal();
        }
        let target = add_adr_ofs32(self.reg_b_val(instr), imm15(instr) << 2);
        let rl = self.link_val();
        self.branch_to(target);
        self.set_reg_r(instr, rl);
        Ok(())
    }

    /// IA-relative branch by register distance.
    fn br_br(&mut self, instr: Instr) -> ExecResult {
        if opt1(instr) != 0 {
            return self.illegal();
        }
        let target = add_adr_ofs32(self.ia(), self.reg_b_val(instr));
        if target & 0x3 != 0 {
            return Err(self.trap(TrapKind::InstrAlignment, target, 0));
        }
        let rl = self.link_val();
        self.branch_to(target);
        self.set_reg_r(instr, rl);
        Ok(())
    }

    /// Vectored branch: target is `B + X`.
    fn br_bv(&mut self, instr: Instr) -> ExecResult {
        let target = add_adr_ofs32(self.reg_b_val(instr), self.reg_a_val(instr));
        if target & 0x3 != 0 {
            return Err(self.trap(TrapKind::InstrAlignment, target, 0));
        }
        let rl = self.link_val();
        self.branch_to(target);
        self.set_reg_r(instr, rl);
        Ok(())
    }

    /// Branch on bit: taken when bit `pos` of R matches the T/F sense.
    fn br_bb(&mut self, instr: Instr) -> ExecResult {
        if bit(instr, 21) {
            return self.illegal();
        }
        let pos = if bit(instr, 20) {
            self.sar_val()
        } else {
            field_u(instr, 13, 6)
        };
        let test = extract_bit64(self.reg_r_val(instr), pos) != 0;
        let sense = bit(instr, 19);
        if test == sense {
            self.branch_to_ofs(imm13(instr) << 2);
        } else {
            self.next_instr();
        }
        Ok(())
    }

    /// Compare and branch.
    fn br_cbr(&mut self, instr: Instr) -> ExecResult {
        let val1 = self.reg_r_val(instr);
        let val2 = self.reg_b_val(instr);
        if eval_cond(opt1(instr), val1, val2) != 0 {
            self.branch_to_ofs(imm15(instr) << 2);
        } else {
            self.next_instr();
        }
        Ok(())
    }

    /// Add and branch: R receives the sum, branch tests the sum against 0.
    fn br_abr(&mut self, instr: Instr) -> ExecResult {
        let val1 = self.reg_r_val(instr);
        let val2 = self.reg_b_val(instr);
        self.overflow_add_check(val1, val2)?;
        let sum = val1 + val2;
        self.set_reg_r(instr, sum);
        if eval_cond(opt1(instr), sum, 0) != 0 {
            self.branch_to_ofs(imm15(instr) << 2);
        } else {
            self.next_instr();
        }
        Ok(())
    }

    /// Move and branch: R receives B, branch tests B against 0.
    fn br_mbr(&mut self, instr: Instr) -> ExecResult {
        let val = self.reg_b_val(instr);
        self.set_reg_r(instr, val);
        if eval_cond(opt1(instr), val, 0) != 0 {
            self.branch_to_ofs(imm15(instr) << 2);
        } else {
            self.next_instr();
        }
        Ok(())
    }

    // ── SYS group ─────────────────────────────────────────

    /// MFCR / MTCR / MFIA.
    fn sys_mr(&mut self, instr: Instr) -> ExecResult {
        match opt1(instr) {
            MR_MFCR => {
                let creg = field_u(instr, 0, 4) as usize;
                let val = self.control_reg(creg);
                self.set_reg_r(instr, val);
            }
            MR_MTCR => {
                self.priv_op_check()?;
                let creg = field_u(instr, 0, 4) as usize;
                let val = self.reg_r_val(instr);
                self.set_control_reg(creg, val);
            }
            4 => {
                let psr = self.psr();
                self.set_reg_r(instr, psr);
            }
            5 => {
                let v = extract_field64(self.psr(), 12, 20);
                self.set_reg_r(instr, v);
            }
            6 => {
                let v = extract_field64(self.psr(), 32, 20);
                self.set_reg_r(instr, v);
            }
            7 => {
                let v = extract_field64(self.psr(), 52, 12);
                self.set_reg_r(instr, v);
            }
            _ => return self.illegal(),
        }
        self.next_instr();
        Ok(())
    }

    /// Load physical address: the translation for `B + X`, or 0 when the
    /// page is absent.
    fn sys_lpa(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        self.priv_op_check()?;
        if opt1(instr) != 0 {
            return self.illegal();
        }
        let vadr = VirtAddr(add_adr_ofs32(self.reg_b_val(instr), self.reg_a_val(instr)));
        let res = match mem.dtlb.lookup(vadr) {
            Some(e) => e.phys_page,
            None => 0,
        };
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    /// Probe access: 1 when the probed access would be allowed.
    fn sys_prb(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        if opt1(instr) != 0 {
            return self.illegal();
        }
        let vadr = VirtAddr(self.reg_b_val(instr));
        let mut mode = field_u(instr, 13, 2);
        if mode == 3 {
            mode = (self.reg_a_val(instr) & 0x3) as u32;
        }
        let access = match mode {
            0 => Access::Read,
            1 => Access::Write,
            _ => Access::Execute,
        };

        let allowed = if psr_x_bit(self.psr()) {
            true
        } else {
            match mem.dtlb.lookup(vadr) {
                Some(e) => page_permits(e.page_type, access),
                None => false,
            }
        };
        self.set_reg_r(instr, allowed as Word);
        self.next_instr();
        Ok(())
    }

    /// TLB maintenance: insert into or purge from either TLB.
    fn sys_tlb(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        self.priv_op_check()?;
        match opt1(instr) {
            TLB_INSERT_I => {
                let ok = mem
                    .itlb
                    .insert(VirtAddr(self.reg_b_val(instr)), self.reg_a_val(instr));
                self.set_reg_r(instr, ok as Word);
            }
            TLB_INSERT_D => {
                let ok = mem
                    .dtlb
                    .insert(VirtAddr(self.reg_b_val(instr)), self.reg_a_val(instr));
                self.set_reg_r(instr, ok as Word);
            }
            TLB_PURGE_I => {
                let vadr = add_adr_ofs32(self.reg_b_val(instr), self.reg_a_val(instr));
                mem.itlb.purge(VirtAddr(vadr));
                self.set_reg_r(instr, 1);
            }
            TLB_PURGE_D => {
                let vadr = add_adr_ofs32(self.reg_b_val(instr), self.reg_a_val(instr));
                mem.dtlb.purge(VirtAddr(vadr));
                self.set_reg_r(instr, 1);
            }
            _ => return self.illegal(),
        }
        self.next_instr();
        Ok(())
    }

    /// Cache maintenance: flush or purge one line in either cache.
    fn sys_ca(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        self.priv_op_check()?;
        let vadr = VirtAddr(add_adr_ofs32(self.reg_b_val(instr), self.reg_a_val(instr)));
        let padr = self.resolve_data_padr(mem, vadr)?;

        match opt1(instr) {
            CA_PURGE_I => mem.icache.purge(padr),
            CA_PURGE_D => mem.dcache.purge(padr),
            CA_FLUSH_I => mem
                .icache
                .flush(padr, &mut *mem.bus)
                .map_err(|f| self.trap(TrapKind::DataProtection, f.adr, 0))?,
            CA_FLUSH_D => mem
                .dcache
                .flush(padr, &mut *mem.bus)
                .map_err(|f| self.trap(TrapKind::DataProtection, f.adr, 0))?,
            _ => return self.illegal(),
        }
        self.set_reg_r(instr, 1);
        self.next_instr();
        Ok(())
    }

    /// RSM / SSM: clear or set PSR status bits by the 8-bit mask; R gets
    /// the previous status byte.
    fn sys_mst(&mut self, instr: Instr) -> ExecResult {
        self.priv_op_check()?;
        let set = match opt1(instr) {
            MST_RSM => false,
            MST_SSM => true,
            _ => return self.illegal(),
        };
        let mask = field_u(instr, 0, 8) as Word;
        let old = extract_field64(self.psr(), 56, 8);
        let status = if set { old | mask } else { old & !mask };
        let psr = deposit_field(self.psr(), 56, 8, status);
        self.set_psr(psr);
        self.set_reg_r(instr, old);
        self.next_instr();
        Ok(())
    }

    /// Return from interrupt: PSR is restored wholesale from IPSR.
    fn sys_rfi(&mut self, instr: Instr) -> ExecResult {
        self.priv_op_check()?;
        if opt1(instr) != 0 {
            return self.illegal();
        }
        let rl = self.link_val();
        let ipsr = self.control_reg(CR_IPSR);
        self.set_psr(ipsr);
        self.set_reg_r(instr, rl);
        Ok(())
    }

    /// Implementation-defined diagnostics; routed to the diag hook.
    fn sys_diag(&mut self, instr: Instr) -> ExecResult {
        self.priv_op_check()?;
        let diag_opt = (opt1(instr) << 2) + field_u(instr, 13, 2);
        let arg1 = self.reg_b_val(instr);
        let arg2 = self.reg_a_val(instr);
        let res = self.diag_op(diag_opt, arg1, arg2);
        self.set_reg_r(instr, res);
        self.next_instr();
        Ok(())
    }

    /// Diagnostic hook; the base implementation reports zero for every
    /// diag opcode.
    fn diag_op(&mut self, _diag_opt: u32, _arg1: Word, _arg2: Word) -> Word {
        0
    }

    /// Programmed trap.
    fn sys_trap(&mut self, instr: Instr) -> ExecResult {
        let info = (opt1(instr) << 2) + field_u(instr, 13, 2);
        let arg0 = self.reg_b_val(instr);
        let arg1 = self.reg_a_val(instr);
        Err(self.trap(TrapKind::ProgrammedTrap(info), arg0, arg1))
    }
}
