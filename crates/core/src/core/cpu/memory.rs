//! Memory access paths.
//!
//! Every instruction fetch and data access runs the same gauntlet:
//! alignment, then either the privileged physical-memory window or the TLB
//! (miss, access rights, region ID), and finally the cache with the
//! translated address and the entry's uncached flag. Visible state is only
//! written after every check has passed, so a trap taken here never leaves
//! a partial update behind.

use super::Cpu;
use crate::common::addr::{psr_p_bit, psr_x_bit};
use crate::common::bits::{
    extract_bit64, extract_field64, is_aligned_data_adr, load_be, sign_extend_bytes, store_be,
};
use crate::common::trap::{ExecResult, TrapKind};
use crate::common::{Instr, VirtAddr, Word};
use crate::core::units::cache::Cache;
use crate::core::units::tlb::{PageType, Tlb, TlbEntry};
use crate::isa::decode;
use crate::isa::opcodes::{CR_PID_COUNT, CR_PID_FIRST};
use crate::soc::bus::BusOps;

/// The memory hierarchy as seen by the CPU during one step.
pub struct MemCtx<'a> {
    pub itlb: &'a mut Tlb,
    pub dtlb: &'a mut Tlb,
    pub icache: &'a mut Cache,
    pub dcache: &'a mut Cache,
    pub bus: &'a mut dyn BusOps,
}

/// What a data access wants from the page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Access {
    Read,
    Write,
    Execute,
}

/// Whether a page type admits the access, ignoring privilege.
pub(crate) fn page_permits(page_type: PageType, access: Access) -> bool {
    match access {
        Access::Execute => page_type == PageType::Execute,
        Access::Read => page_type != PageType::ProbeOnly,
        Access::Write => page_type == PageType::ReadWrite,
    }
}

impl Cpu {
    /// True when the address lies in the untranslated physical window.
    pub(crate) fn is_phys_mem_adr(&self, adr: Word) -> bool {
        adr >= self.lower_phys_mem && adr <= self.upper_phys_mem
    }

    fn priv_check(&self) -> ExecResult {
        if psr_x_bit(self.psr()) {
            Ok(())
        } else {
            Err(self.trap(TrapKind::PrivOperation, 0, 0))
        }
    }

    /// Matches a region ID against the four protection-ID control
    /// registers. Each register holds two 20-bit IDs; bit 31 and bit 63
    /// write-enable the respective half. With the PSR P bit clear the
    /// check is disabled.
    fn region_id_allowed(&self, region_id: Word, write: bool) -> bool {
        if !psr_p_bit(self.psr()) {
            return true;
        }
        for i in 0..CR_PID_COUNT {
            let pid = self.control_reg(CR_PID_FIRST + i);
            let lo_id = extract_field64(pid, 0, 20);
            let lo_w = extract_bit64(pid, 31) != 0;
            let hi_id = extract_field64(pid, 32, 20);
            let hi_w = extract_bit64(pid, 63) != 0;
            if (lo_id == region_id && (!write || lo_w)) || (hi_id == region_id && (!write || hi_w))
            {
                return true;
            }
        }
        false
    }

    /// Resolves a data virtual address to its physical address without
    /// performing an access; used by LDR/STC reservations and the cache
    /// control instructions.
    pub(crate) fn resolve_data_padr(&self, mem: &MemCtx, vadr: VirtAddr) -> ExecResult<Word> {
        if self.is_phys_mem_adr(vadr.0) {
            return Ok(vadr.0);
        }
        let e = self.dtlb_entry(mem, vadr)?;
        Ok(e.phys_page | vadr.page_ofs())
    }

    fn dtlb_entry(&self, mem: &MemCtx, vadr: VirtAddr) -> ExecResult<TlbEntry> {
        match mem.dtlb.lookup(vadr) {
            Some(e) => Ok(*e),
            None => Err(self.trap(TrapKind::DataTlbMiss, vadr.0, 0)),
        }
    }

    /// Fetches the instruction word at `vadr`.
    pub(crate) fn instr_read(&mut self, mem: &mut MemCtx, vadr: VirtAddr) -> ExecResult<Instr> {
        if !is_aligned_data_adr(vadr.0, 4) {
            return Err(self.fetch_trap(TrapKind::InstrAlignment, vadr.0));
        }

        let mut buf = [0u8; 4];
        if self.is_phys_mem_adr(vadr.0) {
            if !psr_x_bit(self.psr()) {
                return Err(self.fetch_trap(TrapKind::PrivOperation, vadr.0));
            }
            mem.icache
                .read(vadr.0, &mut buf, false, &mut *mem.bus)
                .map_err(|f| self.fetch_trap(TrapKind::InstrProtection, f.adr))?;
        } else {
            let e = match mem.itlb.lookup(vadr) {
                Some(e) => *e,
                None => return Err(self.fetch_trap(TrapKind::InstrTlbMiss, vadr.0)),
            };
            if !psr_x_bit(self.psr()) && !page_permits(e.page_type, Access::Execute) {
                return Err(self.fetch_trap(TrapKind::InstrProtection, vadr.0));
            }
            if !self.region_id_allowed(vadr.region_id(), false) {
                return Err(self.fetch_trap(TrapKind::InstrProtection, vadr.0));
            }
            let padr = e.phys_page | vadr.page_ofs();
            mem.icache
                .read(padr, &mut buf, e.uncached, &mut *mem.bus)
                .map_err(|f| self.fetch_trap(TrapKind::InstrProtection, f.adr))?;
        }

        Ok(u32::from_be_bytes(buf))
    }

    /// Reads `len` bytes from the data address, returning the value
    /// right-justified; `sext` selects sign extension for short loads.
    pub(crate) fn data_read(
        &mut self,
        mem: &mut MemCtx,
        vadr: VirtAddr,
        len: u32,
        sext: bool,
    ) -> ExecResult<Word> {
        if !is_aligned_data_adr(vadr.0, len) {
            return Err(self.trap(TrapKind::DataAlignment, vadr.0, 0));
        }

        let mut buf = [0u8; 8];
        let slice = &mut buf[..len as usize];
        if self.is_phys_mem_adr(vadr.0) {
            self.priv_check()?;
            mem.dcache
                .read(vadr.0, slice, false, &mut *mem.bus)
                .map_err(|f| self.trap(TrapKind::DataProtection, f.adr, 0))?;
        } else {
            let e = self.dtlb_entry(mem, vadr)?;
            if !psr_x_bit(self.psr()) && !page_permits(e.page_type, Access::Read) {
                return Err(self.trap(TrapKind::DataProtection, vadr.0, 0));
            }
            if !self.region_id_allowed(vadr.region_id(), false) {
                return Err(self.trap(TrapKind::DataProtection, vadr.0, 0));
            }
            let padr = e.phys_page | vadr.page_ofs();
            mem.dcache
                .read(padr, slice, e.uncached, &mut *mem.bus)
                .map_err(|f| self.trap(TrapKind::DataProtection, f.adr, 0))?;
        }

        let raw = load_be(slice);
        if sext {
            Ok(sign_extend_bytes(raw, len))
        } else {
            Ok(raw as Word)
        }
    }

    /// Writes the low `len` bytes of `val` to the data address.
    pub(crate) fn data_write(
        &mut self,
        mem: &mut MemCtx,
        vadr: VirtAddr,
        val: Word,
        len: u32,
    ) -> ExecResult {
        if !is_aligned_data_adr(vadr.0, len) {
            return Err(self.trap(TrapKind::DataAlignment, vadr.0, 0));
        }

        let mut buf = [0u8; 8];
        let slice = &mut buf[..len as usize];
        store_be(slice, val);

        if self.is_phys_mem_adr(vadr.0) {
            self.priv_check()?;
            mem.dcache
                .write(vadr.0, slice, false, &mut *mem.bus)
                .map_err(|f| self.trap(TrapKind::DataProtection, f.adr, 0))?;
        } else {
            let e = self.dtlb_entry(mem, vadr)?;
            if !psr_x_bit(self.psr()) && !page_permits(e.page_type, Access::Write) {
                return Err(self.trap(TrapKind::DataProtection, vadr.0, 0));
            }
            if !self.region_id_allowed(vadr.region_id(), true) {
                return Err(self.trap(TrapKind::DataProtection, vadr.0, 0));
            }
            let padr = e.phys_page | vadr.page_ofs();
            mem.dcache
                .write(padr, slice, e.uncached, &mut *mem.bus)
                .map_err(|f| self.trap(TrapKind::DataProtection, f.adr, 0))?;
        }
        Ok(())
    }

    // ── Operand address forms ─────────────────────────────

    /// Effective address `base(B) + scaled imm13`.
    pub(crate) fn ea_ofs_imm13(&self, instr: Instr) -> VirtAddr {
        let base = self.reg_b_val(instr);
        let ofs = decode::imm13_scaled(instr);
        VirtAddr(crate::common::bits::add_adr_ofs32(base, ofs))
    }

    /// Effective address `base(B) + (index(A) << dw)`.
    pub(crate) fn ea_ofs_regx(&self, instr: Instr) -> VirtAddr {
        let base = self.reg_b_val(instr);
        let ofs = self.reg_a_val(instr) << decode::dw(instr);
        VirtAddr(crate::common::bits::add_adr_ofs32(base, ofs))
    }

    /// Reads the memory operand addressed by `B + imm13`.
    pub(crate) fn data_read_ofs_imm13(
        &mut self,
        mem: &mut MemCtx,
        instr: Instr,
        sext: bool,
    ) -> ExecResult<Word> {
        let vadr = self.ea_ofs_imm13(instr);
        self.data_read(mem, vadr, decode::dw_len(instr), sext)
    }

    /// Reads the memory operand addressed by `B + (A << dw)`.
    pub(crate) fn data_read_ofs_regx(
        &mut self,
        mem: &mut MemCtx,
        instr: Instr,
        sext: bool,
    ) -> ExecResult<Word> {
        let vadr = self.ea_ofs_regx(instr);
        self.data_read(mem, vadr, decode::dw_len(instr), sext)
    }

    /// Writes R to the memory operand addressed by `B + imm13`.
    pub(crate) fn data_write_ofs_imm13(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        let vadr = self.ea_ofs_imm13(instr);
        let val = self.reg_r_val(instr);
        self.data_write(mem, vadr, val, decode::dw_len(instr))
    }

    /// Writes R to the memory operand addressed by `B + (A << dw)`.
    pub(crate) fn data_write_ofs_regx(&mut self, mem: &mut MemCtx, instr: Instr) -> ExecResult {
        let vadr = self.ea_ofs_regx(instr);
        let val = self.reg_r_val(instr);
        self.data_write(mem, vadr, val, decode::dw_len(instr))
    }
}
