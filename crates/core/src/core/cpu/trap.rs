//! Trap delivery.
//!
//! A trap caught at the step boundary is committed here: the interruption
//! control registers receive the captured state and the PSR is redirected
//! to the trap vector. A fault taken mid-instruction left the PSR at the
//! faulting instruction (handlers only advance it on success), so the
//! saved IPSR makes an RFI retry the faulting instruction exactly.

use tracing::{event, Level};

use super::Cpu;
use crate::common::addr::{psr_with_ia, PSR_P_BIT, PSR_X_BIT};
use crate::common::bits::{deposit_field, extract_field64};
use crate::common::trap::Trap;
use crate::common::Word;
use crate::isa::opcodes::{CR_IARG0, CR_IARG1, CR_IINSTR, CR_IPSR, CR_IVA};

impl Cpu {
    /// Commits a trap to architectural state.
    ///
    /// IPSR receives the PSR captured at the fault, IINSTR the faulting
    /// instruction word, IARG0/IARG1 the trap arguments. The PSR is then
    /// redirected to the IVA vector in privileged mode with region-ID
    /// checking off, so the handler runs unimpeded.
    pub(crate) fn deliver_trap(&mut self, t: &Trap) {
        event!(Level::DEBUG, kind = ?t.kind, arg0 = t.arg0, "trap entry");

        self.set_control_reg(CR_IPSR, t.psr);
        self.set_control_reg(CR_IINSTR, t.instr as Word);
        self.set_control_reg(CR_IARG0, t.arg0);
        self.set_control_reg(CR_IARG1, t.arg1);

        let iva = extract_field64(self.control_reg(CR_IVA), 0, 52);
        let mut psr = psr_with_ia(self.psr(), iva);
        psr = deposit_field(psr, PSR_X_BIT, 1, 1);
        psr = deposit_field(psr, PSR_P_BIT, 1, 0);
        self.set_psr(psr);
    }
}
