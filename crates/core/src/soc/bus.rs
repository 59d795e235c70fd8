//! The system object and the bus protocol.
//!
//! The system owns the module map and an address-range index used to find
//! the module owning a physical address in O(log n). The five bus
//! operations are broadcast: every module other than the issuer observes
//! the transaction in module-number order and may hand back writeback data,
//! which is committed to the owning module before the request itself is
//! served. The issuer never observes its own transaction.

use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{self, Display, Formatter};

use tracing::{event, Level};

use crate::common::Word;
use crate::config::{SimConfig, MAX_MODULES};
use crate::soc::memory::MemoryModule;
use crate::soc::module::{AdrRange, Module};
use crate::soc::processor::ProcessorModule;

/// A physical address no module owns, or a rejected module configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BusFault {
    /// The offending physical address.
    pub adr: Word,
}

impl Display for BusFault {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "bus fault at physical address {:#x}", self.adr)
    }
}

impl Error for BusFault {}

/// The five broadcast bus operations a cache or CPU can issue.
pub trait BusOps {
    /// Acquire a shared copy of a block.
    fn read_shared_block(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault>;
    /// Acquire an exclusive copy of a block; other holders purge theirs.
    fn read_private_block(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault>;
    /// Write back an exclusively held block.
    fn write_block(&mut self, padr: Word, src: &[u8]) -> Result<(), BusFault>;
    /// Read bypassing the caches; cached copies elsewhere are flushed out.
    fn read_uncached(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault>;
    /// Write bypassing the caches; cached copies elsewhere are flushed out.
    fn write_uncached(&mut self, padr: Word, src: &[u8]) -> Result<(), BusFault>;
}

#[derive(Clone, Copy, Debug)]
struct RangeEntry {
    len: Word,
    module: usize,
}

/// A T64 system: the module map plus the address-range index.
pub struct System {
    slots: Vec<Option<Box<dyn Module>>>,
    index: BTreeMap<Word, RangeEntry>,
}

impl Default for System {
    fn default() -> Self {
        Self::new()
    }
}

impl System {
    /// Creates an empty system with no modules.
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_MODULES);
        slots.resize_with(MAX_MODULES, || None);
        Self {
            slots,
            index: BTreeMap::new(),
        }
    }

    /// Creates a system with one processor (module 0) and one RAM module
    /// (module 1) laid out per the configuration.
    pub fn single_processor(config: &SimConfig) -> Self {
        let mut sys = Self::new();
        sys.add_module(Box::new(ProcessorModule::new(0, config)))
            .expect("fresh system accepts module 0");
        sys.add_module(Box::new(MemoryModule::new(
            1,
            config.memory.base,
            config.memory.size,
        )))
        .expect("fresh system accepts module 1");
        sys
    }

    /// Registers a module, indexing its HPA range and its SPA range if it
    /// serves one. Rejects duplicate module numbers and overlapping ranges.
    pub fn add_module(&mut self, module: Box<dyn Module>) -> Result<(), BusFault> {
        let num = module.module_num();
        if num >= MAX_MODULES || self.slots[num].is_some() {
            return Err(BusFault { adr: num as Word });
        }

        let mut ranges = vec![module.hpa_range()];
        if let Some(spa) = module.spa_range() {
            ranges.push(spa);
        }
        for r in &ranges {
            if self.overlaps(r) {
                return Err(BusFault { adr: r.start });
            }
        }
        for r in ranges {
            self.index.insert(r.start, RangeEntry {
                len: r.len,
                module: num,
            });
        }
        self.slots[num] = Some(module);
        Ok(())
    }

    /// Removes a module and drops its address ranges from the index.
    pub fn remove_module(&mut self, num: usize) -> Option<Box<dyn Module>> {
        let module = self.slots.get_mut(num)?.take()?;
        self.index.retain(|_, e| e.module != num);
        Some(module)
    }

    fn overlaps(&self, r: &AdrRange) -> bool {
        if let Some((start, e)) = self.index.range(..=r.start + r.len - 1).next_back() {
            if start + e.len > r.start {
                return true;
            }
        }
        false
    }

    /// Returns the number of the module owning the physical address.
    pub fn lookup_by_adr(&self, padr: Word) -> Option<usize> {
        lookup(&self.index, padr)
    }

    /// Shared access to a module.
    pub fn module(&self, num: usize) -> Option<&dyn Module> {
        self.slots.get(num)?.as_deref()
    }

    /// Exclusive access to a module.
    pub fn module_mut(&mut self, num: usize) -> Option<&mut (dyn Module + 'static)> {
        self.slots.get_mut(num)?.as_deref_mut()
    }

    /// Exclusive access to a processor module.
    pub fn processor_mut(&mut self, num: usize) -> Option<&mut ProcessorModule> {
        self.module_mut(num)?.as_processor_mut()
    }

    /// Resets every module.
    pub fn reset(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.reset();
        }
    }

    /// Executes one step on every processor module, in module-number order.
    pub fn step(&mut self) {
        for num in 0..self.slots.len() {
            if let Some(mut module) = self.slots[num].take() {
                {
                    let mut bus = BusView {
                        slots: &mut self.slots,
                        index: &self.index,
                        requester: num,
                    };
                    module.step(&mut bus);
                }
                self.slots[num] = Some(module);
            }
        }
    }

    /// Executes `n` steps.
    pub fn run(&mut self, n: u64) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Reads physical memory from the command surface. The access is
    /// uncached, so cached copies anywhere are flushed out first.
    pub fn read_phys(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault> {
        self.command_view().read_uncached(padr, dst)
    }

    /// Writes physical memory from the command surface; uncached.
    pub fn write_phys(&mut self, padr: Word, src: &[u8]) -> Result<(), BusFault> {
        self.command_view().write_uncached(padr, src)
    }

    fn command_view(&mut self) -> BusView<'_> {
        BusView {
            slots: &mut self.slots,
            index: &self.index,
            requester: usize::MAX,
        }
    }
}

fn lookup(index: &BTreeMap<Word, RangeEntry>, padr: Word) -> Option<usize> {
    let (start, e) = index.range(..=padr).next_back()?;
    if padr - start < e.len {
        Some(e.module)
    } else {
        None
    }
}

/// The bus as seen by one issuing module during its step.
///
/// The issuer's slot is empty while it runs, so broadcasts naturally skip
/// it; `requester` guards against a module observing itself in the command
/// surface case as well.
pub struct BusView<'a> {
    pub(crate) slots: &'a mut [Option<Box<dyn Module>>],
    pub(crate) index: &'a BTreeMap<Word, RangeEntry>,
    pub(crate) requester: usize,
}

impl BusView<'_> {
    fn owner_of(&self, padr: Word) -> Result<usize, BusFault> {
        lookup(self.index, padr).ok_or(BusFault { adr: padr })
    }

    fn owner_read(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault> {
        let num = self.owner_of(padr)?;
        let owner = self.slots[num].as_mut().ok_or(BusFault { adr: padr })?;
        if owner.serve_read(padr, dst) {
            Ok(())
        } else {
            Err(BusFault { adr: padr })
        }
    }

    fn owner_write(&mut self, padr: Word, src: &[u8]) -> Result<(), BusFault> {
        let num = self.owner_of(padr)?;
        let owner = self.slots[num].as_mut().ok_or(BusFault { adr: padr })?;
        if owner.serve_write(padr, src) {
            Ok(())
        } else {
            Err(BusFault { adr: padr })
        }
    }

    /// Runs `snoop` on every module except the requester, in module-number
    /// order, and commits the collected writebacks to their owners.
    fn broadcast(
        &mut self,
        padr: Word,
        snoop: fn(&mut dyn Module, Word) -> Option<(Word, Vec<u8>)>,
    ) -> Result<(), BusFault> {
        let mut writebacks = Vec::new();
        for (num, slot) in self.slots.iter_mut().enumerate() {
            if num == self.requester {
                continue;
            }
            if let Some(module) = slot {
                if let Some(wb) = snoop(module.as_mut(), padr) {
                    writebacks.push(wb);
                }
            }
        }
        for (base, data) in writebacks {
            self.owner_write(base, &data)?;
        }
        Ok(())
    }
}

impl BusOps for BusView<'_> {
    fn read_shared_block(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault> {
        event!(Level::TRACE, padr, requester = self.requester, "bus read-shared");
        self.broadcast(padr, |m, a| m.snoop_read_shared(a))?;
        self.owner_read(padr, dst)
    }

    fn read_private_block(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault> {
        event!(Level::TRACE, padr, requester = self.requester, "bus read-private");
        self.broadcast(padr, |m, a| m.snoop_read_private(a))?;
        self.owner_read(padr, dst)
    }

    fn write_block(&mut self, padr: Word, src: &[u8]) -> Result<(), BusFault> {
        event!(Level::TRACE, padr, requester = self.requester, "bus write-block");
        // By invariant no other module holds the line; no observer action.
        self.owner_write(padr, src)
    }

    fn read_uncached(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault> {
        event!(Level::TRACE, padr, requester = self.requester, "bus read-uncached");
        self.broadcast(padr, |m, a| m.snoop_uncached(a))?;
        self.owner_read(padr, dst)
    }

    fn write_uncached(&mut self, padr: Word, src: &[u8]) -> Result<(), BusFault> {
        event!(Level::TRACE, padr, requester = self.requester, "bus write-uncached");
        self.broadcast(padr, |m, a| m.snoop_uncached(a))?;
        self.owner_write(padr, src)
    }
}
