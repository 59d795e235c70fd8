//! Processor module.
//!
//! Bundles one CPU with its instruction and data TLBs and caches, exposes
//! them to the simulator command surface, and implements the bus snoop
//! side by routing transactions into both caches. A snoop that invalidates
//! the reserved line also kills the CPU's LDR/STC reservation.

use tracing::{event, Level};

use crate::common::Word;
use crate::config::SimConfig;
use crate::core::cpu::{Cpu, MemCtx};
use crate::core::units::cache::Cache;
use crate::core::units::tlb::Tlb;
use crate::soc::bus::{BusOps, BusView};
use crate::soc::module::{AdrRange, Module, ModuleKind};
use crate::stats::ProcessorStats;

/// A processor: CPU, I/D TLB, I/D cache, and step counters.
pub struct ProcessorModule {
    module_num: usize,
    cpu: Cpu,
    itlb: Tlb,
    dtlb: Tlb,
    icache: Cache,
    dcache: Cache,
    hpa: Vec<u8>,
    stats: ProcessorStats,
}

impl ProcessorModule {
    /// Creates a processor module with the configured TLB and cache
    /// geometry.
    pub fn new(module_num: usize, config: &SimConfig) -> Self {
        let c = &config.cache;
        Self {
            module_num,
            cpu: Cpu::new(&config.cpu),
            itlb: Tlb::new(config.tlb.entries),
            dtlb: Tlb::new(config.tlb.entries),
            icache: Cache::new(c.sets, c.ways, c.line_bytes),
            dcache: Cache::new(c.sets, c.ways, c.line_bytes),
            hpa: vec![0; crate::config::HPA_SIZE as usize],
            stats: ProcessorStats::default(),
        }
    }

    /// The CPU, for register inspection.
    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// The CPU, for register modification.
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    /// The instruction TLB.
    pub fn itlb(&self) -> &Tlb {
        &self.itlb
    }

    /// The instruction TLB, for insert/purge commands.
    pub fn itlb_mut(&mut self) -> &mut Tlb {
        &mut self.itlb
    }

    /// The data TLB.
    pub fn dtlb(&self) -> &Tlb {
        &self.dtlb
    }

    /// The data TLB, for insert/purge commands.
    pub fn dtlb_mut(&mut self) -> &mut Tlb {
        &mut self.dtlb
    }

    /// The instruction cache.
    pub fn icache(&self) -> &Cache {
        &self.icache
    }

    /// The instruction cache, for purge commands.
    pub fn icache_mut(&mut self) -> &mut Cache {
        &mut self.icache
    }

    /// The data cache.
    pub fn dcache(&self) -> &Cache {
        &self.dcache
    }

    /// The data cache, for purge commands.
    pub fn dcache_mut(&mut self) -> &mut Cache {
        &mut self.dcache
    }

    /// Step counters.
    pub fn stats(&self) -> &ProcessorStats {
        &self.stats
    }

    fn hpa_slice_mut(&mut self, padr: Word, len: usize) -> Option<&mut [u8]> {
        let hpa = AdrRange::hpa_of(self.module_num);
        if !hpa.contains(padr) || !hpa.contains(padr + len as Word - 1) {
            return None;
        }
        let ofs = (padr - hpa.start) as usize;
        Some(&mut self.hpa[ofs..ofs + len])
    }
}

impl Module for ProcessorModule {
    fn kind(&self) -> ModuleKind {
        ModuleKind::Processor
    }

    fn module_num(&self) -> usize {
        self.module_num
    }

    fn hpa_range(&self) -> AdrRange {
        AdrRange::hpa_of(self.module_num)
    }

    fn reset(&mut self) {
        self.cpu.reset();
        self.itlb.reset();
        self.dtlb.reset();
        self.icache.reset();
        self.dcache.reset();
        self.hpa.fill(0);
        self.stats = ProcessorStats::default();
    }

    fn serve_read(&mut self, padr: Word, dst: &mut [u8]) -> bool {
        let len = dst.len();
        match self.hpa_slice_mut(padr, len) {
            Some(src) => {
                dst.copy_from_slice(src);
                true
            }
            None => false,
        }
    }

    fn serve_write(&mut self, padr: Word, src: &[u8]) -> bool {
        let len = src.len();
        match self.hpa_slice_mut(padr, len) {
            Some(dst) => {
                dst.copy_from_slice(src);
                true
            }
            None => false,
        }
    }

    fn snoop_read_shared(&mut self, padr: Word) -> Option<(Word, Vec<u8>)> {
        let wb_i = self.icache.snoop_read_shared(padr);
        let wb_d = self.dcache.snoop_read_shared(padr);
        wb_d.or(wb_i)
    }

    fn snoop_read_private(&mut self, padr: Word) -> Option<(Word, Vec<u8>)> {
        self.cpu
            .clear_reservation_if_line(padr, self.dcache.line_bytes());
        let wb_i = self.icache.snoop_read_private(padr);
        let wb_d = self.dcache.snoop_read_private(padr);
        wb_d.or(wb_i)
    }

    fn snoop_uncached(&mut self, padr: Word) -> Option<(Word, Vec<u8>)> {
        self.cpu
            .clear_reservation_if_line(padr, self.dcache.line_bytes());
        let wb_i = self.icache.snoop_uncached(padr);
        let wb_d = self.dcache.snoop_uncached(padr);
        wb_d.or(wb_i)
    }

    fn step(&mut self, bus: &mut BusView) {
        let mut mem = MemCtx {
            itlb: &mut self.itlb,
            dtlb: &mut self.dtlb,
            icache: &mut self.icache,
            dcache: &mut self.dcache,
            bus: bus as &mut dyn BusOps,
        };
        let trapped = self.cpu.step(&mut mem);

        self.stats.instruction_count += 1;
        self.stats.cycle_count += 1;
        if let Some(kind) = trapped {
            self.stats.traps_taken += 1;
            event!(Level::DEBUG, module = self.module_num, ?kind, "step trapped");
        }
    }

    fn as_processor_mut(&mut self) -> Option<&mut ProcessorModule> {
        Some(self)
    }
}
