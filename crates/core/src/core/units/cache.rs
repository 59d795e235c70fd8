//! Coherent write-back cache.
//!
//! Physically indexed, set associative. Every line is `Invalid`, `Shared`,
//! or `Exclusive-Modified`; a write needs an exclusive copy, which is
//! acquired with a read-private bus transaction that purges every other
//! holder. Misses fill whole lines over the bus; a displaced modified line
//! is written back first. The snoop half of the protocol (what this cache
//! does when *another* module issues a transaction) is exposed as the
//! `snoop_*` methods, which the owning processor module routes here.
//!
//! Data alignment is guaranteed by the CPU: an access of width `n` is
//! `n`-aligned and therefore never crosses a line boundary.

use crate::common::Word;
use crate::soc::bus::BusOps;
use crate::soc::BusFault;

/// Coherence state of one line.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LineState {
    /// No data.
    #[default]
    Invalid,
    /// Clean copy; other modules may hold the line too.
    Shared,
    /// Only copy in the system, modified relative to memory.
    ExclusiveModified,
}

/// One cache line: tag (line base address), state, and data.
#[derive(Clone, Debug, Default)]
pub struct CacheLine {
    /// Physical address of the first byte of the line.
    pub tag: Word,
    /// Coherence state.
    pub state: LineState,
    /// Line data.
    pub data: Vec<u8>,
}

/// Set-associative write-back cache.
pub struct Cache {
    sets: usize,
    ways: usize,
    line_bytes: usize,
    lines: Vec<CacheLine>,
    victim_rotor: Vec<usize>,
}

impl Cache {
    /// Creates a cache with the given geometry. `line_bytes` must be a
    /// power of two of at least 8.
    pub fn new(sets: usize, ways: usize, line_bytes: usize) -> Self {
        let sets = sets.max(1).next_power_of_two();
        let ways = ways.max(1);
        let line_bytes = line_bytes.max(8).next_power_of_two();
        Self {
            sets,
            ways,
            line_bytes,
            lines: vec![CacheLine::default(); sets * ways],
            victim_rotor: vec![0; sets],
        }
    }

    /// Line size in bytes.
    pub fn line_bytes(&self) -> usize {
        self.line_bytes
    }

    /// Total number of lines; for the simulator display.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// True when the cache has no lines (never the case after `new`).
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Line by index; for the simulator display.
    pub fn line(&self, index: usize) -> &CacheLine {
        &self.lines[index % self.lines.len()]
    }

    #[inline]
    fn line_base(&self, padr: Word) -> Word {
        (padr as u64 & !(self.line_bytes as u64 - 1)) as Word
    }

    #[inline]
    fn set_of(&self, base: Word) -> usize {
        ((base as u64 as usize) / self.line_bytes) & (self.sets - 1)
    }

    fn find(&self, base: Word) -> Option<usize> {
        let first = self.set_of(base) * self.ways;
        (first..first + self.ways)
            .find(|&i| self.lines[i].state != LineState::Invalid && self.lines[i].tag == base)
    }

    /// Picks a victim way in the set of `base`, writing back a modified
    /// occupant first.
    fn evict_for(&mut self, base: Word, bus: &mut dyn BusOps) -> Result<usize, BusFault> {
        let set = self.set_of(base);
        let first = set * self.ways;

        if let Some(i) =
            (first..first + self.ways).find(|&i| self.lines[i].state == LineState::Invalid)
        {
            return Ok(i);
        }

        let victim = first + self.victim_rotor[set];
        self.victim_rotor[set] = (self.victim_rotor[set] + 1) % self.ways;
        if self.lines[victim].state == LineState::ExclusiveModified {
            let tag = self.lines[victim].tag;
            let data = std::mem::take(&mut self.lines[victim].data);
            bus.write_block(tag, &data)?;
        }
        self.lines[victim].state = LineState::Invalid;
        Ok(victim)
    }

    fn fill(
        &mut self,
        base: Word,
        exclusive: bool,
        bus: &mut dyn BusOps,
    ) -> Result<usize, BusFault> {
        let idx = self.evict_for(base, bus)?;
        let mut data = vec![0u8; self.line_bytes];
        if exclusive {
            bus.read_private_block(base, &mut data)?;
        } else {
            bus.read_shared_block(base, &mut data)?;
        }
        self.lines[idx] = CacheLine {
            tag: base,
            state: if exclusive {
                LineState::ExclusiveModified
            } else {
                LineState::Shared
            },
            data,
        };
        Ok(idx)
    }

    /// Reads `dst.len()` bytes from the physical address.
    ///
    /// `uncached` bypasses the cache entirely and issues an uncached bus
    /// read, which also purges any cached copies elsewhere.
    pub fn read(
        &mut self,
        padr: Word,
        dst: &mut [u8],
        uncached: bool,
        bus: &mut dyn BusOps,
    ) -> Result<(), BusFault> {
        if uncached {
            return bus.read_uncached(padr, dst);
        }

        let base = self.line_base(padr);
        let ofs = (padr - base) as usize;
        let idx = match self.find(base) {
            Some(i) => i,
            None => self.fill(base, false, bus)?,
        };
        dst.copy_from_slice(&self.lines[idx].data[ofs..ofs + dst.len()]);
        Ok(())
    }

    /// Writes `src.len()` bytes to the physical address, acquiring the line
    /// exclusively first.
    pub fn write(
        &mut self,
        padr: Word,
        src: &[u8],
        uncached: bool,
        bus: &mut dyn BusOps,
    ) -> Result<(), BusFault> {
        if uncached {
            return bus.write_uncached(padr, src);
        }

        let base = self.line_base(padr);
        let ofs = (padr - base) as usize;
        let idx = match self.find(base) {
            Some(i) if self.lines[i].state == LineState::ExclusiveModified => i,
            Some(i) => {
                // Upgrade: purge the other holders and take ownership.
                bus.read_private_block(base, &mut self.lines[i].data)?;
                self.lines[i].state = LineState::ExclusiveModified;
                i
            }
            None => self.fill(base, true, bus)?,
        };
        self.lines[idx].data[ofs..ofs + src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Writes a modified line back to memory and downgrades it to `Shared`.
    /// A clean or absent line is left alone.
    pub fn flush(&mut self, padr: Word, bus: &mut dyn BusOps) -> Result<(), BusFault> {
        let base = self.line_base(padr);
        if let Some(i) = self.find(base) {
            if self.lines[i].state == LineState::ExclusiveModified {
                let data = self.lines[i].data.clone();
                bus.write_block(base, &data)?;
                self.lines[i].state = LineState::Shared;
            }
        }
        Ok(())
    }

    /// Drops the line without writeback; subsequent reads miss.
    pub fn purge(&mut self, padr: Word) {
        let base = self.line_base(padr);
        if let Some(i) = self.find(base) {
            self.lines[i].state = LineState::Invalid;
        }
    }

    /// Invalidates every line without writeback.
    pub fn reset(&mut self) {
        for line in &mut self.lines {
            line.state = LineState::Invalid;
        }
        for r in &mut self.victim_rotor {
            *r = 0;
        }
    }

    // ── Snoop side ────────────────────────────────────────

    /// Another module wants a shared copy. A modified line is handed back
    /// for writeback and downgraded to `Shared`.
    pub fn snoop_read_shared(&mut self, padr: Word) -> Option<(Word, Vec<u8>)> {
        let base = self.line_base(padr);
        let i = self.find(base)?;
        if self.lines[i].state == LineState::ExclusiveModified {
            self.lines[i].state = LineState::Shared;
            return Some((base, self.lines[i].data.clone()));
        }
        None
    }

    /// Another module wants an exclusive copy. A modified line is handed
    /// back for writeback; any copy is purged.
    pub fn snoop_read_private(&mut self, padr: Word) -> Option<(Word, Vec<u8>)> {
        let base = self.line_base(padr);
        let i = self.find(base)?;
        let wb = if self.lines[i].state == LineState::ExclusiveModified {
            Some((base, self.lines[i].data.clone()))
        } else {
            None
        };
        self.lines[i].state = LineState::Invalid;
        wb
    }

    /// Another module performs an uncached access. Equivalent to flushing
    /// and purging our copy.
    pub fn snoop_uncached(&mut self, padr: Word) -> Option<(Word, Vec<u8>)> {
        self.snoop_read_private(padr)
    }
}
