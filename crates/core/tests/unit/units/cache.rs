//! Cache unit tests.
//!
//! Drives a cache against a flat RAM bus stub and checks the coherence
//! state machine: fills, write ownership, writeback on eviction, flush and
//! purge semantics, and the snoop side.

use t64_core::common::Word;
use t64_core::core::units::cache::{Cache, LineState};
use t64_core::soc::bus::BusOps;
use t64_core::soc::BusFault;

/// Flat RAM with traffic counters; no snooping of its own.
struct RamBus {
    mem: Vec<u8>,
    reads: usize,
    writes: usize,
}

impl RamBus {
    fn new(size: usize) -> Self {
        Self {
            mem: vec![0; size],
            reads: 0,
            writes: 0,
        }
    }

    fn copy_out(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault> {
        let ofs = padr as usize;
        if ofs + dst.len() > self.mem.len() {
            return Err(BusFault { adr: padr });
        }
        dst.copy_from_slice(&self.mem[ofs..ofs + dst.len()]);
        Ok(())
    }

    fn copy_in(&mut self, padr: Word, src: &[u8]) -> Result<(), BusFault> {
        let ofs = padr as usize;
        if ofs + src.len() > self.mem.len() {
            return Err(BusFault { adr: padr });
        }
        self.mem[ofs..ofs + src.len()].copy_from_slice(src);
        Ok(())
    }
}

impl BusOps for RamBus {
    fn read_shared_block(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault> {
        self.reads += 1;
        self.copy_out(padr, dst)
    }

    fn read_private_block(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault> {
        self.reads += 1;
        self.copy_out(padr, dst)
    }

    fn write_block(&mut self, padr: Word, src: &[u8]) -> Result<(), BusFault> {
        self.writes += 1;
        self.copy_in(padr, src)
    }

    fn read_uncached(&mut self, padr: Word, dst: &mut [u8]) -> Result<(), BusFault> {
        self.reads += 1;
        self.copy_out(padr, dst)
    }

    fn write_uncached(&mut self, padr: Word, src: &[u8]) -> Result<(), BusFault> {
        self.writes += 1;
        self.copy_in(padr, src)
    }
}

fn state_of(cache: &Cache, padr: Word) -> LineState {
    let base = padr & !(cache.line_bytes() as Word - 1);
    for i in 0..cache.len() {
        let line = cache.line(i);
        if line.state != LineState::Invalid && line.tag == base {
            return line.state;
        }
    }
    LineState::Invalid
}

// ══════════════════════════════════════════════════════════
// 1. Reads
// ══════════════════════════════════════════════════════════

#[test]
fn read_miss_fills_then_hits() {
    let mut bus = RamBus::new(0x1000);
    bus.mem[0x100] = 0xAB;
    let mut cache = Cache::new(4, 2, 32);

    let mut b = [0u8; 1];
    cache.read(0x100, &mut b, false, &mut bus).unwrap();
    assert_eq!(b[0], 0xAB);
    assert_eq!(bus.reads, 1);
    assert_eq!(state_of(&cache, 0x100), LineState::Shared);

    // Second read hits without bus traffic.
    cache.read(0x101, &mut b, false, &mut bus).unwrap();
    assert_eq!(bus.reads, 1);
}

#[test]
fn uncached_read_bypasses() {
    let mut bus = RamBus::new(0x1000);
    bus.mem[0x40] = 0x55;
    let mut cache = Cache::new(4, 2, 32);

    let mut b = [0u8; 1];
    cache.read(0x40, &mut b, true, &mut bus).unwrap();
    assert_eq!(b[0], 0x55);
    assert_eq!(state_of(&cache, 0x40), LineState::Invalid);
}

#[test]
fn out_of_range_read_is_a_bus_fault() {
    let mut bus = RamBus::new(0x100);
    let mut cache = Cache::new(4, 2, 32);
    let mut b = [0u8; 1];
    assert!(cache.read(0x4000, &mut b, false, &mut bus).is_err());
}

// ══════════════════════════════════════════════════════════
// 2. Writes and eviction
// ══════════════════════════════════════════════════════════

#[test]
fn write_takes_exclusive_ownership() {
    let mut bus = RamBus::new(0x1000);
    let mut cache = Cache::new(4, 2, 32);

    cache.write(0x200, &[0xEE], false, &mut bus).unwrap();
    assert_eq!(state_of(&cache, 0x200), LineState::ExclusiveModified);
    // The data stays local until a writeback.
    assert_eq!(bus.writes, 0);
    assert_eq!(bus.mem[0x200], 0);

    let mut b = [0u8; 1];
    cache.read(0x200, &mut b, false, &mut bus).unwrap();
    assert_eq!(b[0], 0xEE);
}

#[test]
fn shared_line_upgrades_on_write() {
    let mut bus = RamBus::new(0x1000);
    let mut cache = Cache::new(4, 2, 32);

    let mut b = [0u8; 1];
    cache.read(0x200, &mut b, false, &mut bus).unwrap();
    assert_eq!(state_of(&cache, 0x200), LineState::Shared);
    cache.write(0x200, &[1], false, &mut bus).unwrap();
    assert_eq!(state_of(&cache, 0x200), LineState::ExclusiveModified);
}

#[test]
fn eviction_writes_back_modified_victim() {
    let mut bus = RamBus::new(0x10000);
    // Direct mapped, 4 sets of 32 bytes: addresses 128 apart collide.
    let mut cache = Cache::new(4, 1, 32);

    cache.write(0x0, &[0x11], false, &mut bus).unwrap();
    let mut b = [0u8; 1];
    cache.read(0x80, &mut b, false, &mut bus).unwrap();

    assert_eq!(bus.writes, 1, "victim line went home");
    assert_eq!(bus.mem[0], 0x11);
    assert_eq!(state_of(&cache, 0x0), LineState::Invalid);
}

// ══════════════════════════════════════════════════════════
// 3. Flush and purge
// ══════════════════════════════════════════════════════════

#[test]
fn flush_clean_line_is_a_noop() {
    let mut bus = RamBus::new(0x1000);
    let mut cache = Cache::new(4, 2, 32);
    let mut b = [0u8; 1];
    cache.read(0x100, &mut b, false, &mut bus).unwrap();

    cache.flush(0x100, &mut bus).unwrap();
    assert_eq!(bus.writes, 0);
    assert_eq!(state_of(&cache, 0x100), LineState::Shared);
}

#[test]
fn flush_modified_line_writes_back_and_downgrades() {
    let mut bus = RamBus::new(0x1000);
    let mut cache = Cache::new(4, 2, 32);
    cache.write(0x100, &[0x77], false, &mut bus).unwrap();

    cache.flush(0x100, &mut bus).unwrap();
    assert_eq!(bus.writes, 1);
    assert_eq!(bus.mem[0x100], 0x77);
    assert_eq!(state_of(&cache, 0x100), LineState::Shared);
}

#[test]
fn purge_never_emits_data() {
    let mut bus = RamBus::new(0x1000);
    let mut cache = Cache::new(4, 2, 32);
    cache.write(0x100, &[0x77], false, &mut bus).unwrap();

    cache.purge(0x100);
    assert_eq!(bus.writes, 0, "purge drops the line silently");
    assert_eq!(state_of(&cache, 0x100), LineState::Invalid);

    // The modified data is gone; memory still has the old bytes.
    let mut b = [0u8; 1];
    cache.read(0x100, &mut b, false, &mut bus).unwrap();
    assert_eq!(b[0], 0);
}

// ══════════════════════════════════════════════════════════
// 4. Snoop side
// ══════════════════════════════════════════════════════════

#[test]
fn snoop_read_shared_downgrades_and_hands_back_data() {
    let mut bus = RamBus::new(0x1000);
    let mut cache = Cache::new(4, 2, 32);
    cache.write(0x100, &[0x99], false, &mut bus).unwrap();

    let (base, data) = cache.snoop_read_shared(0x110).expect("writeback data");
    assert_eq!(base, 0x100);
    assert_eq!(data[0], 0x99);
    assert_eq!(state_of(&cache, 0x100), LineState::Shared);

    // A second snoop has nothing to add.
    assert!(cache.snoop_read_shared(0x110).is_none());
}

#[test]
fn snoop_read_private_purges() {
    let mut bus = RamBus::new(0x1000);
    let mut cache = Cache::new(4, 2, 32);

    // Shared copy: purged without data.
    let mut b = [0u8; 1];
    cache.read(0x100, &mut b, false, &mut bus).unwrap();
    assert!(cache.snoop_read_private(0x100).is_none());
    assert_eq!(state_of(&cache, 0x100), LineState::Invalid);

    // Modified copy: handed back and purged.
    cache.write(0x200, &[0x42], false, &mut bus).unwrap();
    let (base, data) = cache.snoop_read_private(0x200).expect("writeback data");
    assert_eq!(base, 0x200);
    assert_eq!(data[0], 0x42);
    assert_eq!(state_of(&cache, 0x200), LineState::Invalid);
}
