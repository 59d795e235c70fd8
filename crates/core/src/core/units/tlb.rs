//! Translation Lookaside Buffer.
//!
//! A directly indexed cache of virtual-to-physical page translations. Each
//! entry carries the page type, the region ID, and the locked and uncached
//! flags. The TLB insert instruction hands the hardware a packed info word:
//!
//! ```text
//!   bits [51:12]   physical page number
//!   bits [53:52]   page type (0=execute 1=read-only 2=read-write 3=probe-only)
//!   bits [57:56]   L: entry is locked and will not be displaced
//!   bits [59:58]   U: accesses through this entry bypass the caches
//! ```
//!
//! A miss is reported by `lookup` returning `None`; the CPU turns that into
//! an instruction or data TLB miss trap.

use crate::common::bits::extract_field64;
use crate::common::{VirtAddr, Word};

/// Page access classification of a TLB entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PageType {
    /// Instruction fetch allowed; data reads allowed.
    #[default]
    Execute,
    /// Data reads only.
    ReadOnly,
    /// Data reads and writes.
    ReadWrite,
    /// Neither fetch nor data access; visible to PRB only.
    ProbeOnly,
}

impl PageType {
    fn from_bits(v: u32) -> Self {
        match v {
            0 => PageType::Execute,
            1 => PageType::ReadOnly,
            2 => PageType::ReadWrite,
            _ => PageType::ProbeOnly,
        }
    }

    /// Encoding used in the insert info word.
    pub fn to_bits(self) -> u32 {
        match self {
            PageType::Execute => 0,
            PageType::ReadOnly => 1,
            PageType::ReadWrite => 2,
            PageType::ProbeOnly => 3,
        }
    }
}

/// One translation entry.
#[derive(Clone, Copy, Debug, Default)]
pub struct TlbEntry {
    /// 40-bit virtual page number (region ID and page index).
    pub page_num: Word,
    /// Physical page address; low 12 bits zero.
    pub phys_page: Word,
    /// Page access classification.
    pub page_type: PageType,
    /// 20-bit region ID of the virtual page.
    pub region_id: Word,
    /// Locked entries survive displacement by insert.
    pub locked: bool,
    /// Accesses bypass the caches.
    pub uncached: bool,
    /// Entry holds a translation.
    pub valid: bool,
}

/// Directly indexed translation cache.
pub struct Tlb {
    entries: Vec<TlbEntry>,
    mask: usize,
}

impl Tlb {
    /// Creates a TLB with `size` entries, rounded up to a power of two.
    pub fn new(size: usize) -> Self {
        let safe_size = size.max(1).next_power_of_two();
        Self {
            entries: vec![TlbEntry::default(); safe_size],
            mask: safe_size - 1,
        }
    }

    #[inline]
    fn index(&self, page_num: Word) -> usize {
        (page_num as usize) & self.mask
    }

    /// Looks up the translation for a virtual address.
    pub fn lookup(&self, vadr: VirtAddr) -> Option<&TlbEntry> {
        let page = vadr.page_num();
        let e = &self.entries[self.index(page)];
        if e.valid && e.page_num == page {
            Some(e)
        } else {
            None
        }
    }

    /// Inserts a translation from the packed `info` word.
    ///
    /// Returns `false` when the indexed slot holds a locked entry for a
    /// different page; the insert is rejected in that case.
    pub fn insert(&mut self, vadr: VirtAddr, info: Word) -> bool {
        let page = vadr.page_num();
        let idx = self.index(page);
        let old = &self.entries[idx];
        if old.valid && old.locked && old.page_num != page {
            return false;
        }

        self.entries[idx] = TlbEntry {
            page_num: page,
            phys_page: (info as u64 & 0x000F_FFFF_FFFF_F000) as Word,
            page_type: PageType::from_bits(extract_field64(info, 52, 2) as u32),
            region_id: vadr.region_id(),
            locked: extract_field64(info, 56, 2) != 0,
            uncached: extract_field64(info, 58, 2) != 0,
            valid: true,
        };
        true
    }

    /// Invalidates the entry matching the virtual address, if present.
    pub fn purge(&mut self, vadr: VirtAddr) {
        let page = vadr.page_num();
        let idx = self.index(page);
        if self.entries[idx].valid && self.entries[idx].page_num == page {
            self.entries[idx].valid = false;
        }
    }

    /// Invalidates every entry.
    pub fn reset(&mut self) {
        for e in &mut self.entries {
            e.valid = false;
        }
    }

    /// Number of entries; for the simulator display.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when the TLB holds no entries (never the case after `new`).
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry by index; for the simulator display.
    pub fn entry(&self, index: usize) -> &TlbEntry {
        &self.entries[index % self.entries.len()]
    }
}
