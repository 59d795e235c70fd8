//! TLB unit tests.
//!
//! Verifies:
//! - Basic lookup and insertion, including info-word decoding
//! - The locked and uncached flag fields
//! - Aliasing eviction and locked-entry rejection
//! - Purge and reset

use crate::common::harness::tlb_info;
use t64_core::common::{VirtAddr, Word};
use t64_core::core::units::tlb::{PageType, Tlb};

const VADR: Word = 0x100_0000_2000;

// ══════════════════════════════════════════════════════════
// 1. Basic operations
// ══════════════════════════════════════════════════════════

#[test]
fn lookup_miss_on_empty() {
    let tlb = Tlb::new(16);
    assert!(tlb.lookup(VirtAddr(VADR)).is_none());
}

#[test]
fn insert_and_lookup_hit() {
    let mut tlb = Tlb::new(16);
    assert!(tlb.insert(VirtAddr(VADR), tlb_info(0x7000, 2, false, false)));

    let e = tlb.lookup(VirtAddr(VADR)).expect("hit after insert");
    assert_eq!(e.phys_page, 0x7000);
    assert_eq!(e.page_type, PageType::ReadWrite);
    assert_eq!(e.region_id, 0x100);
    assert!(!e.locked);
    assert!(!e.uncached);
}

#[test]
fn lookup_ignores_page_offset() {
    let mut tlb = Tlb::new(16);
    tlb.insert(VirtAddr(VADR), tlb_info(0x7000, 1, false, false));
    assert!(tlb.lookup(VirtAddr(VADR | 0xABC)).is_some());
    assert!(tlb.lookup(VirtAddr(VADR + 0x1000)).is_none());
}

#[test]
fn info_word_flag_fields() {
    let mut tlb = Tlb::new(16);
    tlb.insert(VirtAddr(VADR), tlb_info(0x3000, 0, true, true));
    let e = tlb.lookup(VirtAddr(VADR)).unwrap();
    assert_eq!(e.page_type, PageType::Execute);
    assert!(e.locked);
    assert!(e.uncached);
}

// ══════════════════════════════════════════════════════════
// 2. Displacement
// ══════════════════════════════════════════════════════════

#[test]
fn aliasing_eviction() {
    let size = 16;
    let mut tlb = Tlb::new(size);
    // Two pages whose numbers collide modulo the TLB size.
    let a = VirtAddr(0);
    let b = VirtAddr((size as Word) << 12);

    assert!(tlb.insert(a, tlb_info(0x1000, 2, false, false)));
    assert!(tlb.insert(b, tlb_info(0x2000, 2, false, false)));
    assert!(tlb.lookup(b).is_some());
    assert!(tlb.lookup(a).is_none(), "alias displaced the old entry");
}

#[test]
fn locked_entry_rejects_displacement() {
    let size = 16;
    let mut tlb = Tlb::new(size);
    let a = VirtAddr(0);
    let b = VirtAddr((size as Word) << 12);

    assert!(tlb.insert(a, tlb_info(0x1000, 2, true, false)));
    assert!(!tlb.insert(b, tlb_info(0x2000, 2, false, false)));
    assert!(tlb.lookup(a).is_some(), "locked entry survives");

    // Re-inserting the same page updates in place.
    assert!(tlb.insert(a, tlb_info(0x3000, 2, false, false)));
    assert_eq!(tlb.lookup(a).unwrap().phys_page, 0x3000);
}

// ══════════════════════════════════════════════════════════
// 3. Purge and reset
// ══════════════════════════════════════════════════════════

#[test]
fn purge_invalidates_matching_entry() {
    let mut tlb = Tlb::new(16);
    tlb.insert(VirtAddr(VADR), tlb_info(0x7000, 2, false, false));
    tlb.purge(VirtAddr(VADR + 0x1000)); // different page: no effect
    assert!(tlb.lookup(VirtAddr(VADR)).is_some());
    tlb.purge(VirtAddr(VADR));
    assert!(tlb.lookup(VirtAddr(VADR)).is_none());
}

#[test]
fn reset_clears_everything() {
    let mut tlb = Tlb::new(16);
    for i in 0..16 {
        tlb.insert(
            VirtAddr(VADR + (i << 12)),
            tlb_info(0x1000 * i, 2, false, false),
        );
    }
    tlb.reset();
    for i in 0..16 {
        assert!(tlb.lookup(VirtAddr(VADR + (i << 12))).is_none());
    }
}
