//! Address-range routing tests.

use crate::common::TestContext;
use t64_core::config::{SimConfig, HPA_BASE, HPA_SIZE};
use t64_core::soc::{MemoryModule, ProcessorModule, System};

#[test]
fn lookup_resolves_spa_and_hpa_ranges() {
    let mut t = TestContext::new();
    // RAM is module 1; its SPA starts at 0.
    assert_eq!(t.system.lookup_by_adr(0), Some(1));
    assert_eq!(t.system.lookup_by_adr(0xFFFF), Some(1));
    assert_eq!(t.system.lookup_by_adr(0x10000), None);

    // HPA ranges are per module number.
    assert_eq!(t.system.lookup_by_adr(HPA_BASE), Some(0));
    assert_eq!(t.system.lookup_by_adr(HPA_BASE + HPA_SIZE), Some(1));
    assert_eq!(t.system.lookup_by_adr(HPA_BASE + 3 * HPA_SIZE), None);
}

#[test]
fn duplicate_module_number_is_rejected() {
    let config = SimConfig::default();
    let mut sys = System::new();
    sys.add_module(Box::new(ProcessorModule::new(0, &config)))
        .unwrap();
    assert!(sys
        .add_module(Box::new(ProcessorModule::new(0, &config)))
        .is_err());
}

#[test]
fn overlapping_spa_ranges_are_rejected() {
    let mut sys = System::new();
    sys.add_module(Box::new(MemoryModule::new(0, 0, 0x10000)))
        .unwrap();
    assert!(sys
        .add_module(Box::new(MemoryModule::new(1, 0x8000, 0x10000)))
        .is_err());
}

#[test]
fn remove_module_drops_its_ranges() {
    let mut sys = System::new();
    sys.add_module(Box::new(MemoryModule::new(0, 0, 0x10000)))
        .unwrap();
    assert_eq!(sys.lookup_by_adr(0x100), Some(0));

    assert!(sys.remove_module(0).is_some());
    assert_eq!(sys.lookup_by_adr(0x100), None);

    // The range is free again.
    sys.add_module(Box::new(MemoryModule::new(2, 0, 0x10000)))
        .unwrap();
    assert_eq!(sys.lookup_by_adr(0x100), Some(2));
}

#[test]
fn unowned_address_faults() {
    let mut t = TestContext::new();
    let mut buf = [0u8; 4];
    assert!(t.system.read_phys(0xDEAD_0000, &mut buf).is_err());
    assert!(t.system.write_phys(0xDEAD_0000, &buf).is_err());
}

#[test]
fn command_surface_reaches_hpa_words() {
    let mut t = TestContext::new();
    let adr = HPA_BASE + HPA_SIZE; // module 1's control space
    t.write_mem(adr, &[1, 2, 3, 4]);
    assert_eq!(t.read_mem(adr, 4), vec![1, 2, 3, 4]);
}

#[test]
fn reset_clears_memory_and_counters() {
    let mut t = TestContext::new();
    t.write_mem(0x100, &[0xFF]);
    t.asm_at(0, "NOP");
    t.step();
    assert_eq!(t.proc(0).stats().instruction_count, 1);

    t.system.reset();
    assert_eq!(t.read_mem(0x100, 1), vec![0]);
    assert_eq!(t.proc(0).stats().instruction_count, 0);
}
