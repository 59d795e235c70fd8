//! Loader tests.

use std::io::Write as _;

use crate::common::TestContext;
use t64_core::isa::assemble_instr;
use t64_core::sim::loader;

#[test]
fn loads_an_image_from_disk() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    let nop = assemble_instr("NOP").unwrap();
    let add = assemble_instr("ADD R2, R1, 7").unwrap();
    file.write_all(&nop.to_be_bytes()).unwrap();
    file.write_all(&add.to_be_bytes()).unwrap();
    file.flush().unwrap();

    let mut t = TestContext::new();
    loader::load_file_at(&mut t.system, 0, file.path())
        .expect("io")
        .expect("placement");

    t.set_reg(1, 1);
    t.step_n(2);
    assert_eq!(t.reg(2), 8);
}

#[test]
fn placement_outside_memory_fails() {
    let mut t = TestContext::new();
    let err = loader::load_at(&mut t.system, 0x4000_0000, &[1, 2, 3, 4]);
    assert!(err.is_err());
}

#[test]
fn loaded_bytes_replace_stale_cached_copies() {
    let mut t = TestContext::new();
    // Warm the instruction cache with a NOP at 0.
    t.asm_at(0, "NOP");
    t.step();

    // Reload the image under the cache; the uncached write path purges
    // the stale line, so the next fetch sees the new instruction.
    let add = assemble_instr("ADD R2, R1, 7").unwrap();
    let mut image = Vec::new();
    image.extend_from_slice(&add.to_be_bytes());
    loader::load_at(&mut t.system, 4, &image).expect("placement");

    t.set_reg(1, 5);
    t.step();
    assert_eq!(t.reg(2), 12);
}
