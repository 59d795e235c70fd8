//! Configuration tests.

use t64_core::config::{SimConfig, DEF_PHYS_MEM_LIMIT};

#[test]
fn defaults_are_sensible() {
    let c = SimConfig::default();
    assert_eq!(c.cpu.start_ia, 0);
    assert_eq!(c.cpu.phys_mem_limit, DEF_PHYS_MEM_LIMIT);
    assert!(c.tlb.entries.is_power_of_two());
    assert!(c.cache.line_bytes >= 8);
}

#[test]
fn deserializes_from_json() {
    let text = r#"{
        "cpu": { "start_ia": 256, "iva": 1024, "phys_mem_limit": 1099511627775 },
        "tlb": { "entries": 128 },
        "cache": { "sets": 32, "ways": 2, "line_bytes": 64 },
        "memory": { "base": 0, "size": 65536 }
    }"#;
    let c: SimConfig = serde_json::from_str(text).expect("valid config");
    assert_eq!(c.cpu.start_ia, 0x100);
    assert_eq!(c.cpu.iva, 0x400);
    assert_eq!(c.tlb.entries, 128);
    assert_eq!(c.cache.line_bytes, 64);
    assert_eq!(c.memory.size, 64 * 1024);
}

#[test]
fn partial_json_falls_back_to_defaults() {
    let c: SimConfig = serde_json::from_str("{}").expect("empty config");
    assert_eq!(c.memory.size, SimConfig::default().memory.size);
}
