//! Disassembler tests.
//!
//! Verifies the rendered opcode and operand fields for each family and the
//! `**…**` placeholders on reserved encodings.

use t64_core::isa::asm::assemble_instr;
use t64_core::isa::disasm::{format_instr, opcode_str, operand_str, OPCODE_FIELD_WIDTH};

fn dis(line: &str) -> String {
    let w = assemble_instr(line).unwrap_or_else(|e| panic!("{:?} assembling {:?}", e, line));
    format_instr(w)
}

// ══════════════════════════════════════════════════════════
// 1. Rendering per family
// ══════════════════════════════════════════════════════════

#[test]
fn alu_forms() {
    assert_eq!(dis("ADD R2,R1,7"), "ADD R2,R1,7");
    assert_eq!(dis("ADD R2,R1,R3"), "ADD R2,R1,R3");
    assert_eq!(dis("SUB R4,R5,-3"), "SUB R4,R5,-3");
    assert_eq!(dis("AND.C.N R1,R2,R3"), "AND.C.N R1,R2,R3");
    assert_eq!(dis("XOR.N R1,R2,R3"), "XOR.N R1,R2,R3");
    assert_eq!(dis("NOP"), "NOP");
}

#[test]
fn mem_forms_show_width_and_shape() {
    assert_eq!(dis("ADD.W R2,8(R3)"), "ADD.W R2,8(R3)");
    assert_eq!(dis("LD.B R1,1(R2)"), "LD.B R1,1(R2)");
    assert_eq!(dis("LD R1,R3(R2)"), "LD R1,R3(R2)");
    assert_eq!(dis("LD.U.H R1,2(R2)"), "LD.U.H R1,2(R2)");
    assert_eq!(dis("ST.W R1,0(R2)"), "ST.W R1,0(R2)");
    assert_eq!(dis("LDR R1,0(R2)"), "LDR R1,0(R2)");
    assert_eq!(dis("STC R1,8(R2)"), "STC R1,8(R2)");
}

#[test]
fn cmp_condition_codes() {
    assert_eq!(dis("CMP.EQ R1,R2,5"), "CMP.EQ R1,R2,5");
    assert_eq!(dis("CMP.OD R1,R2,R3"), "CMP.OD R1,R2,R3");
    assert_eq!(dis("CMP.LE.W R1,4(R2)"), "CMP.LE.W R1,4(R2)");
}

#[test]
fn bit_field_ops() {
    assert_eq!(dis("EXTR R2,R1,16,16"), "EXTR R2,R1,16,16");
    assert_eq!(dis("EXTR.S R2,R1,SAR,8"), "EXTR.S R2,R1,SAR,8");
    assert_eq!(dis("DEP R1,R2,4,8"), "DEP R1,R2,4,8");
    assert_eq!(dis("DEP.Z R1,5,SAR,4"), "DEP.Z R1,5,SAR,4");
    assert_eq!(dis("DSR R1,R2,R3,12"), "DSR R1,R2,R3,12");
    assert_eq!(dis("DSR R1,R2,R3,SAR"), "DSR R1,R2,R3,SAR");
}

#[test]
fn shift_add_and_wide_immediates() {
    assert_eq!(dis("SHL1A R1,R2,R3"), "SHL1A R1,R2,R3");
    assert_eq!(dis("SHR2A R1,R2,33"), "SHR2A R1,R2,33");
    assert_eq!(dis("ADDIL R1,100"), "ADDIL R1,100");
    assert_eq!(dis("LDIL R1,74565"), "LDIL.L R1,74565");
    assert_eq!(dis("LDIL.U R1,0xFFF"), "LDIL.U R1,4095");
    assert_eq!(dis("LDO R1,16(R2)"), "LDO R1,16(R2)");
}

#[test]
fn branches() {
    assert_eq!(dis("B 0x100"), "B 256");
    assert_eq!(dis("B.G 0x40,R5"), "B.G 64,R5");
    assert_eq!(dis("BE 0x20(R5),R14"), "BE 32(R5),R14");
    assert_eq!(dis("BE (R5)"), "BE (R5)");
    assert_eq!(dis("BR R3,R14"), "BR.W R3,R14");
    assert_eq!(dis("BV R3,(R5)"), "BV.W R3(R5)");
    assert_eq!(dis("BB.T R3,5,0x10"), "BB.T R3,5,16");
    assert_eq!(dis("BB.F R3,SAR,-0x20"), "BB.F R3,SAR,-32");
    assert_eq!(dis("CBR.EQ R1,R2,0x20"), "CBR.EQ R1,R2,32");
    assert_eq!(dis("ABR.NE R1,R2,0x10"), "ABR.NE R1,R2,16");
    assert_eq!(dis("MBR.OD R3,R4,-4"), "MBR.OD R3,R4,-4");
}

#[test]
fn system_ops() {
    assert_eq!(dis("MFCR R1,C9"), "MFCR R1,C9");
    assert_eq!(dis("MTCR C9,R1"), "MTCR C9,R1");
    assert_eq!(dis("MFIA R1"), "MFIA R1");
    assert_eq!(dis("MFIA.M R2"), "MFIA.M R2");
    assert_eq!(dis("LPA R1,R3(R2)"), "LPA R1,R3(R2)");
    assert_eq!(dis("PRB R1,R2,1"), "PRB R1,R2,1");
    assert_eq!(dis("PRB R1,R2,R3"), "PRB R1,R2,R3");
    assert_eq!(dis("IITLB R1,R2,R3"), "IITLB R1,R2,R3");
    assert_eq!(dis("PDTLB R1,(R2)"), "PDTLB R1,(R2)");
    assert_eq!(dis("FICA R1,R4(R2)"), "FICA R1,R4(R2)");
    assert_eq!(dis("RSM R1,0x20"), "RSM R1,32");
    assert_eq!(dis("SSM R1,3"), "SSM R1,3");
    assert_eq!(dis("RFI"), "RFI");
    assert_eq!(dis("TRAP 3,R1,R2"), "TRAP 3,R1,R2");
    assert_eq!(dis("DIAG R1,9,R2,R3"), "DIAG R1,9,R2,R3");
}

// ══════════════════════════════════════════════════════════
// 2. Reserved encodings render as placeholders
// ══════════════════════════════════════════════════════════

#[test]
fn reserved_encodings_use_markers() {
    // ALU group, opcode 15 is unassigned.
    let w = 15u32 << 26;
    assert!(opcode_str(w).contains("**"));
    assert!(operand_str(w).contains("**"));

    // BITOP with a reserved Opt1 value.
    let w = assemble_instr("EXTR R1,R2,0,8").unwrap() | (0b111 << 19);
    assert!(opcode_str(w).contains("**BITOP**"));

    // XOR with the reserved complement bit set.
    let w = assemble_instr("XOR R1,R2,R3").unwrap() | (1 << 20);
    assert!(opcode_str(w).contains("**"));
}

#[test]
fn opcode_field_is_bounded() {
    for line in ["ADD R2,R1,7", "CMP.LE.W R1,4(R2)", "MFIA.M R2"] {
        let w = assemble_instr(line).unwrap();
        assert!(opcode_str(w).len() <= OPCODE_FIELD_WIDTH);
    }
}
