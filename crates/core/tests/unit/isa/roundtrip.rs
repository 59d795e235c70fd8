//! Assembler/disassembler round-trip law.
//!
//! For every assembler-acceptable line, disassembling the encoding and
//! assembling the rendered text must reproduce the same instruction word.

use t64_core::isa::asm::assemble_instr;
use t64_core::isa::disasm::format_instr;

const LINES: &[&str] = &[
    "NOP",
    "ADD R2,R1,7",
    "ADD R2,R1,R3",
    "ADD.W R2,8(R3)",
    "ADD R2,R4(R3)",
    "SUB R1,R2,R3",
    "SUB R1,R2,-100",
    "SUB.H R1,2(R2)",
    "AND R1,R2,R3",
    "AND.C R1,R2,0x7F",
    "AND.N R1,R2,R3",
    "OR.C.N R4,R5,-9",
    "OR R4,R5,R6",
    "XOR R1,R2,R3",
    "XOR.N R1,R2,33",
    "CMP.EQ R1,R2,5",
    "CMP.NE R1,R2,R3",
    "CMP.LT R1,R2,-1",
    "CMP.GE.W R1,4(R2)",
    "CMP.OD R1,R5(R2)",
    "EXTR R2,R1,16,16",
    "EXTR.S R2,R1,SAR,8",
    "EXTR R2,R1,0,63",
    "DEP R1,R2,4,8",
    "DEP.Z R1,5,SAR,4",
    "DEP R1,15,0,4",
    "DSR R1,R2,R3,12",
    "DSR R1,R2,R3,SAR",
    "SHL1A R1,R2,R3",
    "SHL3A R1,R2,-5",
    "SHR1A R1,R2,R3",
    "SHR2A R1,R2,33",
    "ADDIL R1,100",
    "LDIL R1,0x12345",
    "LDIL.M R1,0xABCDE",
    "LDIL.U R1,0xFFF",
    "LDO R1,16(R2)",
    "LDO.W R1,-64(R2)",
    "LDO R1,R3(R2)",
    "LD R1,8(R2)",
    "LD.B R1,1(R2)",
    "LD.U.W R1,4(R2)",
    "LD R1,R3(R2)",
    "ST.H R1,2(R2)",
    "ST R1,R4(R2)",
    "LDR R1,0(R2)",
    "STC R1,8(R2)",
    "B 0x100",
    "B -0x40",
    "B.G 0x40,R5",
    "BE 0x20(R5),R14",
    "BE (R5)",
    "BR R3",
    "BR.D R3,R14",
    "BV R3,(R5)",
    "BV.Q (R5),R14",
    "BB.T R3,5,0x10",
    "BB.F R3,SAR,-0x20",
    "CBR.EQ R1,R2,0x20",
    "CBR.GT R1,R2,-0x40",
    "ABR.NE R1,R2,0x10",
    "ABR.EV R1,R2,4",
    "MBR.OD R3,R4,-4",
    "MBR.LE R3,R4,0x7C",
    "MFCR R1,C9",
    "MFCR R1,SAR",
    "MTCR C9,R1",
    "MFIA R1",
    "MFIA.L R2",
    "MFIA.M R2",
    "MFIA.U R2",
    "LPA R1,R3(R2)",
    "LPA R1,(R2)",
    "PRB R1,R2,0",
    "PRB R1,R2,2",
    "PRB R1,R2,R3",
    "IITLB R1,R2,R3",
    "IDTLB R4,R5,R6",
    "PITLB R1,R3(R2)",
    "PDTLB R1,(R2)",
    "PICA R1,(R2)",
    "PDCA R1,R4(R2)",
    "FICA R1,R4(R2)",
    "FDCA R1,(R2)",
    "RSM R1,0x20",
    "SSM R1,3",
    "RFI",
    "TRAP 3,R1,R2",
    "TRAP 31,R0,R0",
    "DIAG R1,9,R2,R3",
];

#[test]
fn disassembly_reassembles_to_the_same_word() {
    for line in LINES {
        let word = assemble_instr(line)
            .unwrap_or_else(|e| panic!("{:?} assembling {:?}", e, line));
        let text = format_instr(word);
        let again = assemble_instr(&text)
            .unwrap_or_else(|e| panic!("{:?} reassembling {:?} (from {:?})", e, text, line));
        assert_eq!(word, again, "{:?} -> {:?}", line, text);
    }
}

#[test]
fn synonyms_encode_identically() {
    for (a, b) in [
        ("ADD R2,T0,SP", "ADD R2,R1,R15"),
        ("LD RL,8(DP)", "LD R14,8(R13)"),
        ("ST ARG0,0(SP)", "ST R11,0(R15)"),
        ("DSR R1,R2,R3,SAR", "DSR R1,R2,R3,C4"),
    ] {
        assert_eq!(
            assemble_instr(a).unwrap(),
            assemble_instr(b).unwrap(),
            "{a} vs {b}"
        );
    }
}
