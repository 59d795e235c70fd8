//! T64 simulator command-line driver.
//!
//! This binary provides a single entry point for the simulator library. It
//! performs:
//! 1. **Run:** Load a flat binary into physical memory and step the system.
//! 2. **Asm:** Assemble one line of T64 assembly and print the encoding.
//! 3. **Dis:** Disassemble a 32-bit instruction word.

use std::fs;
use std::process;

use clap::{Parser, Subcommand};
use tracing::Level;

use t64_core::common::Word;
use t64_core::isa;
use t64_core::sim::loader;
use t64_core::{SimConfig, System};

#[derive(Parser, Debug)]
#[command(
    name = "t64sim",
    version,
    about = "T64 64-bit processor simulator",
    long_about = "Run a flat binary against a simulated T64 system, or use the\n\
                  one-line assembler and the disassembler directly.\n\n\
                  Examples:\n  t64sim run -f boot.bin --steps 1000\n  \
                  t64sim asm 'ADD R2, R1, 7'\n  t64sim dis 0x46009007"
)]
struct Cli {
    /// Log verbosity (error, warn, info, debug, trace).
    #[arg(long, default_value = "warn")]
    log: Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load a binary and step the system.
    Run {
        /// Flat binary image to load.
        #[arg(short, long)]
        file: String,

        /// Physical load address; the reset IA points here.
        #[arg(long, default_value_t = 0)]
        load_adr: Word,

        /// Number of steps to execute.
        #[arg(long, default_value_t = 1_000)]
        steps: u64,

        /// JSON configuration file; defaults apply when omitted.
        #[arg(long)]
        config: Option<String>,
    },

    /// Assemble one line and print the instruction word.
    Asm {
        /// The instruction in mnemonic form, e.g. "ADD R2, R1, 7".
        line: String,
    },

    /// Disassemble a 32-bit instruction word (decimal or 0x-hex).
    Dis {
        /// The instruction word.
        word: String,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(cli.log)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            file,
            load_adr,
            steps,
            config,
        } => cmd_run(&file, load_adr, steps, config.as_deref()),
        Commands::Asm { line } => cmd_asm(&line),
        Commands::Dis { word } => cmd_dis(&word),
    }
}

fn read_config(path: Option<&str>) -> SimConfig {
    match path {
        None => SimConfig::default(),
        Some(p) => {
            let text = fs::read_to_string(p).unwrap_or_else(|e| {
                eprintln!("error reading config {}: {}", p, e);
                process::exit(1);
            });
            serde_json::from_str(&text).unwrap_or_else(|e| {
                eprintln!("error parsing config {}: {}", p, e);
                process::exit(1);
            })
        }
    }
}

/// Builds a single-processor system, loads the image, and steps.
fn cmd_run(file: &str, load_adr: Word, steps: u64, config: Option<&str>) {
    let mut config = read_config(config);
    config.cpu.start_ia = load_adr;

    let mut system = System::single_processor(&config);

    let data = loader::load_binary(file).unwrap_or_else(|e| {
        eprintln!("error reading {}: {}", file, e);
        process::exit(1);
    });
    if let Err(fault) = loader::load_at(&mut system, load_adr, &data) {
        eprintln!("error placing image: {}", fault);
        process::exit(1);
    }
    println!(
        "loaded {} bytes at {:#x}; stepping {} instructions",
        data.len(),
        load_adr,
        steps
    );

    system.run(steps);

    let proc = system.processor_mut(0).expect("processor module 0");
    let ia = t64_core::common::addr::psr_ia(proc.cpu().psr());
    println!("IA = {:#x}", ia);
    for i in 0..4 {
        let base = i * 4;
        let regs: Vec<String> = (base..base + 4)
            .map(|r| format!("R{:<2} {:#018x}", r, proc.cpu().general_reg(r)))
            .collect();
        println!("{}", regs.join("  "));
    }
    proc.stats().print(0);
}

fn cmd_asm(line: &str) {
    match isa::assemble_instr(line) {
        Ok(word) => println!("{:#010x}  {}", word, isa::format_instr(word)),
        Err(e) => {
            eprintln!("{}", line);
            eprintln!("{}^", " ".repeat(e.col));
            eprintln!("error: {}", e);
            process::exit(1);
        }
    }
}

fn cmd_dis(word: &str) {
    let parsed = if let Some(hex) = word.strip_prefix("0x").or_else(|| word.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16)
    } else {
        word.parse::<u32>()
    };
    match parsed {
        Ok(w) => println!("{:<16} {}", isa::opcode_str(w), isa::operand_str(w)),
        Err(e) => {
            eprintln!("error: {} is not a 32-bit word: {}", word, e);
            process::exit(1);
        }
    }
}
