use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;
use colored::*;

use ease68k::cpu_m68k::cpu::{CpuM68k, StepResult};
use ease68k::loader::{load_file, Format};

#[derive(Parser)]
#[command(about = "ease68k - Motorola 68000 simulator", long_about = None)]
struct Args {
    /// Program to load (list file, S-records or memory image)
    filename: PathBuf,

    /// File format, guessed from the extension if omitted
    #[arg(short, long, value_enum)]
    format: Option<Format>,

    /// Override the start address
    #[arg(long, value_parser = parse_address)]
    start: Option<u32>,

    /// Print CPU state after each instruction
    #[arg(short, long)]
    verbose: bool,

    /// Wait for enter after each CPU step
    #[arg(short, long)]
    pause: bool,

    /// Stop after this many instructions
    #[arg(long)]
    steps: Option<usize>,

    /// Write the final register file as JSON
    #[arg(long)]
    state: Option<PathBuf>,

    /// Write the final memory image
    #[arg(long)]
    dump: Option<PathBuf>,
}

fn parse_address(s: &str) -> Result<u32> {
    let v = match s.strip_prefix('$').or_else(|| s.strip_prefix("0x")) {
        Some(hex) => u32::from_str_radix(hex, 16)?,
        None => s.parse()?,
    };
    Ok(v)
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let Some(format) = args.format.or_else(|| Format::from_path(&args.filename)) else {
        bail!(
            "Cannot guess the format of {}, use --format",
            args.filename.display()
        );
    };
    let program = load_file(&args.filename, format)?;
    let start = args.start.unwrap_or(program.start);
    if let Some(listing) = &program.listing {
        for (name, addr) in &listing.symbols {
            log::debug!("Symbol {} = ${:06X}", name, addr);
        }
    }
    println!("Start at PC ${:06X}", start);

    let mut cpu = CpuM68k::new(program.memory, start)?;
    let stdin = io::stdin();

    let result = loop {
        if args.steps.is_some_and(|max| cpu.get_steps() >= max) {
            println!("Step limit reached");
            break Ok(());
        }
        if args.verbose {
            println!("{}", cpu.dump_state().green());
        }
        if args.pause {
            let mut line = String::new();
            stdin.lock().read_line(&mut line)?;
        }
        match cpu.step() {
            Ok(StepResult::Executed) => (),
            Ok(StepResult::Halted) => break Ok(()),
            Err(e) => break Err(e),
        }
    };

    if let Err(e) = &result {
        println!("{}", format!("{:#}", e).red());
    }
    println!("{}", cpu.dump_state().yellow());

    if let Some(path) = &args.state {
        let file = fs::File::create(path)
            .with_context(|| format!("Cannot create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &cpu.regs)?;
        println!("State dumped to {}", path.display());
    }
    if let Some(path) = &args.dump {
        fs::write(path, cpu.bus.save_image())
            .with_context(|| format!("Cannot write {}", path.display()))?;
        println!("Memory dumped to {}", path.display());
    }

    result
}
