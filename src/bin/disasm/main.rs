use std::env;
use std::fs;

use anyhow::{bail, Result};
use itertools::Itertools;

use ease68k::cpu_m68k::instruction::Instruction;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        bail!("Syntax: {} <filename> [origin]", args[0]);
    }

    let f = fs::read(&args[1])?;
    let origin = match args.get(2) {
        Some(s) => u32::from_str_radix(s.trim_start_matches('$'), 16)?,
        None => 0,
    };

    let words = f
        .chunks(2)
        .map(|c| u16::from_be_bytes([c[0], *c.get(1).unwrap_or(&0)]))
        .collect::<Vec<_>>();
    let mut pos = 0;
    while pos < words.len() {
        let addr = origin + pos as u32 * 2;
        let ins = match Instruction::decode(&mut words[pos..].iter().copied(), addr) {
            Ok(Some(ins)) => ins,
            Ok(None) => {
                println!("{:06X}  {:04X}  ???", addr, words[pos]);
                break;
            }
            Err(e) => {
                println!("{:06X}  {:04X}  ; {}", addr, words[pos], e);
                break;
            }
        };
        let len = ins.word_length();
        let raw = words[pos..pos + len].iter().map(|w| format!("{:04X}", w)).join(" ");
        println!("{:06X}  {:<24}  {}", addr, raw, ins);
        pos += len;
    }
    Ok(())
}
