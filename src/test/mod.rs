
use crate::bus::memory::Memory;
use crate::bus::{Address, Bus};
use crate::cpu_m68k::cpu::CpuM68k;
use crate::cpu_m68k::instruction::Instruction;
use crate::cpu_m68k::trap::{Console, SharedBuffer};

/// Assembles lines of source text consecutively, starting at `start`.
fn assemble(start: Address, lines: &[&str]) -> Vec<u8> {
    let mut out = vec![];
    for line in lines {
        let addr = start + out.len() as Address;
        let instr = Instruction::from_text(line, addr)
            .unwrap_or_else(|e| panic!("{}: {:?}", line, e));
        out.extend(instr.assemble(addr).unwrap());
    }
    out
}

/// CPU on a full memory with the program placed at `start`.
fn machine(start: Address, lines: &[&str], input: &str) -> (CpuM68k<Memory>, SharedBuffer) {
    let mut memory = Memory::new();
    memory.write_bytes(start, &assemble(start, lines)).unwrap();
    let (console, out) = Console::captured(input);
    (CpuM68k::with_console(memory, start, console).unwrap(), out)
}
