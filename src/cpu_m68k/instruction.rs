use std::fmt;

use anyhow::{bail, Context, Result};
use itertools::Itertools;
use num_traits::FromPrimitive;
use strum::Display;
use thiserror::Error;

use super::condition::Condition;
use super::dispatch::dispatch;
use super::ea::{
    EaMode, Operand, Role, MODES_ALL, MODES_ALTERABLE, MODES_CONTROL, MODES_DATA,
    MODES_DATA_ALTERABLE, MODES_MEMORY_ALTERABLE,
};
use super::instruction_table::{format, InstructionType};
use super::value::{Size, Value};
use crate::bus::{Address, ADDRESS_SPACE};

/// Instructions with an `<ea>,Dn` and a `Dn,<ea>` form.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ArithOp {
    Add,
    Sub,
    And,
    Or,
}

/// ADDA/SUBA and ADDQ/SUBQ.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum AddSub {
    Add,
    Sub,
}

const MODES_DATA_REGISTER: &[EaMode] = &[EaMode::DataDirect];
const MODES_ADDRESS_REGISTER: &[EaMode] = &[EaMode::AddressDirect];
const MODES_IMMEDIATE: &[EaMode] = &[EaMode::Immediate];

/// A single instruction with its operands resolved.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Instruction {
    Move {
        size: Size,
        src: Operand,
        dst: Operand,
    },
    Movea {
        size: Size,
        src: Operand,
        dst: Operand,
    },
    Arith {
        op: ArithOp,
        size: Size,
        src: Operand,
        dst: Operand,
    },
    /// ADDA, SUBA
    ArithA {
        op: AddSub,
        size: Size,
        src: Operand,
        dst: Operand,
    },
    /// ADDQ, SUBQ. Data is 1 - 8.
    Quick {
        op: AddSub,
        size: Size,
        data: u8,
        dst: Operand,
    },
    Eor {
        size: Size,
        src: Operand,
        dst: Operand,
    },
    Cmp {
        size: Size,
        src: Operand,
        dst: Operand,
    },
    Cmpi {
        size: Size,
        src: Operand,
        dst: Operand,
    },
    Neg {
        size: Size,
        dst: Operand,
    },
    Lea {
        src: Operand,
        dst: Operand,
    },
    Jsr {
        target: Operand,
    },
    Rts,
    Nop,
    Trap {
        vector: u8,
    },
    /// Bcc and BRA (condition T). The displacement width is kept so
    /// encoding reproduces the original words.
    Branch {
        cond: Condition,
        target: Address,
        disp_size: Size,
    },
    Bsr {
        target: Address,
        disp_size: Size,
    },
    Simhalt,
    /// Constant data, assembler only.
    Dc {
        size: Size,
        data: Vec<u8>,
    },
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum DecodeErr {
    #[error("End of instruction stream")]
    EndOfStream,
    #[error("Invalid size field {field:#b} for {mnemonic}")]
    Size { mnemonic: &'static str, field: u16 },
    #[error("Invalid or incomplete effective address (mode {mode}, register {reg}) for {mnemonic}")]
    Ea {
        mnemonic: &'static str,
        mode: u16,
        reg: u16,
    },
    #[error("Illegal {mnemonic} ({word:04X}): {reason}")]
    Illegal {
        mnemonic: &'static str,
        word: u16,
        reason: String,
    },
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Display)]
pub enum Severity {
    Warning,
    Error,
}

/// A problem found while validating an instruction.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("{severity}: {message}")]
pub struct Issue {
    pub message: String,
    pub severity: Severity,
}

impl Issue {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Warning,
        }
    }
}

/// Branch mnemonics, indexed by condition. The F slot is BSR.
const BRANCH_MNEMONICS: [&str; 16] = [
    "BRA", "BSR", "BHI", "BLS", "BCC", "BCS", "BNE", "BEQ", "BVC", "BVS", "BPL", "BMI", "BGE",
    "BLT", "BGT", "BLE",
];

/// Size field (bits 7..6) of most instructions.
fn decode_size(mnemonic: &'static str, field: u16) -> Result<Size, DecodeErr> {
    match field {
        0 => Ok(Size::Byte),
        1 => Ok(Size::Word),
        2 => Ok(Size::Long),
        _ => Err(DecodeErr::Size { mnemonic, field }),
    }
}

const fn size_bits(size: Size) -> u16 {
    match size {
        Size::Byte => 0,
        Size::Word => 1,
        Size::Long => 2,
    }
}

/// Displacement of a branch at `addr` to `target`.
fn branch_displacement(addr: Address, target: Address) -> i64 {
    i64::from(target) - (i64::from(addr) + 2)
}

/// Selects the smallest displacement width for a branch at `addr`.
/// A byte displacement of 0 or -1 would denote a word or long
/// displacement, so those take a word.
pub fn branch_size(addr: Address, target: Address) -> Size {
    let disp = branch_displacement(addr, target);
    if (-128..=127).contains(&disp) && disp != 0 && disp != -1 {
        Size::Byte
    } else if (i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(&disp) {
        Size::Word
    } else {
        Size::Long
    }
}

/// Encodes a branch: the first word for the given condition slot and
/// the displacement extension.
fn encode_branch(
    cond: u16,
    addr: Address,
    target: Address,
    disp_size: Size,
) -> Result<Vec<u16>> {
    let disp = branch_displacement(addr, target);
    let bcc = format(InstructionType::BCC);
    match disp_size {
        Size::Byte => {
            if !(-128..=127).contains(&disp) || disp == 0 || disp == -1 {
                bail!("Displacement {} does not fit a short branch", disp);
            }
            Ok(vec![bcc.build(&[cond, disp as u16])])
        }
        Size::Word => {
            if !(i64::from(i16::MIN)..=i64::from(i16::MAX)).contains(&disp) {
                bail!("Displacement {} does not fit a word branch", disp);
            }
            Ok(vec![bcc.build(&[cond, 0x00]), disp as u16])
        }
        Size::Long => Ok(vec![
            bcc.build(&[cond, 0xFF]),
            (disp >> 16) as u16,
            disp as u16,
        ]),
    }
}

impl Instruction {
    /// Tries to decode a single instruction from a stream of words.
    ///
    /// `addr` is the address of the first word, used to resolve branch
    /// targets. Returns None if the first word matches no instruction.
    pub fn decode(
        stream: &mut impl Iterator<Item = u16>,
        addr: Address,
    ) -> Result<Option<Instruction>> {
        let word = stream.next().ok_or(DecodeErr::EndOfStream)?;
        let Some(def) = dispatch(word) else {
            return Ok(None);
        };
        let mnemonic = def.mnemonic;
        let f = def.extract(word);

        let mut ea = |mode: u16, reg: u16, size: Size, role: Role| -> Result<Operand> {
            Ok(Operand::decode(mode, reg, size, role, stream)
                .ok_or(DecodeErr::Ea {
                    mnemonic,
                    mode,
                    reg,
                })?
                .0)
        };
        let an = |reg: u16| -> Result<Operand> { Ok(Operand::addr_reg(reg as u8)?) };
        let dn = |reg: u16| -> Result<Operand> { Ok(Operand::data_reg(reg as u8)?) };

        let instr = match def.instr_type {
            InstructionType::MOVE_B | InstructionType::MOVE_W | InstructionType::MOVE_L => {
                let size = match def.instr_type {
                    InstructionType::MOVE_B => Size::Byte,
                    InstructionType::MOVE_W => Size::Word,
                    _ => Size::Long,
                };
                let src = ea(f[2], f[3], size, Role::Source)?;
                let dst = ea(f[1], f[0], size, Role::Destination)?;
                Instruction::Move { size, src, dst }
            }
            InstructionType::MOVEA_W | InstructionType::MOVEA_L => {
                let size = if def.instr_type == InstructionType::MOVEA_W {
                    Size::Word
                } else {
                    Size::Long
                };
                Instruction::Movea {
                    size,
                    src: ea(f[1], f[2], size, Role::Source)?,
                    dst: an(f[0])?,
                }
            }
            InstructionType::ADD | InstructionType::SUB | InstructionType::AND | InstructionType::OR => {
                let op = match def.instr_type {
                    InstructionType::ADD => ArithOp::Add,
                    InstructionType::SUB => ArithOp::Sub,
                    InstructionType::AND => ArithOp::And,
                    _ => ArithOp::Or,
                };
                let size = decode_size(mnemonic, f[1] & 3)?;
                if f[1] & 4 == 0 {
                    // <ea>,Dn
                    Instruction::Arith {
                        op,
                        size,
                        src: ea(f[2], f[3], size, Role::Source)?,
                        dst: dn(f[0])?,
                    }
                } else {
                    // Dn,<ea>; register destinations belong to other instructions
                    let dst = ea(f[2], f[3], size, Role::Destination)?;
                    if !MODES_MEMORY_ALTERABLE.contains(&dst.mode()) {
                        return Err(DecodeErr::Ea {
                            mnemonic,
                            mode: f[2],
                            reg: f[3],
                        }
                        .into());
                    }
                    Instruction::Arith {
                        op,
                        size,
                        src: dn(f[0])?,
                        dst,
                    }
                }
            }
            InstructionType::ADDA | InstructionType::SUBA => {
                let size = if f[1] == 0 { Size::Word } else { Size::Long };
                Instruction::ArithA {
                    op: if def.instr_type == InstructionType::ADDA {
                        AddSub::Add
                    } else {
                        AddSub::Sub
                    },
                    size,
                    src: ea(f[2], f[3], size, Role::Source)?,
                    dst: an(f[0])?,
                }
            }
            InstructionType::ADDQ | InstructionType::SUBQ => {
                let size = decode_size(mnemonic, f[1])?;
                Instruction::Quick {
                    op: if def.instr_type == InstructionType::ADDQ {
                        AddSub::Add
                    } else {
                        AddSub::Sub
                    },
                    size,
                    data: if f[0] == 0 { 8 } else { f[0] as u8 },
                    dst: ea(f[2], f[3], size, Role::Destination)?,
                }
            }
            InstructionType::EOR => {
                let size = decode_size(mnemonic, f[1])?;
                Instruction::Eor {
                    size,
                    src: dn(f[0])?,
                    dst: ea(f[2], f[3], size, Role::Destination)?,
                }
            }
            InstructionType::CMP => {
                let size = decode_size(mnemonic, f[1])?;
                Instruction::Cmp {
                    size,
                    src: ea(f[2], f[3], size, Role::Source)?,
                    dst: dn(f[0])?,
                }
            }
            InstructionType::CMPI => {
                let size = decode_size(mnemonic, f[0])?;
                // Immediate precedes the destination extension
                let src = ea(7, 4, size, Role::Source)?;
                let dst = ea(f[1], f[2], size, Role::Destination)?;
                Instruction::Cmpi { size, src, dst }
            }
            InstructionType::NEG => {
                let size = decode_size(mnemonic, f[0])?;
                Instruction::Neg {
                    size,
                    dst: ea(f[1], f[2], size, Role::Destination)?,
                }
            }
            InstructionType::LEA => Instruction::Lea {
                src: ea(f[1], f[2], Size::Long, Role::Source)?,
                dst: an(f[0])?,
            },
            InstructionType::JSR => Instruction::Jsr {
                target: ea(f[0], f[1], Size::Long, Role::Source)?,
            },
            InstructionType::RTS => Instruction::Rts,
            InstructionType::NOP => Instruction::Nop,
            InstructionType::TRAP => Instruction::Trap {
                vector: f[0] as u8,
            },
            InstructionType::BCC | InstructionType::BSR => {
                let (cond, disp8) = if def.instr_type == InstructionType::BSR {
                    (1, f[0])
                } else {
                    (f[0], f[1])
                };
                let (disp, disp_size) = match disp8 {
                    0x00 => {
                        let w = stream.next().ok_or(DecodeErr::EndOfStream)?;
                        (i64::from(w as i16), Size::Word)
                    }
                    0xFF => {
                        let hi = stream.next().ok_or(DecodeErr::EndOfStream)?;
                        let lo = stream.next().ok_or(DecodeErr::EndOfStream)?;
                        (
                            i64::from((u32::from(hi) << 16 | u32::from(lo)) as i32),
                            Size::Long,
                        )
                    }
                    d => (i64::from(d as u8 as i8), Size::Byte),
                };
                let target = i64::from(addr) + 2 + disp;
                if !(0..i64::from(ADDRESS_SPACE)).contains(&target) {
                    return Err(DecodeErr::Illegal {
                        mnemonic,
                        word,
                        reason: format!("branch target {} outside of address space", target),
                    }
                    .into());
                }
                let target = target as Address;
                if def.instr_type == InstructionType::BSR {
                    Instruction::Bsr { target, disp_size }
                } else {
                    Instruction::Branch {
                        cond: Condition::from_u16(cond).context("Bad condition")?,
                        target,
                        disp_size,
                    }
                }
            }
            InstructionType::SIMHALT => {
                let second = stream.next().ok_or(DecodeErr::EndOfStream)?;
                if second != 0xFFFF {
                    return Err(DecodeErr::Illegal {
                        mnemonic,
                        word,
                        reason: format!("second word {:04X}", second),
                    }
                    .into());
                }
                Instruction::Simhalt
            }
        };

        if let Some(issue) = instr
            .validate()
            .into_iter()
            .find(|i| i.severity == Severity::Error)
        {
            return Err(DecodeErr::Illegal {
                mnemonic,
                word,
                reason: issue.message,
            }
            .into());
        }
        Ok(Some(instr))
    }

    /// Encodes the instruction as it would be placed at `addr`.
    pub fn assemble_words(&self, addr: Address) -> Result<Vec<u16>> {
        let mut words = vec![];
        let mut out = |word: u16, exts: &[&[u16]]| {
            words.push(word);
            for ext in exts {
                words.extend_from_slice(ext);
            }
        };

        match self {
            Instruction::Move { size, src, dst } => {
                let t = match size {
                    Size::Byte => InstructionType::MOVE_B,
                    Size::Word => InstructionType::MOVE_W,
                    Size::Long => InstructionType::MOVE_L,
                };
                let (sf, sext) = src.encode(*size);
                let (df, dext) = dst.encode_swapped(*size);
                out(
                    format(t).build(&[df >> 3, df & 7, sf >> 3, sf & 7]),
                    &[&sext, &dext],
                );
            }
            Instruction::Movea { size, src, dst } => {
                let t = if *size == Size::Word {
                    InstructionType::MOVEA_W
                } else {
                    InstructionType::MOVEA_L
                };
                let (sf, sext) = src.encode(*size);
                out(
                    format(t).build(&[dst.data() as u16, sf >> 3, sf & 7]),
                    &[&sext],
                );
            }
            Instruction::Arith { op, size, src, dst } => {
                let t = match op {
                    ArithOp::Add => InstructionType::ADD,
                    ArithOp::Sub => InstructionType::SUB,
                    ArithOp::And => InstructionType::AND,
                    ArithOp::Or => InstructionType::OR,
                };
                let (reg, dir, ea) = if dst.mode() == EaMode::DataDirect {
                    (dst, 0, src)
                } else {
                    (src, 4, dst)
                };
                let (ef, ext) = ea.encode(*size);
                out(
                    format(t).build(&[reg.data() as u16, dir | size_bits(*size), ef >> 3, ef & 7]),
                    &[&ext],
                );
            }
            Instruction::ArithA { op, size, src, dst } => {
                let t = match op {
                    AddSub::Add => InstructionType::ADDA,
                    AddSub::Sub => InstructionType::SUBA,
                };
                let (sf, sext) = src.encode(*size);
                let s = u16::from(*size == Size::Long);
                out(
                    format(t).build(&[dst.data() as u16, s, sf >> 3, sf & 7]),
                    &[&sext],
                );
            }
            Instruction::Quick { op, size, data, dst } => {
                let t = match op {
                    AddSub::Add => InstructionType::ADDQ,
                    AddSub::Sub => InstructionType::SUBQ,
                };
                let (df, dext) = dst.encode(*size);
                out(
                    format(t).build(&[u16::from(*data) & 7, size_bits(*size), df >> 3, df & 7]),
                    &[&dext],
                );
            }
            Instruction::Eor { size, src, dst } => {
                let (df, dext) = dst.encode(*size);
                out(
                    format(InstructionType::EOR).build(&[
                        src.data() as u16,
                        size_bits(*size),
                        df >> 3,
                        df & 7,
                    ]),
                    &[&dext],
                );
            }
            Instruction::Cmp { size, src, dst } => {
                let (sf, sext) = src.encode(*size);
                out(
                    format(InstructionType::CMP).build(&[
                        dst.data() as u16,
                        size_bits(*size),
                        sf >> 3,
                        sf & 7,
                    ]),
                    &[&sext],
                );
            }
            Instruction::Cmpi { size, src, dst } => {
                let (_, sext) = src.encode(*size);
                let (df, dext) = dst.encode(*size);
                out(
                    format(InstructionType::CMPI).build(&[size_bits(*size), df >> 3, df & 7]),
                    &[&sext, &dext],
                );
            }
            Instruction::Neg { size, dst } => {
                let (df, dext) = dst.encode(*size);
                out(
                    format(InstructionType::NEG).build(&[size_bits(*size), df >> 3, df & 7]),
                    &[&dext],
                );
            }
            Instruction::Lea { src, dst } => {
                let (sf, sext) = src.encode(Size::Long);
                out(
                    format(InstructionType::LEA).build(&[dst.data() as u16, sf >> 3, sf & 7]),
                    &[&sext],
                );
            }
            Instruction::Jsr { target } => {
                let (tf, text) = target.encode(Size::Long);
                out(format(InstructionType::JSR).build(&[tf >> 3, tf & 7]), &[&text]);
            }
            Instruction::Rts => out(format(InstructionType::RTS).build(&[]), &[]),
            Instruction::Nop => out(format(InstructionType::NOP).build(&[]), &[]),
            Instruction::Trap { vector } => out(
                format(InstructionType::TRAP).build(&[u16::from(*vector)]),
                &[],
            ),
            Instruction::Branch {
                cond,
                target,
                disp_size,
            } => return encode_branch(*cond as u16, addr, *target, *disp_size),
            Instruction::Bsr { target, disp_size } => {
                return encode_branch(1, addr, *target, *disp_size)
            }
            Instruction::Simhalt => out(0xFFFF, &[&[0xFFFF]]),
            Instruction::Dc { .. } => bail!("DC has no instruction encoding"),
        }
        Ok(words)
    }

    /// Encodes the instruction (or data) as it would be placed at `addr`,
    /// as big-endian bytes.
    pub fn assemble(&self, addr: Address) -> Result<Vec<u8>> {
        if let Instruction::Dc { data, .. } = self {
            return Ok(data.clone());
        }
        Ok(self
            .assemble_words(addr)
            .with_context(|| format!("Cannot assemble {} at ${:06X}", self, addr))?
            .into_iter()
            .flat_map(u16::to_be_bytes)
            .collect())
    }

    /// Length of the instruction in 16-bit words, including extension words.
    /// Data is rounded up to a whole word.
    pub fn word_length(&self) -> usize {
        let ext = |ops: &[(&Operand, Size)]| -> usize {
            ops.iter().map(|(o, s)| o.ext_words(*s)).sum()
        };
        1 + match self {
            Instruction::Move { size, src, dst }
            | Instruction::Arith { size, src, dst, .. }
            | Instruction::Eor { size, src, dst }
            | Instruction::Cmp { size, src, dst }
            | Instruction::Cmpi { size, src, dst }
            | Instruction::Movea { size, src, dst }
            | Instruction::ArithA { size, src, dst, .. } => ext(&[(src, *size), (dst, *size)]),
            Instruction::Quick { size, dst, .. } | Instruction::Neg { size, dst } => {
                ext(&[(dst, *size)])
            }
            Instruction::Lea { src, .. } => ext(&[(src, Size::Long)]),
            Instruction::Jsr { target } => ext(&[(target, Size::Long)]),
            Instruction::Rts | Instruction::Nop | Instruction::Trap { .. } => 0,
            Instruction::Branch { disp_size, .. } | Instruction::Bsr { disp_size, .. } => {
                match disp_size {
                    Size::Byte => 0,
                    Size::Word => 1,
                    Size::Long => 2,
                }
            }
            Instruction::Simhalt => 1,
            Instruction::Dc { data, .. } => return (data.len() + 1) / 2,
        }
    }

    /// Length of the instruction in bytes.
    pub fn byte_length(&self) -> usize {
        match self {
            Instruction::Dc { data, .. } => data.len(),
            _ => self.word_length() * 2,
        }
    }

    /// Operation size, where applicable.
    pub fn size(&self) -> Option<Size> {
        match self {
            Instruction::Move { size, .. }
            | Instruction::Movea { size, .. }
            | Instruction::Arith { size, .. }
            | Instruction::ArithA { size, .. }
            | Instruction::Quick { size, .. }
            | Instruction::Eor { size, .. }
            | Instruction::Cmp { size, .. }
            | Instruction::Cmpi { size, .. }
            | Instruction::Neg { size, .. }
            | Instruction::Dc { size, .. } => Some(*size),
            Instruction::Lea { .. } => Some(Size::Long),
            _ => None,
        }
    }

    /// Mnemonic without size suffix.
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Instruction::Move { .. } => "MOVE",
            Instruction::Movea { .. } => "MOVEA",
            Instruction::Arith { op, .. } => match op {
                ArithOp::Add => "ADD",
                ArithOp::Sub => "SUB",
                ArithOp::And => "AND",
                ArithOp::Or => "OR",
            },
            Instruction::ArithA { op: AddSub::Add, .. } => "ADDA",
            Instruction::ArithA { op: AddSub::Sub, .. } => "SUBA",
            Instruction::Quick { op: AddSub::Add, .. } => "ADDQ",
            Instruction::Quick { op: AddSub::Sub, .. } => "SUBQ",
            Instruction::Eor { .. } => "EOR",
            Instruction::Cmp { .. } => "CMP",
            Instruction::Cmpi { .. } => "CMPI",
            Instruction::Neg { .. } => "NEG",
            Instruction::Lea { .. } => "LEA",
            Instruction::Jsr { .. } => "JSR",
            Instruction::Rts => "RTS",
            Instruction::Nop => "NOP",
            Instruction::Trap { .. } => "TRAP",
            Instruction::Branch { cond, .. } => BRANCH_MNEMONICS[*cond as usize],
            Instruction::Bsr { .. } => "BSR",
            Instruction::Simhalt => "SIMHALT",
            Instruction::Dc { .. } => "DC",
        }
    }

    /// Checks the operands against the addressing modes, sizes and
    /// ranges the instruction allows.
    pub fn validate(&self) -> Vec<Issue> {
        let mut issues = vec![];
        let mnemonic = self.mnemonic();

        let checks: Vec<(&str, &Operand, &[EaMode])> = match self {
            Instruction::Move { src, dst, .. } => vec![
                ("Source", src, MODES_DATA),
                ("Destination", dst, MODES_DATA_ALTERABLE),
            ],
            Instruction::Movea { src, dst, .. } => vec![
                ("Source", src, MODES_DATA),
                ("Destination", dst, MODES_ADDRESS_REGISTER),
            ],
            Instruction::ArithA { src, dst, .. } => vec![
                ("Source", src, MODES_ALL),
                ("Destination", dst, MODES_ADDRESS_REGISTER),
            ],
            Instruction::Arith { op, src, dst, .. } => {
                let src_modes = match op {
                    ArithOp::Add | ArithOp::Sub => MODES_ALL,
                    ArithOp::And | ArithOp::Or => MODES_DATA,
                };
                if dst.mode() == EaMode::DataDirect {
                    vec![("Source", src, src_modes)]
                } else {
                    vec![
                        ("Source", src, MODES_DATA_REGISTER),
                        ("Destination", dst, MODES_MEMORY_ALTERABLE),
                    ]
                }
            }
            Instruction::Quick { data, dst, .. } => {
                if !(1..=8).contains(data) {
                    issues.push(Issue::error(format!("Quick data {} not in 1 - 8", data)));
                }
                vec![("Destination", dst, MODES_ALTERABLE)]
            }
            Instruction::Eor { src, dst, .. } => vec![
                ("Source", src, MODES_DATA_REGISTER),
                ("Destination", dst, MODES_DATA_ALTERABLE),
            ],
            Instruction::Cmp { src, dst, .. } => vec![
                ("Source", src, MODES_ALL),
                ("Destination", dst, MODES_DATA_REGISTER),
            ],
            Instruction::Cmpi { src, dst, .. } => vec![
                ("Source", src, MODES_IMMEDIATE),
                ("Destination", dst, MODES_DATA_ALTERABLE),
            ],
            Instruction::Neg { dst, .. } => vec![("Destination", dst, MODES_DATA_ALTERABLE)],
            Instruction::Lea { src, dst } => vec![
                ("Source", src, MODES_CONTROL),
                ("Destination", dst, MODES_ADDRESS_REGISTER),
            ],
            Instruction::Jsr { target } => vec![("Target", target, MODES_CONTROL)],
            Instruction::Trap { vector } => {
                if *vector > 15 {
                    issues.push(Issue::error(format!("Trap vector {} not in 0 - 15", vector)));
                }
                vec![]
            }
            Instruction::Branch { target, .. } | Instruction::Bsr { target, .. } => {
                if target % 2 != 0 {
                    issues.push(Issue::error(format!(
                        "Branch target ${:06X} is not word aligned",
                        target
                    )));
                }
                if *target >= ADDRESS_SPACE {
                    issues.push(Issue::error(format!(
                        "Branch target ${:X} outside of address space",
                        target
                    )));
                }
                vec![]
            }
            Instruction::Rts | Instruction::Nop | Instruction::Simhalt | Instruction::Dc { .. } => {
                vec![]
            }
        };

        for (what, op, allowed) in checks {
            if !allowed.contains(&op.mode()) {
                issues.push(Issue::error(format!(
                    "{} operand {} of {} cannot be {}",
                    what,
                    op,
                    mnemonic,
                    op.mode()
                )));
            }
        }

        if let Some(size) = self.size() {
            match self {
                Instruction::Movea { .. } | Instruction::ArithA { .. } if size == Size::Byte => {
                    issues.push(Issue::error(format!("{} cannot be byte sized", mnemonic)));
                }
                _ => (),
            }
            for op in self.operands() {
                if size == Size::Byte && op.mode() == EaMode::AddressDirect {
                    issues.push(Issue::error(format!(
                        "{} cannot access {} as a byte",
                        mnemonic, op
                    )));
                }
                if op.mode() == EaMode::Immediate && Value::from_any(size, op.data()).is_err() {
                    issues.push(Issue::error(format!(
                        "Immediate {} does not fit {}",
                        op.data(),
                        size
                    )));
                }
            }
        }

        for op in self.operands() {
            if op.mode() == EaMode::AbsoluteWord && op.data() > 0xFFFF {
                issues.push(Issue::warning(format!(
                    "Absolute word address ${:X} is truncated to 16 bits",
                    op.data()
                )));
            }
        }

        issues
    }

    /// True if no error-level issues are found.
    pub fn is_valid(&self) -> bool {
        self.validate().iter().all(|i| i.severity != Severity::Error)
    }

    /// Brings immediates into the unsigned form at the operation size,
    /// the form `decode` produces.
    pub fn normalized(mut self) -> Self {
        match &mut self {
            Instruction::Move { size, src, dst }
            | Instruction::Movea { size, src, dst }
            | Instruction::Arith { size, src, dst, .. }
            | Instruction::ArithA { size, src, dst, .. }
            | Instruction::Eor { size, src, dst }
            | Instruction::Cmp { size, src, dst }
            | Instruction::Cmpi { size, src, dst } => {
                *src = src.sized(*size);
                *dst = dst.sized(*size);
            }
            Instruction::Quick { size, dst, .. } | Instruction::Neg { size, dst } => {
                *dst = dst.sized(*size);
            }
            _ => (),
        }
        self
    }

    /// Effective-address operands, in encoding order.
    pub fn operands(&self) -> Vec<&Operand> {
        match self {
            Instruction::Move { src, dst, .. }
            | Instruction::Movea { src, dst, .. }
            | Instruction::Arith { src, dst, .. }
            | Instruction::ArithA { src, dst, .. }
            | Instruction::Eor { src, dst, .. }
            | Instruction::Cmp { src, dst, .. }
            | Instruction::Cmpi { src, dst, .. }
            | Instruction::Lea { src, dst } => vec![src, dst],
            Instruction::Quick { dst, .. } | Instruction::Neg { dst, .. } => vec![dst],
            Instruction::Jsr { target } => vec![target],
            _ => vec![],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let m = self.mnemonic();
        match self {
            Instruction::Move { size, src, dst }
            | Instruction::Movea { size, src, dst }
            | Instruction::Arith { size, src, dst, .. }
            | Instruction::ArithA { size, src, dst, .. }
            | Instruction::Eor { size, src, dst }
            | Instruction::Cmp { size, src, dst }
            | Instruction::Cmpi { size, src, dst } => {
                write!(f, "{}{} {},{}", m, size.suffix(), src, dst)
            }
            Instruction::Quick {
                size, data, dst, ..
            } => write!(f, "{}{} #{},{}", m, size.suffix(), data, dst),
            Instruction::Neg { size, dst } => write!(f, "{}{} {}", m, size.suffix(), dst),
            Instruction::Lea { src, dst } => write!(f, "{} {},{}", m, src, dst),
            Instruction::Jsr { target } => write!(f, "{} {}", m, target),
            Instruction::Trap { vector } => write!(f, "{} #{}", m, vector),
            Instruction::Branch {
                target, disp_size, ..
            }
            | Instruction::Bsr { target, disp_size } => {
                let suffix = if *disp_size == Size::Byte {
                    ".S"
                } else {
                    disp_size.suffix()
                };
                write!(f, "{}{} ${:06X}", m, suffix, target)
            }
            Instruction::Rts | Instruction::Nop | Instruction::Simhalt => write!(f, "{}", m),
            Instruction::Dc { size, data } => {
                let items = data
                    .chunks(size.bytes() as usize)
                    .map(|c| format!("${}", c.iter().map(|b| format!("{:02X}", b)).join("")))
                    .join(",");
                write!(f, "{}{} {}", m, size.suffix(), items)
            }
        }
    }
}
