use std::fmt;

use anyhow::{bail, Result};
use num_derive::ToPrimitive;
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, IntoEnumIterator};

use super::value::{Size, Value};
use crate::bus::{Address, ADDRESS_MASK};

/// Initial value of the stack pointer (A7).
pub const DEFAULT_STACK_POINTER: u32 = 0x00FF_FFFC;

/// Bit positions of the flags in the CCR register.
#[derive(EnumIter, ToPrimitive, Debug, Copy, Clone, Display, Eq, PartialEq)]
pub enum Flag {
    /// Extend
    X = 4,
    /// Negative
    N = 3,
    /// Zero
    Z = 2,
    /// Overflow
    V = 1,
    /// Carry
    C = 0,
}

/// Mask of the implemented CCR bits.
const CCR_MASK: u8 = 0x1F;

/// Enumeration of registers
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display)]
pub enum Register {
    D0,
    D1,
    D2,
    D3,
    D4,
    D5,
    D6,
    D7,
    A0,
    A1,
    A2,
    A3,
    A4,
    A5,
    A6,
    /// Stack pointer
    A7,
    /// Program counter
    PC,
    /// Condition code register
    CCR,
}

impl Register {
    const DATA: [Register; 8] = [
        Register::D0,
        Register::D1,
        Register::D2,
        Register::D3,
        Register::D4,
        Register::D5,
        Register::D6,
        Register::D7,
    ];
    const ADDRESS: [Register; 8] = [
        Register::A0,
        Register::A1,
        Register::A2,
        Register::A3,
        Register::A4,
        Register::A5,
        Register::A6,
        Register::A7,
    ];

    /// Data register Dn
    pub fn data(n: u8) -> Option<Register> {
        Self::DATA.get(n as usize).copied()
    }

    /// Address register An
    pub fn address(n: u8) -> Option<Register> {
        Self::ADDRESS.get(n as usize).copied()
    }
}

/// Complete CPU register file
#[derive(Debug, Eq, PartialEq, Clone, Serialize, Deserialize)]
pub struct RegisterFile {
    /// Data registers D0 - D7
    pub d: [u32; 8],

    /// Address registers A0 - A7. A7 is the stack pointer.
    pub a: [u32; 8],

    /// Program Counter (PC)
    pub pc: Address,

    /// Condition codes, low 5 bits: XNZVC.
    pub ccr: u8,
}

impl RegisterFile {
    pub fn from_pc(pc: Address) -> Self {
        let mut a = [0; 8];
        a[7] = DEFAULT_STACK_POINTER;
        Self {
            d: [0; 8],
            a,
            pc,
            ccr: 0,
        }
    }

    pub fn new() -> Self {
        Self::from_pc(0)
    }

    /// Read a full register.
    pub fn read(&self, reg: Register) -> Value {
        match reg {
            Register::D0
            | Register::D1
            | Register::D2
            | Register::D3
            | Register::D4
            | Register::D5
            | Register::D6
            | Register::D7 => Value::truncate(Size::Long, self.d[Self::index(reg)]),
            Register::A0
            | Register::A1
            | Register::A2
            | Register::A3
            | Register::A4
            | Register::A5
            | Register::A6
            | Register::A7 => Value::truncate(Size::Long, self.a[Self::index(reg)]),
            Register::PC => Value::truncate(Size::Long, self.pc),
            Register::CCR => Value::truncate(Size::Byte, self.ccr.into()),
        }
    }

    /// Write a full register. Narrower values are zero-extended.
    /// Returns an error when the PC would leave the address space.
    pub fn write(&mut self, reg: Register, val: Value) -> Result<()> {
        let v = val.as_unsigned();
        match reg {
            Register::PC => self.set_pc(v)?,
            Register::CCR => self.ccr = v as u8 & CCR_MASK,
            Register::A0
            | Register::A1
            | Register::A2
            | Register::A3
            | Register::A4
            | Register::A5
            | Register::A6
            | Register::A7 => self.a[Self::index(reg)] = v,
            _ => self.d[Self::index(reg)] = v,
        }
        Ok(())
    }

    /// Writes the low bits of a register covered by the value's width,
    /// leaving the remaining high-order bits untouched.
    pub fn write_low(&mut self, reg: Register, val: Value) -> Result<()> {
        let mask = val.size().mask();
        let old = self.read(reg).as_unsigned();
        self.write(
            reg,
            Value::truncate(Size::Long, (old & !mask) | val.as_unsigned()),
        )
    }

    /// Sets the program counter, validating it against the address space.
    pub fn set_pc(&mut self, pc: u32) -> Result<()> {
        if pc & !ADDRESS_MASK != 0 {
            bail!("PC ${:08X} outside of address space", pc);
        }
        self.pc = pc;
        Ok(())
    }

    /// Index of a data or address register within its bank.
    fn index(reg: Register) -> usize {
        match reg {
            Register::D0 | Register::A0 => 0,
            Register::D1 | Register::A1 => 1,
            Register::D2 | Register::A2 => 2,
            Register::D3 | Register::A3 => 3,
            Register::D4 | Register::A4 => 4,
            Register::D5 | Register::A5 => 5,
            Register::D6 | Register::A6 => 6,
            Register::D7 | Register::A7 => 7,
            Register::PC | Register::CCR => unreachable!(),
        }
    }

    /// Test a flag in the CCR.
    pub fn test_flag(&self, f: Flag) -> bool {
        self.ccr & (1u8 << f.to_u8().unwrap()) != 0
    }

    /// Clear and write the flags in the CCR.
    pub fn write_flags(&mut self, flag_val: &[(Flag, bool)]) {
        let mut p: u8 = self.ccr;
        for &(b, on) in flag_val {
            let bit = 1u8 << b.to_u8().unwrap();
            p &= !bit;
            if on {
                p |= bit;
            }
        }
        self.ccr = p;
    }
}

impl Default for RegisterFile {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RegisterFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let flags = Flag::iter()
            .map(|fl| {
                let fc = fl.to_string().chars().next().unwrap_or('?');
                if self.test_flag(fl) {
                    fc.to_ascii_uppercase()
                } else {
                    fc.to_ascii_lowercase()
                }
            })
            .collect::<String>();

        for (i, d) in self.d.iter().enumerate() {
            write!(f, "D{}:{:08X} ", i, d)?;
        }
        writeln!(f)?;
        for (i, a) in self.a.iter().enumerate() {
            write!(f, "A{}:{:08X} ", i, a)?;
        }
        write!(f, "\nPC:{:06X} CCR:{:02X} ({})", self.pc, self.ccr, flags)
    }
}
