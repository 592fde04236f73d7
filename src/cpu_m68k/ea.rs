use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use arrayvec::ArrayVec;
use strum::{Display, EnumIter};
use thiserror::Error;

use super::regs::{Register, RegisterFile};
use super::value::{Size, Value};
use crate::bus::{Address, Bus, ADDRESS_SPACE};
use crate::util::parse_literal;

/// Effective addressing modes supported by the assembler and CPU.
#[derive(EnumIter, Display, Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum EaMode {
    /// Dn
    DataDirect,
    /// An
    AddressDirect,
    /// (An)
    Indirect,
    /// (An)+
    PostIncrement,
    /// -(An)
    PreDecrement,
    /// (xxx).W
    AbsoluteWord,
    /// (xxx).L
    AbsoluteLong,
    /// #xxx
    Immediate,
}

/// Every supported mode.
pub const MODES_ALL: &[EaMode] = &[
    EaMode::DataDirect,
    EaMode::AddressDirect,
    EaMode::Indirect,
    EaMode::PostIncrement,
    EaMode::PreDecrement,
    EaMode::AbsoluteWord,
    EaMode::AbsoluteLong,
    EaMode::Immediate,
];
/// Every mode except An.
pub const MODES_DATA: &[EaMode] = &[
    EaMode::DataDirect,
    EaMode::Indirect,
    EaMode::PostIncrement,
    EaMode::PreDecrement,
    EaMode::AbsoluteWord,
    EaMode::AbsoluteLong,
    EaMode::Immediate,
];
/// Every mode except An and immediate.
pub const MODES_DATA_ALTERABLE: &[EaMode] = &[
    EaMode::DataDirect,
    EaMode::Indirect,
    EaMode::PostIncrement,
    EaMode::PreDecrement,
    EaMode::AbsoluteWord,
    EaMode::AbsoluteLong,
];
/// Memory modes except immediate.
pub const MODES_MEMORY_ALTERABLE: &[EaMode] = &[
    EaMode::Indirect,
    EaMode::PostIncrement,
    EaMode::PreDecrement,
    EaMode::AbsoluteWord,
    EaMode::AbsoluteLong,
];
/// Every mode except immediate.
pub const MODES_ALTERABLE: &[EaMode] = &[
    EaMode::DataDirect,
    EaMode::AddressDirect,
    EaMode::Indirect,
    EaMode::PostIncrement,
    EaMode::PreDecrement,
    EaMode::AbsoluteWord,
    EaMode::AbsoluteLong,
];
/// Modes that denote an address without side effects.
pub const MODES_CONTROL: &[EaMode] = &[
    EaMode::Indirect,
    EaMode::AbsoluteWord,
    EaMode::AbsoluteLong,
];

impl EaMode {
    /// The 3-bit mode field.
    pub const fn mode_bits(&self) -> u16 {
        match self {
            EaMode::DataDirect => 0,
            EaMode::AddressDirect => 1,
            EaMode::Indirect => 2,
            EaMode::PostIncrement => 3,
            EaMode::PreDecrement => 4,
            EaMode::AbsoluteWord | EaMode::AbsoluteLong | EaMode::Immediate => 7,
        }
    }

    /// Whether the data is a register number.
    pub const fn is_register(&self) -> bool {
        !matches!(
            self,
            EaMode::AbsoluteWord | EaMode::AbsoluteLong | EaMode::Immediate
        )
    }
}

/// Whether an operand is read or written by the instruction.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Role {
    Source,
    Destination,
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum OperandError {
    #[error("Register number {0} out of range")]
    Register(i64),
    #[error("Absolute address {0} outside of address space")]
    Address(i64),
    #[error("Immediate value {0} out of range")]
    Immediate(i64),
    #[error("{0} operand is not writable")]
    NotWritable(EaMode),
    #[error("{0} operand has no effective address")]
    NoAddress(EaMode),
    #[error("Cannot parse operand '{0}'")]
    Syntax(String),
}

/// A single effective-address operand: a mode and its data, being a
/// register number, a literal or an absolute address.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Operand {
    mode: EaMode,
    data: i64,
}

impl Operand {
    /// Creates an operand, validating the data against the mode.
    pub fn new(mode: EaMode, data: i64) -> Result<Self, OperandError> {
        match mode {
            _ if mode.is_register() => {
                if !(0..=7).contains(&data) {
                    return Err(OperandError::Register(data));
                }
            }
            EaMode::AbsoluteWord | EaMode::AbsoluteLong => {
                if !(0..i64::from(ADDRESS_SPACE)).contains(&data) {
                    return Err(OperandError::Address(data));
                }
            }
            EaMode::Immediate => {
                if !(-(1i64 << 31)..(1i64 << 32)).contains(&data) {
                    return Err(OperandError::Immediate(data));
                }
            }
            _ => unreachable!(),
        }
        Ok(Self { mode, data })
    }

    pub fn data_reg(n: u8) -> Result<Self, OperandError> {
        Self::new(EaMode::DataDirect, n.into())
    }

    pub fn addr_reg(n: u8) -> Result<Self, OperandError> {
        Self::new(EaMode::AddressDirect, n.into())
    }

    pub fn indirect(n: u8) -> Result<Self, OperandError> {
        Self::new(EaMode::Indirect, n.into())
    }

    pub fn post_inc(n: u8) -> Result<Self, OperandError> {
        Self::new(EaMode::PostIncrement, n.into())
    }

    pub fn pre_dec(n: u8) -> Result<Self, OperandError> {
        Self::new(EaMode::PreDecrement, n.into())
    }

    pub fn immediate(val: i64) -> Result<Self, OperandError> {
        Self::new(EaMode::Immediate, val)
    }

    pub fn abs_word(addr: Address) -> Result<Self, OperandError> {
        Self::new(EaMode::AbsoluteWord, addr.into())
    }

    pub fn abs_long(addr: Address) -> Result<Self, OperandError> {
        Self::new(EaMode::AbsoluteLong, addr.into())
    }

    pub const fn mode(&self) -> EaMode {
        self.mode
    }

    pub const fn data(&self) -> i64 {
        self.data
    }

    /// The operand as it reads at `size`: immediates in range take the
    /// unsigned form the decoder produces, so `#-1` and `#$FF` are equal
    /// bytes. Everything else is returned unchanged.
    pub fn sized(self, size: Size) -> Self {
        match (self.mode, Value::from_any(size, self.data)) {
            (EaMode::Immediate, Ok(v)) => Self {
                data: v.as_unsigned().into(),
                ..self
            },
            _ => self,
        }
    }

    /// Register number for register modes.
    fn reg(&self) -> usize {
        debug_assert!(self.mode.is_register());
        self.data as usize
    }

    /// The register this operand addresses directly, if any.
    fn register(&self) -> Option<Register> {
        match self.mode {
            EaMode::DataDirect => Register::data(self.data as u8),
            EaMode::AddressDirect => Register::address(self.data as u8),
            _ => None,
        }
    }

    /// Address register step for (An)+ and -(An). A7 stays word aligned.
    fn step(&self, size: Size) -> u32 {
        if self.data == 7 && size == Size::Byte {
            2
        } else {
            size.bytes()
        }
    }

    /// Resolves the memory address of a memory operand. Applies the
    /// pre-decrement but not the post-increment; returns the value
    /// the address register takes after the access, if it changes.
    fn memory_address(&self, regs: &RegisterFile, size: Size) -> (Address, Option<u32>) {
        match self.mode {
            EaMode::Indirect => (regs.a[self.reg()], None),
            EaMode::PostIncrement => {
                let an = regs.a[self.reg()];
                (an, Some(an.wrapping_add(self.step(size))))
            }
            EaMode::PreDecrement => {
                let an = regs.a[self.reg()].wrapping_sub(self.step(size));
                (an, Some(an))
            }
            EaMode::AbsoluteWord => (self.data as Address & 0xFFFF, None),
            EaMode::AbsoluteLong => (self.data as Address, None),
            _ => unreachable!(),
        }
    }

    /// Reads the operand at the given width.
    ///
    /// (An)+ and -(An) update the address register once the memory
    /// access has succeeded.
    pub fn fetch(&self, regs: &mut RegisterFile, bus: &impl Bus, size: Size) -> Result<Value> {
        if let Some(reg) = self.register() {
            return Ok(regs.read(reg).resize(size));
        }
        match self.mode {
            EaMode::Immediate => Ok(Value::truncate(size, self.data as u32)),
            _ => {
                let (addr, update) = self.memory_address(regs, size);
                let val = bus.read_value(addr, size)?;
                if let Some(an) = update {
                    regs.a[self.reg()] = an;
                }
                Ok(val)
            }
        }
    }

    /// Writes a value through the operand.
    ///
    /// Dn keeps the bits above the value's width, An is written
    /// completely with the value sign-extended.
    pub fn store(&self, regs: &mut RegisterFile, bus: &mut impl Bus, val: Value) -> Result<()> {
        if let Some(reg) = self.register() {
            return match self.mode {
                EaMode::AddressDirect => regs.write(reg, val.sign_extend(Size::Long)),
                _ => regs.write_low(reg, val),
            };
        }
        match self.mode {
            EaMode::Immediate => return Err(OperandError::NotWritable(self.mode).into()),
            _ => {
                let (addr, update) = self.memory_address(regs, val.size());
                bus.write_value(addr, val)?;
                if let Some(an) = update {
                    regs.a[self.reg()] = an;
                }
            }
        }
        Ok(())
    }

    /// Read-modify-write access. The address is resolved once, so (An)+
    /// and -(An) step the register a single time. `f` maps the old value
    /// to the value to store and an arbitrary result.
    pub fn modify<T>(
        &self,
        regs: &mut RegisterFile,
        bus: &mut impl Bus,
        size: Size,
        f: impl FnOnce(Value) -> (Value, T),
    ) -> Result<T> {
        match self.mode {
            EaMode::Immediate => Err(OperandError::NotWritable(self.mode).into()),
            EaMode::DataDirect | EaMode::AddressDirect => {
                let (val, out) = f(self.fetch(regs, &*bus, size)?);
                self.store(regs, bus, val)?;
                Ok(out)
            }
            _ => {
                let (addr, update) = self.memory_address(regs, size);
                let (val, out) = f(bus.read_value(addr, size)?);
                bus.write_value(addr, val)?;
                if let Some(an) = update {
                    regs.a[self.reg()] = an;
                }
                Ok(out)
            }
        }
    }

    /// The address a control-mode operand denotes, without accessing memory.
    pub fn effective_address(&self, regs: &RegisterFile) -> Result<Address, OperandError> {
        match self.mode {
            EaMode::Indirect | EaMode::AbsoluteWord | EaMode::AbsoluteLong => {
                Ok(self.memory_address(regs, Size::Long).0)
            }
            _ => Err(OperandError::NoAddress(self.mode)),
        }
    }

    /// Amount of extension words following the instruction word.
    pub const fn ext_words(&self, size: Size) -> usize {
        match self.mode {
            EaMode::AbsoluteWord => 1,
            EaMode::AbsoluteLong => 2,
            EaMode::Immediate => size.immediate_words(),
            _ => 0,
        }
    }

    /// Register field of the 6-bit effective address.
    const fn reg_bits(&self) -> u16 {
        match self.mode {
            EaMode::AbsoluteWord => 0,
            EaMode::AbsoluteLong => 1,
            EaMode::Immediate => 4,
            _ => self.data as u16,
        }
    }

    /// Encodes the operand as a 6-bit `mode << 3 | reg` field and its
    /// extension words.
    pub fn encode(&self, size: Size) -> (u16, ArrayVec<u16, 2>) {
        (self.mode.mode_bits() << 3 | self.reg_bits(), self.extension(size))
    }

    /// Encodes the operand as a 6-bit `reg << 3 | mode` field, as
    /// used by the destination of MOVE.
    pub fn encode_swapped(&self, size: Size) -> (u16, ArrayVec<u16, 2>) {
        (self.reg_bits() << 3 | self.mode.mode_bits(), self.extension(size))
    }

    fn extension(&self, size: Size) -> ArrayVec<u16, 2> {
        let mut ext = ArrayVec::new();
        let long = |ext: &mut ArrayVec<u16, 2>, v: u32| {
            ext.push((v >> 16) as u16);
            ext.push(v as u16);
        };
        match self.mode {
            EaMode::AbsoluteWord => ext.push(self.data as u16),
            EaMode::AbsoluteLong => long(&mut ext, self.data as u32),
            EaMode::Immediate => match size {
                Size::Byte => ext.push(self.data as u16 & 0xFF),
                Size::Word => ext.push(self.data as u16),
                Size::Long => long(&mut ext, self.data as u32),
            },
            _ => (),
        }
        ext
    }

    /// Decodes an effective address from its mode and register fields,
    /// consuming extension words from the stream.
    ///
    /// Returns the operand and the amount of extension words consumed,
    /// or None if the mode is invalid for the role or the stream ends.
    pub fn decode(
        mode: u16,
        reg: u16,
        size: Size,
        role: Role,
        stream: &mut impl Iterator<Item = u16>,
    ) -> Option<(Operand, usize)> {
        let reg = reg & 7;
        let regmode = |m| Some((Operand { mode: m, data: reg.into() }, 0usize));
        match (mode & 7, reg) {
            (0, _) => regmode(EaMode::DataDirect),
            (1, _) => regmode(EaMode::AddressDirect),
            (2, _) => regmode(EaMode::Indirect),
            (3, _) => regmode(EaMode::PostIncrement),
            (4, _) => regmode(EaMode::PreDecrement),
            (7, 0) => {
                let w = stream.next()?;
                Some((Operand::abs_word(w.into()).ok()?, 1))
            }
            (7, 1) => {
                let hi = stream.next()?;
                let lo = stream.next()?;
                let addr = u32::from(hi) << 16 | u32::from(lo);
                Some((Operand::abs_long(addr).ok()?, 2))
            }
            (7, 4) if role == Role::Source => match size {
                Size::Byte => Some((Operand::immediate(i64::from(stream.next()? & 0xFF)).ok()?, 1)),
                Size::Word => Some((Operand::immediate(stream.next()?.into()).ok()?, 1)),
                Size::Long => {
                    let hi = stream.next()?;
                    let lo = stream.next()?;
                    let val = u32::from(hi) << 16 | u32::from(lo);
                    Some((Operand::immediate(val.into()).ok()?, 2))
                }
            },
            _ => None,
        }
    }
}

/// Parses a register name: Dn, An or SP.
fn parse_register(s: &str) -> Option<(EaMode, u8)> {
    let s = s.trim().to_ascii_uppercase();
    if s == "SP" {
        return Some((EaMode::AddressDirect, 7));
    }
    let mut chars = s.chars();
    let mode = match chars.next()? {
        'D' => EaMode::DataDirect,
        'A' => EaMode::AddressDirect,
        _ => return None,
    };
    let n = chars.as_str().parse::<u8>().ok().filter(|&n| n <= 7)?;
    if chars.as_str().len() != 1 {
        return None;
    }
    Some((mode, n))
}

/// Parses an address register in parentheses: (An) or (SP).
fn parse_indirect(s: &str) -> Option<u8> {
    let inner = s.strip_prefix('(')?.strip_suffix(')')?;
    match parse_register(inner)? {
        (EaMode::AddressDirect, n) => Some(n),
        _ => None,
    }
}

impl FromStr for Operand {
    type Err = OperandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let syntax = || OperandError::Syntax(s.to_string());
        let literal = |l: &str| parse_literal(l).ok_or_else(syntax);
        let upper = s.to_ascii_uppercase();

        if let Some((mode, n)) = parse_register(s) {
            return Self::new(mode, n.into());
        }
        if let Some(imm) = s.strip_prefix('#') {
            return Self::immediate(literal(imm)?);
        }
        if let Some(n) = s.strip_prefix('-').and_then(parse_indirect) {
            return Self::pre_dec(n);
        }
        if let Some(n) = s.strip_suffix('+').and_then(parse_indirect) {
            return Self::post_inc(n);
        }
        if let Some(n) = parse_indirect(s) {
            return Self::indirect(n);
        }
        if upper.starts_with('(') && upper.ends_with(").W") {
            return Self::new(EaMode::AbsoluteWord, literal(&s[1..s.len() - 3])?);
        }
        if upper.starts_with('(') && upper.ends_with(").L") {
            return Self::new(EaMode::AbsoluteLong, literal(&s[1..s.len() - 3])?);
        }

        // Bare absolute address
        let addr = literal(s)?;
        if (0..=0xFFFF).contains(&addr) {
            Self::new(EaMode::AbsoluteWord, addr)
        } else {
            Self::new(EaMode::AbsoluteLong, addr)
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.mode {
            EaMode::DataDirect => write!(f, "D{}", self.data),
            EaMode::AddressDirect => write!(f, "A{}", self.data),
            EaMode::Indirect => write!(f, "(A{})", self.data),
            EaMode::PostIncrement => write!(f, "(A{})+", self.data),
            EaMode::PreDecrement => write!(f, "-(A{})", self.data),
            EaMode::AbsoluteWord => write!(f, "(${:04X}).W", self.data),
            EaMode::AbsoluteLong => write!(f, "(${:06X}).L", self.data),
            EaMode::Immediate if self.data < 0 => write!(f, "#-${:X}", -self.data),
            EaMode::Immediate => write!(f, "#${:X}", self.data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testbus::Testbus;
    use crate::bus::BusError;
    use crate::cpu_m68k::regs::DEFAULT_STACK_POINTER;

    fn op(s: &str) -> Operand {
        s.parse().unwrap()
    }

    #[test]
    fn constructor_ranges() {
        assert!(Operand::data_reg(7).is_ok());
        assert_eq!(Operand::data_reg(8), Err(OperandError::Register(8)));
        assert!(Operand::abs_long(0xFF_FFFF).is_ok());
        assert_eq!(
            Operand::abs_long(0x100_0000),
            Err(OperandError::Address(0x100_0000))
        );
        assert!(Operand::immediate(-(1 << 31)).is_ok());
        assert!(Operand::immediate(0xFFFF_FFFF).is_ok());
        assert!(Operand::immediate(1 << 32).is_err());
        assert!(Operand::immediate(-(1 << 31) - 1).is_err());
    }

    #[test]
    fn parse() {
        assert_eq!(op("D3"), Operand::data_reg(3).unwrap());
        assert_eq!(op("a7"), Operand::addr_reg(7).unwrap());
        assert_eq!(op("SP"), Operand::addr_reg(7).unwrap());
        assert_eq!(op("(A2)"), Operand::indirect(2).unwrap());
        assert_eq!(op("(sp)+"), Operand::post_inc(7).unwrap());
        assert_eq!(op("-(A1)"), Operand::pre_dec(1).unwrap());
        assert_eq!(op("#$10"), Operand::immediate(16).unwrap());
        assert_eq!(op("#-1"), Operand::immediate(-1).unwrap());
        assert_eq!(op("#'AB'"), Operand::immediate(0x4142).unwrap());
        assert_eq!(op("($1000).W"), Operand::abs_word(0x1000).unwrap());
        assert_eq!(op("($1000).l"), Operand::abs_long(0x1000).unwrap());
        assert_eq!(op("$2000"), Operand::abs_word(0x2000).unwrap());
        assert_eq!(op("$12000"), Operand::abs_long(0x12000).unwrap());
    }

    #[test]
    fn parse_errors() {
        assert!("D8".parse::<Operand>().is_err());
        assert!("D10".parse::<Operand>().is_err());
        assert!("(D0)".parse::<Operand>().is_err());
        assert!("#".parse::<Operand>().is_err());
        assert!("foo".parse::<Operand>().is_err());
        assert_eq!(
            "$1000000".parse::<Operand>(),
            Err(OperandError::Address(0x100_0000))
        );
    }

    #[test]
    fn display_parses_back() {
        for s in [
            "D0", "A7", "(A3)", "(A4)+", "-(A5)", "#$FF", "#-$80", "($1234).W", "($123456).L",
        ] {
            assert_eq!(op(s).to_string(), s);
            assert_eq!(op(&op(s).to_string()), op(s));
        }
    }

    #[test]
    fn fetch_register_low_bits() {
        let mut regs = RegisterFile::new();
        let bus = Testbus::new();
        regs.d[0] = 0x1234_5678;
        let v = op("D0").fetch(&mut regs, &bus, Size::Byte).unwrap();
        assert_eq!(v.as_unsigned(), 0x78);
        assert_eq!(v.size(), Size::Byte);
        let v = op("D0").fetch(&mut regs, &bus, Size::Word).unwrap();
        assert_eq!(v.as_unsigned(), 0x5678);
    }

    #[test]
    fn fetch_immediate() {
        let mut regs = RegisterFile::new();
        let bus = Testbus::new();
        let v = op("#-2").fetch(&mut regs, &bus, Size::Word).unwrap();
        assert_eq!(v.as_unsigned(), 0xFFFE);
        let v = op("#-2").fetch(&mut regs, &bus, Size::Long).unwrap();
        assert_eq!(v.as_unsigned(), 0xFFFF_FFFE);
    }

    #[test]
    fn store_data_register_preserves_high_bits() {
        let mut regs = RegisterFile::new();
        let mut bus = Testbus::new();
        regs.d[2] = 0xAABB_CCDD;
        op("D2")
            .store(&mut regs, &mut bus, Value::truncate(Size::Byte, 0x11))
            .unwrap();
        assert_eq!(regs.d[2], 0xAABB_CC11);
        op("D2")
            .store(&mut regs, &mut bus, Value::truncate(Size::Word, 0x2222))
            .unwrap();
        assert_eq!(regs.d[2], 0xAABB_2222);
    }

    #[test]
    fn store_address_register_sign_extends() {
        let mut regs = RegisterFile::new();
        let mut bus = Testbus::new();
        op("A0")
            .store(&mut regs, &mut bus, Value::truncate(Size::Word, 0x8000))
            .unwrap();
        assert_eq!(regs.a[0], 0xFFFF_8000);
    }

    #[test]
    fn store_immediate_fails() {
        let mut regs = RegisterFile::new();
        let mut bus = Testbus::new();
        let err = op("#1")
            .store(&mut regs, &mut bus, Value::truncate(Size::Byte, 0))
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<OperandError>(),
            Some(&OperandError::NotWritable(EaMode::Immediate))
        );
    }

    #[test]
    fn post_increment_after_read() {
        let mut regs = RegisterFile::new();
        let bus = Testbus::from_bytes(0x1000, &[0x11, 0x22, 0x33, 0x44]);
        regs.a[0] = 0x1000;
        let v = op("(A0)+").fetch(&mut regs, &bus, Size::Word).unwrap();
        assert_eq!(v.as_unsigned(), 0x1122);
        assert_eq!(regs.a[0], 0x1002);
        let v = op("(A0)+").fetch(&mut regs, &bus, Size::Byte).unwrap();
        assert_eq!(v.as_unsigned(), 0x33);
        assert_eq!(regs.a[0], 0x1003);
    }

    #[test]
    fn pre_decrement_before_write() {
        let mut regs = RegisterFile::new();
        let mut bus = Testbus::new();
        regs.a[1] = 0x2004;
        op("-(A1)")
            .store(&mut regs, &mut bus, Value::truncate(Size::Long, 0xDEADBEEF))
            .unwrap();
        assert_eq!(regs.a[1], 0x2000);
        assert_eq!(bus.read32(0x2000), Ok(0xDEADBEEF));
    }

    #[test]
    fn stack_pointer_byte_step() {
        let mut regs = RegisterFile::new();
        let mut bus = Testbus::new();
        op("-(SP)")
            .store(&mut regs, &mut bus, Value::truncate(Size::Byte, 0x42))
            .unwrap();
        assert_eq!(regs.a[7], DEFAULT_STACK_POINTER - 2);
        assert_eq!(bus.read(DEFAULT_STACK_POINTER - 2), 0x42);
        let v = op("(SP)+").fetch(&mut regs, &bus, Size::Byte).unwrap();
        assert_eq!(v.as_unsigned(), 0x42);
        assert_eq!(regs.a[7], DEFAULT_STACK_POINTER);
    }

    #[test]
    fn failed_access_leaves_register() {
        let mut regs = RegisterFile::new();
        let bus = Testbus::new();
        regs.a[0] = 0x1001;
        let err = op("(A0)+").fetch(&mut regs, &bus, Size::Word).unwrap_err();
        assert_eq!(
            err.downcast_ref::<BusError>(),
            Some(&BusError::Unaligned {
                addr: 0x1001,
                size: Size::Word
            })
        );
        assert_eq!(regs.a[0], 0x1001);

        regs.a[0] = 0xFFFF_FFFF;
        let err = op("(A0)").fetch(&mut regs, &bus, Size::Byte).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BusError>(),
            Some(BusError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn modify_steps_once() {
        let mut regs = RegisterFile::new();
        let mut bus = Testbus::from_bytes(0x1000, &[0x00, 0x05]);
        regs.a[2] = 0x1000;
        let old = op("(A2)+")
            .modify(&mut regs, &mut bus, Size::Word, |v| {
                (Value::truncate(Size::Word, v.as_unsigned() + 1), v)
            })
            .unwrap();
        assert_eq!(old.as_unsigned(), 5);
        assert_eq!(bus.read16(0x1000), Ok(6));
        assert_eq!(regs.a[2], 0x1002);

        regs.d[0] = 0xFFFF_00FF;
        op("D0")
            .modify(&mut regs, &mut bus, Size::Byte, |_| {
                (Value::truncate(Size::Byte, 0x12), ())
            })
            .unwrap();
        assert_eq!(regs.d[0], 0xFFFF_0012);

        assert!(op("#1")
            .modify(&mut regs, &mut bus, Size::Byte, |v| (v, ()))
            .is_err());
    }

    #[test]
    fn absolute_word_masks() {
        let mut regs = RegisterFile::new();
        let mut bus = Testbus::new();
        let o = Operand::abs_word(0x12_3456).unwrap();
        o.store(&mut regs, &mut bus, Value::truncate(Size::Word, 0xBEEF))
            .unwrap();
        assert_eq!(bus.read16(0x3456), Ok(0xBEEF));
        assert_eq!(o.effective_address(&regs), Ok(0x3456));
    }

    #[test]
    fn sized_immediates() {
        assert_eq!(op("#-1").sized(Size::Byte), op("#$FF"));
        assert_eq!(op("#-1").sized(Size::Word), op("#$FFFF"));
        assert_eq!(op("#-1").sized(Size::Long), op("#$FFFFFFFF"));
        assert_eq!(op("#-32768").sized(Size::Word), op("#$8000"));
        assert_eq!(op("#$7F").sized(Size::Byte), op("#$7F"));
        // Out of range stays as is, for validation to report
        assert_eq!(op("#-32768").sized(Size::Byte), op("#-32768"));
        assert_eq!(op("-(A3)").sized(Size::Byte), op("-(A3)"));
    }

    #[test]
    fn effective_address() {
        let mut regs = RegisterFile::new();
        regs.a[4] = 0x4000;
        assert_eq!(op("(A4)").effective_address(&regs), Ok(0x4000));
        assert_eq!(op("($123456).L").effective_address(&regs), Ok(0x123456));
        assert_eq!(
            op("(A4)+").effective_address(&regs),
            Err(OperandError::NoAddress(EaMode::PostIncrement))
        );
        assert!(op("D0").effective_address(&regs).is_err());
    }

    #[test]
    fn encode_fields() {
        assert_eq!(op("D3").encode(Size::Word).0, 0b000_011);
        assert_eq!(op("(A3)+").encode(Size::Word).0, 0b011_011);
        assert_eq!(op("-(A3)").encode_swapped(Size::Word).0, 0b011_100);
        let (f, ext) = op("($123456).L").encode(Size::Byte);
        assert_eq!(f, 0b111_001);
        assert_eq!(ext.as_slice(), &[0x0012, 0x3456]);
        let (f, ext) = op("#-1").encode(Size::Byte);
        assert_eq!(f, 0b111_100);
        assert_eq!(ext.as_slice(), &[0x00FF]);
        let (_, ext) = op("#-1").encode(Size::Long);
        assert_eq!(ext.as_slice(), &[0xFFFF, 0xFFFF]);
    }

    #[test]
    fn ext_words_agree_with_encoding() {
        for s in ["D0", "A1", "(A2)", "(A3)+", "-(A4)", "$100", "$10000", "#5"] {
            for size in [Size::Byte, Size::Word, Size::Long] {
                let o = op(s);
                assert_eq!(o.encode(size).1.len(), o.ext_words(size), "{} {}", s, size);
            }
        }
    }

    #[test]
    fn decode_modes() {
        let mut none = std::iter::empty::<u16>();
        assert_eq!(
            Operand::decode(4, 2, Size::Word, Role::Source, &mut none),
            Some((op("-(A2)"), 0))
        );

        let mut s = [0x0012u16, 0x3456].into_iter();
        assert_eq!(
            Operand::decode(7, 1, Size::Word, Role::Source, &mut s),
            Some((op("($123456).L"), 2))
        );

        let mut s = [0x12FFu16].into_iter();
        assert_eq!(
            Operand::decode(7, 4, Size::Byte, Role::Source, &mut s),
            Some((op("#$FF"), 1))
        );
    }

    #[test]
    fn decode_invalid() {
        let mut s = [0x1234u16, 0x5678].into_iter();
        // immediate is not a destination
        assert_eq!(Operand::decode(7, 4, Size::Word, Role::Destination, &mut s), None);
        // d16(An), d8(An,Xn), PC relative
        assert_eq!(Operand::decode(5, 0, Size::Word, Role::Source, &mut s), None);
        assert_eq!(Operand::decode(6, 0, Size::Word, Role::Source, &mut s), None);
        assert_eq!(Operand::decode(7, 2, Size::Word, Role::Source, &mut s), None);
        // absolute long beyond the address space
        let mut s = [0x0100u16, 0x0000].into_iter();
        assert_eq!(Operand::decode(7, 1, Size::Word, Role::Source, &mut s), None);
        // stream ends
        let mut s = [0x0000u16].into_iter();
        assert_eq!(Operand::decode(7, 1, Size::Word, Role::Source, &mut s), None);
    }
}
