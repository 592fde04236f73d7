use std::cmp::Ordering;
use std::fmt;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};
use thiserror::Error;

use super::alu;
use crate::util::sign_extend;

/// Operation size of an instruction or width of a value.
#[derive(EnumIter, Display, Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum Size {
    Byte,
    Word,
    Long,
}

impl Size {
    /// Width in bytes.
    pub const fn bytes(&self) -> u32 {
        match self {
            Size::Byte => 1,
            Size::Word => 2,
            Size::Long => 4,
        }
    }

    /// Width in bits.
    pub const fn bits(&self) -> u32 {
        self.bytes() * 8
    }

    /// Mask covering all bits of this width.
    pub const fn mask(&self) -> u32 {
        match self {
            Size::Byte => 0xFF,
            Size::Word => 0xFFFF,
            Size::Long => 0xFFFF_FFFF,
        }
    }

    /// Mask of the sign bit.
    pub const fn msb(&self) -> u32 {
        1 << (self.bits() - 1)
    }

    /// Amount of 16-bit extension words an immediate of this size takes.
    pub const fn immediate_words(&self) -> usize {
        match self {
            Size::Byte | Size::Word => 1,
            Size::Long => 2,
        }
    }

    /// Assembler suffix, e.g. `.W`.
    pub const fn suffix(&self) -> &'static str {
        match self {
            Size::Byte => ".B",
            Size::Word => ".W",
            Size::Long => ".L",
        }
    }

    /// Parses a size suffix letter (without the dot).
    pub fn from_suffix(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "B" | "S" => Some(Size::Byte),
            "W" => Some(Size::Word),
            "L" => Some(Size::Long),
            _ => None,
        }
    }
}

#[derive(Debug, Error, Eq, PartialEq)]
pub enum ValueError {
    #[error("{value} does not fit in a signed {size}")]
    SignedOutOfRange { size: Size, value: i64 },
    #[error("{value} does not fit in an unsigned {size}")]
    UnsignedOutOfRange { size: Size, value: u64 },
    #[error("{size} needs {} bytes, got {got}", .size.bytes())]
    ByteCount { size: Size, got: usize },
}

/// A fixed-width binary value as stored in a register or memory.
///
/// The stored bits always fit the width. Values are immutable;
/// every operation returns a new value. Comparisons use the signed
/// interpretation.
#[derive(Debug, Copy, Clone)]
pub struct Value {
    size: Size,
    bits: u32,
}

impl Value {
    /// Zero of the given width.
    pub const fn zero(size: Size) -> Self {
        Self { size, bits: 0 }
    }

    /// Masks `bits` to the width. Never fails.
    pub const fn truncate(size: Size, bits: u32) -> Self {
        Self {
            size,
            bits: bits & size.mask(),
        }
    }

    pub fn from_signed(size: Size, value: i64) -> Result<Self, ValueError> {
        let min = -(1i64 << (size.bits() - 1));
        let max = (1i64 << (size.bits() - 1)) - 1;
        if !(min..=max).contains(&value) {
            return Err(ValueError::SignedOutOfRange { size, value });
        }
        Ok(Self::truncate(size, value as u32))
    }

    pub fn from_unsigned(size: Size, value: u64) -> Result<Self, ValueError> {
        if value > u64::from(size.mask()) {
            return Err(ValueError::UnsignedOutOfRange { size, value });
        }
        Ok(Self::truncate(size, value as u32))
    }

    /// Builds a value from big-endian bytes, exactly `size` of them.
    pub fn from_bytes(size: Size, bytes: &[u8]) -> Result<Self, ValueError> {
        if bytes.len() != size.bytes() as usize {
            return Err(ValueError::ByteCount {
                size,
                got: bytes.len(),
            });
        }
        let bits = bytes.iter().fold(0u32, |acc, &b| acc << 8 | u32::from(b));
        Ok(Self { size, bits })
    }

    /// Accepts anything representable in the width either as signed
    /// or as unsigned, e.g. both -1 and 255 for a byte.
    pub fn from_any(size: Size, value: i64) -> Result<Self, ValueError> {
        if value < 0 {
            Self::from_signed(size, value)
        } else {
            Self::from_unsigned(size, value as u64)
        }
    }

    pub const fn size(&self) -> Size {
        self.size
    }

    pub const fn as_unsigned(&self) -> u32 {
        self.bits
    }

    pub fn as_signed(&self) -> i32 {
        sign_extend(self.bits as i32, self.size.bits())
    }

    /// Big-endian byte representation.
    pub fn as_bytes(&self) -> ArrayVec<u8, 4> {
        let be = self.bits.to_be_bytes();
        be[(4 - self.size.bytes() as usize)..].iter().copied().collect()
    }

    pub const fn msb(&self) -> bool {
        self.bits & self.size.msb() != 0
    }

    pub const fn is_zero(&self) -> bool {
        self.bits == 0
    }

    /// Changes the width, truncating or zero-extending.
    pub const fn resize(&self, size: Size) -> Self {
        Self::truncate(size, self.bits)
    }

    /// Changes the width, sign-extending when growing.
    pub fn sign_extend(&self, size: Size) -> Self {
        Self::truncate(size, self.as_signed() as u32)
    }

    /// Modulo addition. Returns (result, carry, overflow).
    pub fn add_unsigned(&self, other: &Value) -> (Value, bool, bool) {
        let r = alu::add(self.size, self.bits, other.bits);
        (Value::truncate(self.size, r.result), r.c, r.v)
    }

    /// Modulo subtraction of `other` from `self`. Returns
    /// (result, borrow, overflow).
    pub fn sub_unsigned(&self, other: &Value) -> (Value, bool, bool) {
        let r = alu::sub(self.size, self.bits, other.bits);
        (Value::truncate(self.size, r.result), r.c, r.v)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.as_signed() == other.as_signed()
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        self.as_signed().cmp(&other.as_signed())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.size {
            Size::Byte => write!(f, "${:02X}", self.bits),
            Size::Word => write!(f, "${:04X}", self.bits),
            Size::Long => write!(f, "${:08X}", self.bits),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_signed() {
        assert_eq!(Value::from_signed(Size::Byte, -1).unwrap().as_unsigned(), 0xFF);
        assert_eq!(
            Value::from_signed(Size::Word, -2).unwrap().as_unsigned(),
            0xFFFE
        );
        assert_eq!(
            Value::from_signed(Size::Long, i64::from(i32::MIN))
                .unwrap()
                .as_unsigned(),
            0x8000_0000
        );
        assert_eq!(
            Value::from_signed(Size::Byte, 128),
            Err(ValueError::SignedOutOfRange {
                size: Size::Byte,
                value: 128
            })
        );
        assert!(Value::from_signed(Size::Byte, -129).is_err());
    }

    #[test]
    fn from_unsigned() {
        assert_eq!(
            Value::from_unsigned(Size::Word, 0xFFFF).unwrap().as_signed(),
            -1
        );
        assert!(Value::from_unsigned(Size::Word, 0x10000).is_err());
        assert!(Value::from_unsigned(Size::Long, 0x1_0000_0000).is_err());
    }

    #[test]
    fn from_bytes() {
        let v = Value::from_bytes(Size::Long, &[0xDE, 0xAD, 0xBE, 0xEF]).unwrap();
        assert_eq!(v.as_unsigned(), 0xDEADBEEF);
        assert_eq!(v.as_bytes().as_slice(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert!(Value::from_bytes(Size::Word, &[1]).is_err());
    }

    #[test]
    fn signed_view() {
        let v = Value::truncate(Size::Byte, 0x80);
        assert!(v.msb());
        assert_eq!(v.as_signed(), -128);
        assert_eq!(v.sign_extend(Size::Long).as_unsigned(), 0xFFFF_FF80);
        assert_eq!(v.resize(Size::Long).as_unsigned(), 0x80);
    }

    #[test]
    fn compare_signed() {
        let a = Value::truncate(Size::Byte, 0xFF);
        let b = Value::truncate(Size::Word, 0xFFFF);
        assert_eq!(a, b);
        assert!(Value::truncate(Size::Byte, 0x80) < Value::truncate(Size::Byte, 0x01));
    }

    #[test]
    fn add_sub_unsigned() {
        let (r, c, v) = Value::truncate(Size::Byte, 0xFF).add_unsigned(&Value::truncate(Size::Byte, 1));
        assert!(r.is_zero());
        assert!(c);
        assert!(!v);

        let (r, c, v) = Value::truncate(Size::Byte, 0x7F).add_unsigned(&Value::truncate(Size::Byte, 1));
        assert_eq!(r.as_unsigned(), 0x80);
        assert!(!c);
        assert!(v);

        let (r, c, v) = Value::truncate(Size::Word, 0).sub_unsigned(&Value::truncate(Size::Word, 1));
        assert_eq!(r.as_unsigned(), 0xFFFF);
        assert!(c);
        assert!(!v);
    }

    #[test]
    fn display() {
        assert_eq!(Value::truncate(Size::Word, 0xAB).to_string(), "$00AB");
    }
}
