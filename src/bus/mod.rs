pub mod memory;
pub mod testbus;

use thiserror::Error;

use crate::cpu_m68k::value::{Size, Value};

/// Main CPU address data type (actually 24-bit)
pub type Address = u32;

/// Main CPU address mask
pub const ADDRESS_MASK: Address = 0x00FFFFFF;

/// Main CPU total address space
pub const ADDRESS_SPACE_SIZE: usize = 16 * 1024 * 1024;
pub const ADDRESS_SPACE: u32 = 16 * 1024 * 1024;

#[derive(Debug, Error, Copy, Clone, Eq, PartialEq)]
pub enum BusError {
    #[error("Unaligned {size} access at ${addr:06X}")]
    Unaligned { addr: Address, size: Size },
    #[error("{size} access at ${addr:08X} outside of address space")]
    OutOfBounds { addr: Address, size: Size },
}

/// The 68000 address bus. Big endian.
///
/// Implementors provide raw byte access; the provided methods check
/// every access against the address space and the alignment rules
/// (an access of width w at address a requires a % w == 0).
pub trait Bus {
    /// Raw byte read. Address is masked to the address space.
    fn read(&self, addr: Address) -> u8;

    /// Raw byte write. Address is masked to the address space.
    fn write(&mut self, addr: Address, val: u8);

    /// Validates an access of the given width.
    fn check(&self, addr: Address, size: Size) -> Result<(), BusError> {
        if u64::from(addr) + u64::from(size.bytes()) > u64::from(ADDRESS_SPACE) {
            return Err(BusError::OutOfBounds { addr, size });
        }
        if addr % size.bytes() != 0 {
            return Err(BusError::Unaligned { addr, size });
        }
        Ok(())
    }

    /// Reads a value of the given width from addr.
    fn read_value(&self, addr: Address, size: Size) -> Result<Value, BusError> {
        self.check(addr, size)?;
        let bits = (0..size.bytes()).fold(0u32, |acc, i| acc << 8 | u32::from(self.read(addr + i)));
        Ok(Value::truncate(size, bits))
    }

    /// Writes a value to addr, most significant byte first.
    fn write_value(&mut self, addr: Address, val: Value) -> Result<(), BusError> {
        self.check(addr, val.size())?;
        for (i, b) in val.as_bytes().into_iter().enumerate() {
            self.write(addr + i as Address, b);
        }
        Ok(())
    }

    /// Read 16-bits from addr and addr + 1,
    /// from big endian.
    fn read16(&self, addr: Address) -> Result<u16, BusError> {
        Ok(self.read_value(addr, Size::Word)?.as_unsigned() as u16)
    }

    /// Read 32-bits from addr to addr + 3,
    /// from big endian.
    fn read32(&self, addr: Address) -> Result<u32, BusError> {
        Ok(self.read_value(addr, Size::Long)?.as_unsigned())
    }

    /// Write 16-bits to addr and addr + 1,
    /// in big endian.
    fn write16(&mut self, addr: Address, val: u16) -> Result<(), BusError> {
        self.write_value(addr, Value::truncate(Size::Word, val.into()))
    }

    /// Write 32-bits to addr to addr + 3,
    /// in big endian.
    fn write32(&mut self, addr: Address, val: u32) -> Result<(), BusError> {
        self.write_value(addr, Value::truncate(Size::Long, val))
    }

    /// Reads a run of bytes. No alignment requirement.
    fn read_bytes(&self, addr: Address, len: usize) -> Result<Vec<u8>, BusError> {
        if u64::from(addr) + len as u64 > u64::from(ADDRESS_SPACE) {
            return Err(BusError::OutOfBounds {
                addr,
                size: Size::Byte,
            });
        }
        Ok((0..len).map(|i| self.read(addr + i as Address)).collect())
    }

    /// Writes a run of bytes. No alignment requirement.
    fn write_bytes(&mut self, addr: Address, bytes: &[u8]) -> Result<(), BusError> {
        if u64::from(addr) + bytes.len() as u64 > u64::from(ADDRESS_SPACE) {
            return Err(BusError::OutOfBounds {
                addr,
                size: Size::Byte,
            });
        }
        for (i, &b) in bytes.iter().enumerate() {
            self.write(addr + i as Address, b);
        }
        Ok(())
    }
}

impl core::fmt::Debug for dyn Bus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "Bus")
    }
}

/// Iterates over the instruction words on the bus, starting at
/// an offset. Ends at the end of the address space or when the
/// offset is not word aligned.
pub struct BusIterator<'a> {
    bus: &'a dyn Bus,
    next: Address,
}

impl<'a> BusIterator<'a> {
    pub fn new_from(bus: &'a dyn Bus, offset: Address) -> Self {
        Self { bus, next: offset }
    }

    pub fn new(bus: &'a dyn Bus) -> Self {
        Self::new_from(bus, 0)
    }
}

impl<'a> Iterator for BusIterator<'a> {
    type Item = u16;

    fn next(&mut self) -> Option<Self::Item> {
        let curr = self.next;
        let word = self.bus.read16(curr).ok()?;
        self.next = curr + 2;
        Some(word)
    }
}
