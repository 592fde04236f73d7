use anyhow::{bail, Result};

use super::{Address, Bus, ADDRESS_MASK, ADDRESS_SPACE_SIZE};

/// Flat, zero-initialized 16 MiB main memory.
pub struct Memory {
    mem: Vec<u8>,
}

impl Memory {
    pub fn new() -> Self {
        Self {
            // Need allocation here, too large for stack.
            mem: vec![0; ADDRESS_SPACE_SIZE],
        }
    }

    /// Creates memory from a raw image of the complete address space.
    pub fn from_image(image: &[u8]) -> Result<Self> {
        let mut m = Self::new();
        m.load_image(image)?;
        Ok(m)
    }

    /// Replaces the complete memory with a raw image.
    pub fn load_image(&mut self, image: &[u8]) -> Result<()> {
        if image.len() != ADDRESS_SPACE_SIZE {
            bail!(
                "Memory image is {} bytes, expected {}",
                image.len(),
                ADDRESS_SPACE_SIZE
            );
        }
        self.mem.copy_from_slice(image);
        Ok(())
    }

    /// The raw memory image.
    pub fn save_image(&self) -> &[u8] {
        &self.mem
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for Memory {
    fn read(&self, addr: Address) -> u8 {
        self.mem[(addr & ADDRESS_MASK) as usize]
    }

    fn write(&mut self, addr: Address, val: u8) {
        self.mem[(addr & ADDRESS_MASK) as usize] = val;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_initialized() {
        let m = Memory::new();
        assert_eq!(m.save_image().len(), ADDRESS_SPACE_SIZE);
        assert!(m.save_image().iter().all(|&b| b == 0));
    }

    #[test]
    fn image_roundtrip() {
        let mut m = Memory::new();
        m.write_bytes(0x1000, &[1, 2, 3]).unwrap();
        m.write32(0xFF_FFFC, 0xCAFEBABE).unwrap();

        let m2 = Memory::from_image(m.save_image()).unwrap();
        assert_eq!(m2.read_bytes(0x1000, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(m2.read32(0xFF_FFFC), Ok(0xCAFEBABE));
    }

    #[test]
    fn image_size() {
        assert!(Memory::from_image(&[0; 16]).is_err());
    }
}
