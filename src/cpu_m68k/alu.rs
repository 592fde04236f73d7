use super::value::Size;

/// Result of an ALU operation, already masked to the operation size.
/// X follows C for the operations that affect it.
pub struct AluResult {
    pub result: u32,
    pub c: bool,
    pub n: bool,
    pub z: bool,
    pub v: bool,
}

impl AluResult {
    fn new(size: Size, raw: u64, c: bool, v: bool) -> Self {
        let result = raw as u32 & size.mask();
        Self {
            result,
            c,
            v,
            z: result == 0,
            n: result & size.msb() != 0,
        }
    }
}

/// a + b
pub fn add(size: Size, a: u32, b: u32) -> AluResult {
    let (a, b) = (a & size.mask(), b & size.mask());
    let raw = u64::from(a) + u64::from(b);
    let result = raw as u32 & size.mask();

    AluResult::new(
        size,
        raw,
        raw > u64::from(size.mask()),
        !(a ^ b) & (a ^ result) & size.msb() != 0,
    )
}

/// a - b
pub fn sub(size: Size, a: u32, b: u32) -> AluResult {
    let (a, b) = (a & size.mask(), b & size.mask());
    let result = a.wrapping_sub(b) & size.mask();

    AluResult::new(
        size,
        u64::from(result),
        b > a,
        (a ^ b) & (a ^ result) & size.msb() != 0,
    )
}

/// 0 - a
pub fn neg(size: Size, a: u32) -> AluResult {
    sub(size, 0, a)
}

fn logic(size: Size, result: u32) -> AluResult {
    AluResult::new(size, u64::from(result), false, false)
}

pub fn and(size: Size, a: u32, b: u32) -> AluResult {
    logic(size, a & b)
}

pub fn or(size: Size, a: u32, b: u32) -> AluResult {
    logic(size, a | b)
}

pub fn eor(size: Size, a: u32, b: u32) -> AluResult {
    logic(size, a ^ b)
}

/// Flags for a plain data move (N, Z; V and C cleared).
pub fn mov(size: Size, a: u32) -> AluResult {
    logic(size, a)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_word_overflow() {
        let r = add(Size::Word, 0x7FFF, 1);
        assert_eq!(r.result, 0x8000);
        assert!(r.n);
        assert!(r.v);
        assert!(!r.c);
        assert!(!r.z);
    }

    #[test]
    fn add_carry() {
        let r = add(Size::Byte, 0xFF, 0x01);
        assert_eq!(r.result, 0);
        assert!(r.c);
        assert!(r.z);
        assert!(!r.v);

        let r = add(Size::Long, 0xFFFF_FFFF, 0xFFFF_FFFF);
        assert_eq!(r.result, 0xFFFF_FFFE);
        assert!(r.c);
        assert!(r.n);
        assert!(!r.v);
    }

    #[test]
    fn add_ignores_high_bits() {
        let r = add(Size::Byte, 0x1234_5601, 0xFFFF_FF01);
        assert_eq!(r.result, 0x02);
        assert!(!r.c);
    }

    /// Exhaustive check of the carry and overflow rules for bytes.
    #[test]
    fn add_flags_byte_exhaustive() {
        for a in 0u32..=0xFF {
            for b in 0u32..=0xFF {
                let r = add(Size::Byte, a, b);
                assert_eq!(r.c, a + b >= 0x100);
                let (sa, sb, sr) = (a & 0x80, b & 0x80, r.result & 0x80);
                assert_eq!(r.v, sa == sb && sr != sa);
                assert_eq!(r.result, (a + b) & 0xFF);
            }
        }
    }

    #[test]
    fn sub_borrow() {
        let r = sub(Size::Byte, 0x7B, 0xEE);
        assert_eq!(r.result, 0x8D);
        assert!(r.c);
        assert!(r.n);
        assert!(r.v);
        assert!(!r.z);

        let r = sub(Size::Word, 5, 5);
        assert!(r.z);
        assert!(!r.c);
        assert!(!r.v);
    }

    #[test]
    fn sub_overflow() {
        // -128 - 1 can't be represented
        let r = sub(Size::Byte, 0x80, 0x01);
        assert_eq!(r.result, 0x7F);
        assert!(r.v);
        assert!(!r.c);
    }

    #[test]
    fn neg_values() {
        let r = neg(Size::Byte, 1);
        assert_eq!(r.result, 0xFF);
        assert!(r.c);
        assert!(r.n);

        let r = neg(Size::Word, 0);
        assert_eq!(r.result, 0);
        assert!(!r.c);
        assert!(r.z);

        let r = neg(Size::Byte, 0x80);
        assert_eq!(r.result, 0x80);
        assert!(r.v);
    }

    #[test]
    fn logic_clears_vc() {
        let r = and(Size::Word, 0xF0F0, 0x8F00);
        assert_eq!(r.result, 0x8000);
        assert!(r.n);
        assert!(!r.v);
        assert!(!r.c);

        assert_eq!(or(Size::Byte, 0x0F, 0xF0).result, 0xFF);
        assert!(eor(Size::Long, 0x1234, 0x1234).z);
    }
}
