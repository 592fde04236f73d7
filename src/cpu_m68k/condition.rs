use num_derive::{FromPrimitive, ToPrimitive};
use strum::{Display, EnumIter, EnumString};

use super::regs::{Flag, RegisterFile};

/// Branch conditions, in encoding order (bits 11..8 of Bcc).
#[derive(
    FromPrimitive, ToPrimitive, EnumIter, EnumString, Display, Debug, Copy, Clone, Eq, PartialEq,
)]
#[strum(ascii_case_insensitive)]
pub enum Condition {
    /// True. Encoded as BRA.
    T = 0,
    /// False. The slot is taken by BSR.
    F = 1,
    /// Higher
    HI = 2,
    /// Lower or same
    LS = 3,
    /// Carry clear
    #[strum(to_string = "CC", serialize = "HS")]
    CC = 4,
    /// Carry set
    #[strum(to_string = "CS", serialize = "LO")]
    CS = 5,
    /// Not equal
    NE = 6,
    /// Equal
    EQ = 7,
    /// Overflow clear
    VC = 8,
    /// Overflow set
    VS = 9,
    /// Plus
    PL = 10,
    /// Minus
    MI = 11,
    /// Greater or equal
    GE = 12,
    /// Less than
    LT = 13,
    /// Greater than
    GT = 14,
    /// Less or equal
    LE = 15,
}

impl Condition {
    /// Evaluates the condition against the CCR.
    pub fn test(&self, regs: &RegisterFile) -> bool {
        let c = regs.test_flag(Flag::C);
        let v = regs.test_flag(Flag::V);
        let z = regs.test_flag(Flag::Z);
        let n = regs.test_flag(Flag::N);

        match self {
            Condition::T => true,
            Condition::F => false,
            Condition::HI => !c && !z,
            Condition::LS => c || z,
            Condition::CC => !c,
            Condition::CS => c,
            Condition::NE => !z,
            Condition::EQ => z,
            Condition::VC => !v,
            Condition::VS => v,
            Condition::PL => !n,
            Condition::MI => n,
            Condition::GE => n == v,
            Condition::LT => n != v,
            Condition::GT => !z && n == v,
            Condition::LE => z || n != v,
        }
    }
}
