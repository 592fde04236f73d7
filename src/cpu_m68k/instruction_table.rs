use arrayvec::ArrayVec;
use strum::Display;

use Field as F;

/// Instruction type groups
#[allow(non_camel_case_types)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Display)]
pub enum InstructionType {
    MOVE_B,
    MOVE_W,
    MOVE_L,
    MOVEA_W,
    MOVEA_L,
    ADD,
    ADDA,
    ADDQ,
    SUB,
    SUBA,
    SUBQ,
    AND,
    OR,
    EOR,
    CMP,
    CMPI,
    NEG,
    LEA,
    JSR,
    RTS,
    NOP,
    TRAP,
    BCC,
    BSR,
    SIMHALT,
}

/// A bit field of the first instruction word.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Field {
    pub width: u8,
    pub offset: u8,
    /// Fixed value, or None for an operand field.
    pub literal: Option<u16>,
}

impl Field {
    const fn lit(width: u8, offset: u8, val: u16) -> Self {
        Self {
            width,
            offset,
            literal: Some(val),
        }
    }

    const fn var(width: u8, offset: u8) -> Self {
        Self {
            width,
            offset,
            literal: None,
        }
    }

    pub const fn mask(&self) -> u16 {
        ((1u32 << self.width) - 1) as u16
    }

    /// Extracts the field from an instruction word.
    pub const fn get(&self, word: u16) -> u16 {
        (word >> self.offset) & self.mask()
    }
}

/// Bit layout of the first word of an instruction family.
/// Fields are declared from the most significant bit down.
#[derive(Debug)]
pub struct FormatDef {
    pub mnemonic: &'static str,
    pub instr_type: InstructionType,
    pub fields: &'static [Field],
}

impl FormatDef {
    /// The leading literal fields concatenated, as (value, length in bits).
    pub fn prefix(&self) -> (u16, u8) {
        self.fields
            .iter()
            .map_while(|f| f.literal.map(|l| (l, f.width)))
            .fold((0, 0), |(val, len), (l, w)| {
                (((u32::from(val) << w) | u32::from(l)) as u16, len + w)
            })
    }

    /// Total amount of literal bits.
    pub fn literal_bits(&self) -> u8 {
        self.fields
            .iter()
            .filter(|f| f.literal.is_some())
            .map(|f| f.width)
            .sum()
    }

    /// Whether all literal fields match the word.
    pub fn matches(&self, word: u16) -> bool {
        self.fields
            .iter()
            .all(|f| f.literal.map_or(true, |l| f.get(word) == l))
    }

    /// Extracts the operand fields, in declaration order.
    pub fn extract(&self, word: u16) -> ArrayVec<u16, 6> {
        self.fields
            .iter()
            .filter(|f| f.literal.is_none())
            .map(|f| f.get(word))
            .collect()
    }

    /// Composes a word from the literal fields and the given operand
    /// fields, in declaration order. Operand values are masked to
    /// their field.
    pub fn build(&self, vars: &[u16]) -> u16 {
        let mut vars = vars.iter();
        self.fields.iter().fold(0, |word, f| {
            let val = f.literal.or_else(|| vars.next().copied()).unwrap_or(0);
            word | (val & f.mask()) << f.offset
        })
    }
}

/// Looks up the format of an instruction type.
pub fn format(t: InstructionType) -> &'static FormatDef {
    INSTRUCTION_TABLE
        .iter()
        .find(|f| f.instr_type == t)
        .unwrap_or_else(|| unreachable!("{} not in instruction table", t))
}

/// The instruction set. Every family has a unique set of literal bits;
/// families sharing a prefix are told apart by their other literals.
pub const INSTRUCTION_TABLE: &[FormatDef] = &[
    // MOVE: 00 ss RRR MMM mmm rrr, size 01 = B, 11 = W, 10 = L
    FormatDef {
        mnemonic: "MOVE.B",
        instr_type: InstructionType::MOVE_B,
        fields: &[F::lit(4, 12, 0b0001), F::var(3, 9), F::var(3, 6), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "MOVE.W",
        instr_type: InstructionType::MOVE_W,
        fields: &[F::lit(4, 12, 0b0011), F::var(3, 9), F::var(3, 6), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "MOVE.L",
        instr_type: InstructionType::MOVE_L,
        fields: &[F::lit(4, 12, 0b0010), F::var(3, 9), F::var(3, 6), F::var(3, 3), F::var(3, 0)],
    },
    // MOVEA: 00 ss AAA 001 mmm rrr
    FormatDef {
        mnemonic: "MOVEA.W",
        instr_type: InstructionType::MOVEA_W,
        fields: &[F::lit(4, 12, 0b0011), F::var(3, 9), F::lit(3, 6, 0b001), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "MOVEA.L",
        instr_type: InstructionType::MOVEA_L,
        fields: &[F::lit(4, 12, 0b0010), F::var(3, 9), F::lit(3, 6, 0b001), F::var(3, 3), F::var(3, 0)],
    },
    // 1101 DDD ooo mmm rrr
    FormatDef {
        mnemonic: "ADD",
        instr_type: InstructionType::ADD,
        fields: &[F::lit(4, 12, 0b1101), F::var(3, 9), F::var(3, 6), F::var(3, 3), F::var(3, 0)],
    },
    // 1101 AAA s11 mmm rrr
    FormatDef {
        mnemonic: "ADDA",
        instr_type: InstructionType::ADDA,
        fields: &[F::lit(4, 12, 0b1101), F::var(3, 9), F::var(1, 8), F::lit(2, 6, 0b11), F::var(3, 3), F::var(3, 0)],
    },
    // 0101 ddd 0 ss mmm rrr
    FormatDef {
        mnemonic: "ADDQ",
        instr_type: InstructionType::ADDQ,
        fields: &[F::lit(4, 12, 0b0101), F::var(3, 9), F::lit(1, 8, 0), F::var(2, 6), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "SUB",
        instr_type: InstructionType::SUB,
        fields: &[F::lit(4, 12, 0b1001), F::var(3, 9), F::var(3, 6), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "SUBA",
        instr_type: InstructionType::SUBA,
        fields: &[F::lit(4, 12, 0b1001), F::var(3, 9), F::var(1, 8), F::lit(2, 6, 0b11), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "SUBQ",
        instr_type: InstructionType::SUBQ,
        fields: &[F::lit(4, 12, 0b0101), F::var(3, 9), F::lit(1, 8, 1), F::var(2, 6), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "AND",
        instr_type: InstructionType::AND,
        fields: &[F::lit(4, 12, 0b1100), F::var(3, 9), F::var(3, 6), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "OR",
        instr_type: InstructionType::OR,
        fields: &[F::lit(4, 12, 0b1000), F::var(3, 9), F::var(3, 6), F::var(3, 3), F::var(3, 0)],
    },
    // 1011 DDD 1ss mmm rrr
    FormatDef {
        mnemonic: "EOR",
        instr_type: InstructionType::EOR,
        fields: &[F::lit(4, 12, 0b1011), F::var(3, 9), F::lit(1, 8, 1), F::var(2, 6), F::var(3, 3), F::var(3, 0)],
    },
    // 1011 DDD 0ss mmm rrr
    FormatDef {
        mnemonic: "CMP",
        instr_type: InstructionType::CMP,
        fields: &[F::lit(4, 12, 0b1011), F::var(3, 9), F::lit(1, 8, 0), F::var(2, 6), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "CMPI",
        instr_type: InstructionType::CMPI,
        fields: &[F::lit(8, 8, 0b0000_1100), F::var(2, 6), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "NEG",
        instr_type: InstructionType::NEG,
        fields: &[F::lit(8, 8, 0b0100_0100), F::var(2, 6), F::var(3, 3), F::var(3, 0)],
    },
    // 0100 AAA 111 mmm rrr
    FormatDef {
        mnemonic: "LEA",
        instr_type: InstructionType::LEA,
        fields: &[F::lit(4, 12, 0b0100), F::var(3, 9), F::lit(3, 6, 0b111), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "JSR",
        instr_type: InstructionType::JSR,
        fields: &[F::lit(10, 6, 0b0100_1110_10), F::var(3, 3), F::var(3, 0)],
    },
    FormatDef {
        mnemonic: "RTS",
        instr_type: InstructionType::RTS,
        fields: &[F::lit(16, 0, 0x4E75)],
    },
    FormatDef {
        mnemonic: "NOP",
        instr_type: InstructionType::NOP,
        fields: &[F::lit(16, 0, 0x4E71)],
    },
    FormatDef {
        mnemonic: "TRAP",
        instr_type: InstructionType::TRAP,
        fields: &[F::lit(12, 4, 0x4E4), F::var(4, 0)],
    },
    // 0110 cccc dddddddd
    FormatDef {
        mnemonic: "Bcc",
        instr_type: InstructionType::BCC,
        fields: &[F::lit(4, 12, 0b0110), F::var(4, 8), F::var(8, 0)],
    },
    FormatDef {
        mnemonic: "BSR",
        instr_type: InstructionType::BSR,
        fields: &[F::lit(8, 8, 0x61), F::var(8, 0)],
    },
    // Followed by a second 0xFFFF word
    FormatDef {
        mnemonic: "SIMHALT",
        instr_type: InstructionType::SIMHALT,
        fields: &[F::lit(16, 0, 0xFFFF)],
    },
];
