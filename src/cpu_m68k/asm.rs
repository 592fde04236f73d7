//! Assembly of a single instruction line.
//!
//! Labels, equates and comments are resolved by the caller; operands
//! here are registers, addressing modes and literals only.

use std::str::FromStr;

use super::condition::Condition;
use super::ea::{EaMode, Operand};
use super::instruction::{branch_size, AddSub, ArithOp, Instruction, Issue, Severity};
use super::value::{Size, Value};
use crate::bus::{Address, ADDRESS_SPACE};
use crate::util::parse_literal;

/// Splits an operand list on commas outside of quotes and parentheses.
fn split_operands(s: &str) -> Vec<&str> {
    let mut out = vec![];
    let mut depth = 0;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth -= 1,
            ',' if !quoted && depth == 0 => {
                out.push(s[start..i].trim());
                start = i + 1;
            }
            _ => (),
        }
    }
    let last = s[start..].trim();
    if !last.is_empty() || !out.is_empty() {
        out.push(last);
    }
    out
}

fn operand(s: &str) -> Result<Operand, Issue> {
    Operand::from_str(s).map_err(|e| Issue::error(e.to_string()))
}

/// Parses `#n` as a small unsigned number.
fn small_immediate(s: &str, what: &str) -> Result<u8, Issue> {
    s.strip_prefix('#')
        .and_then(parse_literal)
        .and_then(|v| u8::try_from(v).ok())
        .ok_or_else(|| Issue::error(format!("Invalid {} '{}'", what, s)))
}

fn address(s: &str) -> Result<Address, Issue> {
    parse_literal(s)
        .filter(|a| (0..i64::from(ADDRESS_SPACE)).contains(a))
        .map(|a| a as Address)
        .ok_or_else(|| Issue::error(format!("Invalid address '{}'", s)))
}

/// Assembles the operands of a DC directive to bytes. Strings are
/// padded with zeroes to a multiple of the size.
fn dc_data(size: Size, items: &[&str]) -> Result<Vec<u8>, Issue> {
    let mut data = vec![];
    for item in items {
        let is_string = item.len() >= 2 && item.starts_with('\'') && item.ends_with('\'');
        if is_string {
            let mut bytes = item[1..item.len() - 1].as_bytes().to_vec();
            while bytes.len() % size.bytes() as usize != 0 {
                bytes.push(0);
            }
            data.extend(bytes);
            continue;
        }
        let v = parse_literal(item)
            .ok_or_else(|| Issue::error(format!("Invalid constant '{}'", item)))?;
        let v = Value::from_any(size, v).map_err(|e| Issue::error(e.to_string()))?;
        data.extend(v.as_bytes());
    }
    Ok(data)
}

impl Instruction {
    /// Parses one instruction line, e.g. `MOVE.W #1,D0`, to be placed
    /// at `addr`.
    fn parse_text(line: &str, addr: Address) -> Result<Instruction, Issue> {
        let line = line.trim();
        let (head, rest) = line
            .split_once(char::is_whitespace)
            .unwrap_or((line, ""));
        let head = head.to_ascii_uppercase();
        let (base, suffix) = match head.split_once('.') {
            Some((b, s)) => (b, Some(s)),
            None => (head.as_str(), None),
        };
        let explicit_size = suffix
            .map(|s| Size::from_suffix(s).ok_or_else(|| Issue::error(format!("Invalid size '.{}'", s))))
            .transpose()?;
        let size = explicit_size.unwrap_or(Size::Word);
        let ops = split_operands(rest);

        let count = |n: usize| -> Result<(), Issue> {
            if ops.len() != n {
                return Err(Issue::error(format!(
                    "{} expects {} operand(s), got {}",
                    base,
                    n,
                    ops.len()
                )));
            }
            Ok(())
        };
        let two = || -> Result<(Operand, Operand), Issue> {
            count(2)?;
            Ok((operand(ops[0])?, operand(ops[1])?))
        };

        let instr = match base {
            "MOVE" | "MOVEA" => {
                let (src, dst) = two()?;
                if base == "MOVEA" || dst.mode() == EaMode::AddressDirect {
                    Instruction::Movea { size, src, dst }
                } else {
                    Instruction::Move { size, src, dst }
                }
            }
            "ADD" | "SUB" | "ADDA" | "SUBA" => {
                let (src, dst) = two()?;
                let is_sub = base.starts_with("SUB");
                if base.ends_with('A') || dst.mode() == EaMode::AddressDirect {
                    Instruction::ArithA {
                        op: if is_sub { AddSub::Sub } else { AddSub::Add },
                        size,
                        src,
                        dst,
                    }
                } else {
                    Instruction::Arith {
                        op: if is_sub { ArithOp::Sub } else { ArithOp::Add },
                        size,
                        src,
                        dst,
                    }
                }
            }
            "ADDQ" | "SUBQ" => {
                count(2)?;
                Instruction::Quick {
                    op: if base == "SUBQ" {
                        AddSub::Sub
                    } else {
                        AddSub::Add
                    },
                    size,
                    data: small_immediate(ops[0], "quick data")?,
                    dst: operand(ops[1])?,
                }
            }
            "AND" | "OR" => {
                let (src, dst) = two()?;
                Instruction::Arith {
                    op: if base == "AND" {
                        ArithOp::And
                    } else {
                        ArithOp::Or
                    },
                    size,
                    src,
                    dst,
                }
            }
            "EOR" => {
                let (src, dst) = two()?;
                Instruction::Eor { size, src, dst }
            }
            "CMP" | "CMPI" => {
                let (src, dst) = two()?;
                if base == "CMPI"
                    || (src.mode() == EaMode::Immediate && dst.mode() != EaMode::DataDirect)
                {
                    Instruction::Cmpi { size, src, dst }
                } else {
                    Instruction::Cmp { size, src, dst }
                }
            }
            "NEG" => {
                count(1)?;
                Instruction::Neg {
                    size,
                    dst: operand(ops[0])?,
                }
            }
            "LEA" => {
                let (src, dst) = two()?;
                Instruction::Lea { src, dst }
            }
            "JSR" => {
                count(1)?;
                Instruction::Jsr {
                    target: operand(ops[0])?,
                }
            }
            "RTS" | "NOP" | "SIMHALT" => {
                count(0)?;
                match base {
                    "RTS" => Instruction::Rts,
                    "NOP" => Instruction::Nop,
                    _ => Instruction::Simhalt,
                }
            }
            "TRAP" => {
                count(1)?;
                Instruction::Trap {
                    vector: small_immediate(ops[0], "trap vector")?,
                }
            }
            "DC" => {
                if ops.is_empty() {
                    return Err(Issue::error("DC expects at least one constant"));
                }
                Instruction::Dc {
                    size,
                    data: dc_data(size, &ops)?,
                }
            }
            _ if base.starts_with('B') => {
                count(1)?;
                let target = address(ops[0])?;
                let disp_size = explicit_size.unwrap_or_else(|| branch_size(addr, target));
                match &base[1..] {
                    "SR" => Instruction::Bsr { target, disp_size },
                    "RA" => Instruction::Branch {
                        cond: Condition::T,
                        target,
                        disp_size,
                    },
                    cc => match Condition::from_str(cc) {
                        Ok(cond) if cond != Condition::T && cond != Condition::F => {
                            Instruction::Branch {
                                cond,
                                target,
                                disp_size,
                            }
                        }
                        _ => return Err(Issue::error(format!("Unknown instruction '{}'", base))),
                    },
                }
            }
            _ => return Err(Issue::error(format!("Unknown instruction '{}'", base))),
        };

        Ok(instr)
    }

    /// Assembles one instruction line to be placed at `addr`.
    ///
    /// Fails with the issues found if any of them is an error; warnings
    /// alone do not fail.
    pub fn from_text(line: &str, addr: Address) -> Result<Instruction, Vec<Issue>> {
        let instr = Self::parse_text(line, addr).map_err(|i| vec![i])?.normalized();
        let issues = instr.validate();
        if issues.iter().any(|i| i.severity == Severity::Error) {
            return Err(issues);
        }
        Ok(instr)
    }

    /// All issues, including warnings, of an instruction line.
    pub fn lint(line: &str, addr: Address) -> Vec<Issue> {
        match Self::parse_text(line, addr) {
            Ok(instr) => instr.validate(),
            Err(issue) => vec![issue],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    fn asm(line: &str, addr: Address) -> Vec<u8> {
        Instruction::from_text(line, addr)
            .unwrap()
            .assemble(addr)
            .unwrap()
    }

    #[test]
    fn operand_split() {
        assert_eq!(split_operands("D0, D1"), vec!["D0", "D1"]);
        assert_eq!(split_operands("#',',D1"), vec!["#','", "D1"]);
        assert_eq!(split_operands(""), Vec::<&str>::new());
        assert_eq!(split_operands("(A0)+,-(A1)"), vec!["(A0)+", "-(A1)"]);
    }

    #[test]
    fn basic() {
        assert_eq!(asm("ADD.W D1,D0", 0), hex!("D041"));
        assert_eq!(asm("add.w d1,d0", 0), hex!("D041"));
        assert_eq!(asm("CMP.B D0,D1", 0), hex!("B200"));
        assert_eq!(asm("MOVE.L #$12345678,($1000).W", 0), hex!("21FC 1234 5678 1000"));
        assert_eq!(asm("MOVE D0,D1", 0), hex!("3200"));
        assert_eq!(asm("TRAP #15", 0), hex!("4E4F"));
        assert_eq!(asm("RTS", 0), hex!("4E75"));
        assert_eq!(asm("SIMHALT", 0), hex!("FFFF FFFF"));
        assert_eq!(asm("LEA $2000,A0", 0), hex!("41F8 2000"));
        assert_eq!(asm("JSR ($1234).L", 0), hex!("4EB9 0000 1234"));
        assert_eq!(asm("NEG.L -(SP)", 0), hex!("44A7"));
        assert_eq!(asm("ADDQ.W #1,D0", 0), hex!("5240"));
        assert_eq!(asm("SUBQ.L #8,A0", 0), hex!("5188"));
        assert_eq!(asm("EOR.B D0,D1", 0), hex!("B101"));
        assert_eq!(asm("CMPI.W #$FF,D0", 0), hex!("0C40 00FF"));
    }

    #[test]
    fn aliases() {
        // MOVE to An is MOVEA, ADD to An is ADDA
        assert_eq!(asm("MOVE.L D1,A0", 0), hex!("2041"));
        assert_eq!(asm("ADD.W D1,A0", 0), hex!("D0C1"));
        assert_eq!(asm("SUB.L D1,A0", 0), hex!("91C1"));
        // CMP #imm to memory is CMPI
        assert_eq!(asm("CMP.B #1,(A0)", 0), hex!("0C10 0001"));
    }

    #[test]
    fn branches() {
        assert_eq!(asm("BRA $1006", 0x1000), hex!("6004"));
        assert_eq!(asm("BEQ $1000", 0x1000), hex!("67FE"));
        assert_eq!(asm("BNE $1002", 0x1000), hex!("6600 0000"));
        assert_eq!(asm("BHS $1010", 0x1000), hex!("640E"));
        assert_eq!(asm("BSR $1100", 0x1000), hex!("6100 00FE"));
        assert_eq!(asm("BRA.L $1006", 0x1000), hex!("60FF 0000 0004"));
        assert_eq!(asm("BGT $30000", 0x1000), hex!("6EFF 0002 EFFE"));
        assert!(Instruction::from_text("BRA.S $2000", 0x1000)
            .unwrap()
            .assemble(0x1000)
            .is_err());
        assert!(Instruction::from_text("BT $1000", 0x1000).is_err());
    }

    #[test]
    fn dc() {
        assert_eq!(asm("DC.B 1,2,'AB',$FF", 0), hex!("01 02 41 42 FF"));
        assert_eq!(asm("DC.W -1,'A'", 0), hex!("FFFF 4100"));
        assert_eq!(asm("DC.L 'ABCD',1", 0), hex!("41424344 00000001"));
        assert_eq!(asm("DC.B 'Hello, World',0", 0), b"Hello, World\0");
        assert!(Instruction::from_text("DC.B 256", 0).is_err());
        let i = Instruction::from_text("DC.B 1,2,3", 0).unwrap();
        assert_eq!(i.byte_length(), 3);
        assert_eq!(i.word_length(), 2);
    }

    #[test]
    fn errors() {
        let err = |line: &str| Instruction::from_text(line, 0).unwrap_err();
        assert_eq!(err("FOO D0").len(), 1);
        assert!(err("MOVE.X D0,D1")[0].message.contains("size"));
        assert!(err("MOVE D0")[0].message.contains("operand"));
        assert!(err("MOVE D0,#1")[0].message.contains("Destination"));
        assert!(err("MOVE D9,D1")[0].message.contains("Cannot parse"));
        assert!(err("ADDQ #9,D0")[0].message.contains("1 - 8"));
        assert!(err("MOVEA.B D0,A0")
            .iter()
            .all(|i| i.severity == Severity::Error));
        assert!(err("TRAP #16")[0].message.contains("vector"));
        assert!(err("LEA (A0)+,A1")[0].message.contains("Source"));
        assert!(err("MOVE.W A0,D0")[0].message.contains("Source"));
        assert!(err("MOVE.L A1,(A2)")[0].message.contains("Source"));
        assert!(err("MOVEA.W A0,A1")[0].message.contains("Source"));
        assert!(err("MOVE.L SP,A1")[0].message.contains("Source"));
        assert!(Instruction::from_text("ADDA.L A0,A1", 0).is_ok());
    }

    #[test]
    fn lint_warnings() {
        let issues = Instruction::lint("MOVE.W D0,($12345).W", 0);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(Instruction::from_text("MOVE.W D0,($12345).W", 0).is_ok());
        assert!(Instruction::lint("MOVE.W D0,D1", 0).is_empty());
    }

    #[test]
    fn display_reassembles() {
        for (line, addr) in [
            ("MOVE.B (A0)+,-(A1)", 0),
            ("MOVEA.W #$FFFF,A3", 0),
            ("ADD.L D0,(A1)", 0),
            ("SUBA.L ($123456).L,A7", 0),
            ("SUBQ.B #3,($0010).W", 0),
            ("OR.W #$FFFE,D4", 0),
            ("EOR.L D5,-(A0)", 0),
            ("CMPI.L #$DEADBEEF,(A6)", 0),
            ("NEG.B D2", 0),
            ("LEA (A2),A3", 0),
            ("JSR ($2000).W", 0),
            ("TRAP #15", 0),
            ("BLE.W $002000", 0x1000),
            ("BSR.S $000FF0", 0x1000),
            ("NOP", 0),
        ] {
            let i = Instruction::from_text(line, addr).unwrap();
            assert_eq!(i.to_string(), line);
            assert_eq!(Instruction::from_text(&i.to_string(), addr).unwrap(), i);
        }
    }

    #[test]
    fn signed_immediates() {
        let asm_eq = |a: &str, b: &str| {
            assert_eq!(
                Instruction::from_text(a, 0).unwrap(),
                Instruction::from_text(b, 0).unwrap()
            )
        };
        asm_eq("OR.W #-$2,D4", "OR.W #$FFFE,D4");
        asm_eq("MOVE.B #-1,D0", "MOVE.B #$FF,D0");
        asm_eq("CMPI.L #-1,(A0)", "CMPI.L #$FFFFFFFF,(A0)");
        asm_eq("MOVEA.W #-32768,A1", "MOVEA.W #$8000,A1");
        assert_eq!(
            Instruction::from_text("MOVE.B #-1,D0", 0).unwrap().to_string(),
            "MOVE.B #$FF,D0"
        );
    }
}
