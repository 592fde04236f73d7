use num::traits::{WrappingShl, WrappingShr};
use num::Integer;
use std::mem::size_of_val;

/// Sign-extend a value
pub fn sign_extend<T: Integer + WrappingShl + WrappingShr>(val: T, nbits: u32) -> T {
    let notherbits = size_of_val(&val) as u32 * 8 - nbits;
    val.wrapping_shl(notherbits).wrapping_shr(notherbits)
}

/// Parses a numeric literal in 68000 assembler notation.
///
/// Accepts `$hex`, `%binary`, (optionally negative) decimal and
/// quoted character strings of up to 4 characters, packed big-endian.
pub fn parse_literal(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Some(neg) = s.strip_prefix('-') {
        return parse_literal(neg).map(|v| -v);
    }
    if let Some(hex) = s.strip_prefix('$') {
        return i64::from_str_radix(hex, 16).ok();
    }
    if let Some(bin) = s.strip_prefix('%') {
        return i64::from_str_radix(bin, 2).ok();
    }
    if s.len() >= 2 && s.starts_with('\'') && s.ends_with('\'') {
        let chars = s[1..s.len() - 1].as_bytes();
        if chars.is_empty() || chars.len() > 4 {
            return None;
        }
        return Some(chars.iter().fold(0, |acc, &c| acc << 8 | i64::from(c)));
    }
    if s.chars().all(|c| c.is_ascii_digit()) && !s.is_empty() {
        return s.parse().ok();
    }
    None
}

/// Parses a string of hex digit pairs into bytes.
pub fn parse_hex_bytes(s: &str) -> Option<Vec<u8>> {
    if s.len() % 2 != 0 || !s.is_ascii() {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}
