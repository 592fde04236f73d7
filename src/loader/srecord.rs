//! Motorola S-record import.

use anyhow::Result;
use log::{debug, warn};
use thiserror::Error;

use super::listfile::ListFile;
use crate::bus::Address;
use crate::util::parse_hex_bytes;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum SRecordError {
    #[error("Line {line}: not an S-record")]
    Syntax { line: usize },
    #[error("Line {line}: unsupported record type S{ty}")]
    UnknownType { line: usize, ty: char },
    #[error("Line {line}: byte count {count} does not match the record length")]
    Length { line: usize, count: usize },
}

/// Address width in bytes of each record type.
fn address_bytes(ty: char) -> Option<usize> {
    match ty {
        '0' | '1' | '5' | '9' => Some(2),
        '2' | '6' | '8' => Some(3),
        '3' | '7' => Some(4),
        _ => None,
    }
}

/// Parses S-records into a list file. Data records become data
/// entries, the termination record sets the start address.
///
/// Checksum mismatches are logged, not rejected.
pub fn parse(text: &str) -> Result<ListFile> {
    let mut out = ListFile::new();

    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let mut chars = line.chars();
        if chars.next().map(|c| c.to_ascii_uppercase()) != Some('S') {
            return Err(SRecordError::Syntax { line: line_no }.into());
        }
        let ty = chars.next().ok_or(SRecordError::Syntax { line: line_no })?;
        let addr_len =
            address_bytes(ty).ok_or(SRecordError::UnknownType { line: line_no, ty })?;
        let bytes =
            parse_hex_bytes(chars.as_str()).ok_or(SRecordError::Syntax { line: line_no })?;

        // count, address, checksum
        let Some((&count, rest)) = bytes.split_first() else {
            return Err(SRecordError::Syntax { line: line_no }.into());
        };
        if usize::from(count) != rest.len() || rest.len() < addr_len + 1 {
            return Err(SRecordError::Length {
                line: line_no,
                count: count.into(),
            }
            .into());
        }

        let (body, checksum) = bytes.split_at(bytes.len() - 1);
        let sum = body.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
        if !sum != checksum[0] {
            warn!(
                "S-record line {}: checksum {:02X}, expected {:02X}",
                line_no, checksum[0], !sum
            );
        }

        let addr = rest[..addr_len]
            .iter()
            .fold(0 as Address, |acc, &b| acc << 8 | Address::from(b));
        let data = &rest[addr_len..rest.len() - 1];

        match ty {
            '0' => debug!("S-record header: {}", String::from_utf8_lossy(data)),
            '1' | '2' | '3' => out.insert_data(addr, data),
            '5' | '6' => debug!("S-record count: {} records", addr),
            _ => out.starting_execution_address = addr,
        }
    }

    Ok(out)
}
