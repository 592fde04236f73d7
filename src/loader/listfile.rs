use std::collections::BTreeMap;

use anyhow::Result;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::bus::{Address, Bus, ADDRESS_SPACE};
use crate::util::parse_hex_bytes;

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum ListFileError {
    #[error("Invalid data address '{0}'")]
    BadAddress(String),
    #[error("Invalid hex data at {addr}: '{data}'")]
    BadData { addr: String, data: String },
    #[error("Data at ${addr:06X} ({len} bytes) exceeds the address space")]
    OutOfBounds { addr: Address, len: usize },
}

/// Assembled program: memory contents, symbols and the entry point.
///
/// Serialized as JSON. `data` maps decimal addresses to hex strings of
/// the bytes placed there.
#[derive(Debug, Default, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct ListFile {
    #[serde(default)]
    pub data: BTreeMap<String, String>,

    #[serde(default)]
    pub symbols: BTreeMap<String, Address>,

    #[serde(rename = "startingExecutionAddress", default)]
    pub starting_execution_address: Address,
}

impl ListFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Places bytes at an address, replacing an entry at the same address.
    pub fn insert_data(&mut self, addr: Address, bytes: &[u8]) {
        self.data.insert(
            addr.to_string(),
            bytes.iter().map(|b| format!("{:02X}", b)).join(""),
        );
    }

    pub fn define_symbol(&mut self, name: &str, addr: Address) {
        self.symbols.insert(name.to_string(), addr);
    }

    pub fn symbol(&self, name: &str) -> Option<Address> {
        self.symbols.get(name).copied()
    }

    /// Parsed data entries, in ascending address order.
    pub fn entries(&self) -> Result<Vec<(Address, Vec<u8>)>, ListFileError> {
        let mut out = self
            .data
            .iter()
            .map(|(a, d)| {
                let addr = a
                    .parse::<Address>()
                    .map_err(|_| ListFileError::BadAddress(a.clone()))?;
                let bytes = parse_hex_bytes(d).ok_or_else(|| ListFileError::BadData {
                    addr: a.clone(),
                    data: d.clone(),
                })?;
                if u64::from(addr) + bytes.len() as u64 > u64::from(ADDRESS_SPACE) {
                    return Err(ListFileError::OutOfBounds {
                        addr,
                        len: bytes.len(),
                    });
                }
                Ok((addr, bytes))
            })
            .collect::<Result<Vec<_>, _>>()?;
        out.sort_by_key(|(a, _)| *a);
        Ok(out)
    }

    /// Copies every data entry to memory.
    pub fn load_into(&self, bus: &mut impl Bus) -> Result<()> {
        for (addr, bytes) in self.entries()? {
            bus.write_bytes(addr, &bytes)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::testbus::Testbus;
    use hex_literal::hex;

    const JSON: &str = r#"{
        "data": {"4096": "303C000E", "8192": "414243"},
        "symbols": {"start": 4096, "msg": 8192},
        "startingExecutionAddress": 4096
    }"#;

    #[test]
    fn parse() {
        let l = ListFile::from_json(JSON).unwrap();
        assert_eq!(l.starting_execution_address, 0x1000);
        assert_eq!(l.symbol("msg"), Some(0x2000));
        assert_eq!(l.symbol("nope"), None);
        assert_eq!(
            l.entries().unwrap(),
            vec![
                (0x1000, hex!("303C000E").to_vec()),
                (0x2000, b"ABC".to_vec())
            ]
        );
    }

    #[test]
    fn load() {
        let l = ListFile::from_json(JSON).unwrap();
        let mut bus = Testbus::new();
        l.load_into(&mut bus).unwrap();
        assert_eq!(bus.read32(0x1000), Ok(0x303C_000E));
        assert_eq!(bus.read_bytes(0x2000, 3).unwrap(), b"ABC");
    }

    #[test]
    fn roundtrip_json() {
        let mut l = ListFile::new();
        l.insert_data(0x400, &[0xDE, 0xAD]);
        l.define_symbol("loop", 0x400);
        l.starting_execution_address = 0x400;
        let json = l.to_json().unwrap();
        assert!(json.contains("\"1024\": \"DEAD\""), "{}", json);
        assert!(json.contains("startingExecutionAddress"));
        assert_eq!(ListFile::from_json(&json).unwrap(), l);
    }

    #[test]
    fn missing_fields_default() {
        let l = ListFile::from_json("{}").unwrap();
        assert!(l.data.is_empty());
        assert_eq!(l.starting_execution_address, 0);
    }

    #[test]
    fn bad_entries() {
        let mut l = ListFile::new();
        l.data.insert("x".to_string(), "00".to_string());
        assert_eq!(
            l.entries(),
            Err(ListFileError::BadAddress("x".to_string()))
        );

        let mut l = ListFile::new();
        l.data.insert("16".to_string(), "0".to_string());
        assert!(matches!(l.entries(), Err(ListFileError::BadData { .. })));

        let mut l = ListFile::new();
        l.insert_data(0xFF_FFFF, &[1, 2]);
        assert!(matches!(
            l.entries(),
            Err(ListFileError::OutOfBounds { .. })
        ));
        assert!(l.load_into(&mut Testbus::new()).is_err());
    }
}
