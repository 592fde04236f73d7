use super::{Address, Bus, ADDRESS_MASK};

use std::cell::RefCell;
use std::collections::HashMap;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TraceEntry {
    pub addr: Address,
    pub access: Access,
    pub val: u8,
}

/// Sparse bus for tests. Unwritten memory reads as zero.
pub struct Testbus {
    mem: HashMap<Address, u8>,
    trace: RefCell<Vec<TraceEntry>>,
    trace_enabled: bool,
}

impl Testbus {
    pub fn new() -> Self {
        Testbus {
            // Need allocation here, too large for stack.
            mem: HashMap::new(),
            trace: RefCell::new(vec![]),
            trace_enabled: false,
        }
    }

    /// Creates a bus with `bytes` placed at `addr`.
    pub fn from_bytes(addr: Address, bytes: &[u8]) -> Self {
        let mut b = Self::new();
        for (i, &v) in bytes.iter().enumerate() {
            b.write(addr + i as Address, v);
        }
        b
    }

    pub fn reset_trace(&mut self) {
        self.trace.borrow_mut().clear();
        self.trace_enabled = true;
    }

    pub fn get_trace(&self) -> Vec<TraceEntry> {
        self.trace.borrow().clone()
    }
}

impl Default for Testbus {
    fn default() -> Self {
        Self::new()
    }
}

impl Bus for Testbus {
    fn read(&self, addr: Address) -> u8 {
        assert_eq!(addr & ADDRESS_MASK, addr);

        let val = *self.mem.get(&addr).unwrap_or(&0);
        if self.trace_enabled {
            self.trace.borrow_mut().push(TraceEntry {
                addr,
                access: Access::Read,
                val,
            });
        }
        val
    }

    fn write(&mut self, addr: Address, val: u8) {
        assert_eq!(addr & ADDRESS_MASK, addr);

        if self.trace_enabled {
            self.trace.borrow_mut().push(TraceEntry {
                addr,
                access: Access::Write,
                val,
            });
        }
        self.mem.insert(addr, val);
    }
}
