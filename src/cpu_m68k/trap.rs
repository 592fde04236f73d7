//! TRAP #15 console I/O tasks.

use std::cell::RefCell;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

use anyhow::Result;
use log::debug;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use strum::Display;
use thiserror::Error;

use super::regs::{Register, RegisterFile};
use super::value::{Size, Value};
use crate::bus::{Address, Bus};

/// The trap vector serviced by the simulator.
pub const IO_VECTOR: u8 = 15;

/// Line ending written by the newline variants of the display tasks.
const NEWLINE: &[u8] = b"\r\n";

/// Maximum length of a line read by ReadString.
const MAX_LINE: usize = 80;

/// Task numbers, selected by D0.
#[derive(FromPrimitive, Display, Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrapTask {
    /// D1.W characters at (A1), followed by CR/LF
    DisplayString = 0,
    /// D1.W characters at (A1)
    DisplayStringNoNewline = 1,
    /// Line into (A1), null terminated; length into D1.W
    ReadString = 2,
    /// D1.L as signed decimal
    DisplayNumber = 3,
    /// Signed decimal into D1.L
    ReadNumber = 4,
    /// Character into D1.B
    ReadChar = 5,
    /// D1.B as a character
    DisplayChar = 6,
    Terminate = 9,
    /// Null-terminated string at (A1), followed by CR/LF
    DisplayNullTermString = 13,
    /// Null-terminated string at (A1)
    DisplayNullTermStringNoNewline = 14,
    /// D1.L unsigned in base D2.B
    DisplayNumberBase = 15,
}

#[derive(Debug, Error, Clone, Eq, PartialEq)]
pub enum TrapError {
    #[error("Unsupported trap vector {0}")]
    UnknownVector(u8),
    #[error("Unsupported TRAP #15 task {0}")]
    UnknownTask(u32),
    #[error("Number base {0} not in 2 - 36")]
    BadBase(u8),
    #[error("Invalid console input: {0}")]
    BadInput(String),
}

/// What the CPU does after the trap.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum TrapOutcome {
    Continue,
    Halt,
}

/// Console the I/O tasks read from and write to.
pub struct Console {
    out: Box<dyn Write>,
    input: Box<dyn BufRead>,
}

impl Console {
    pub fn new(out: Box<dyn Write>, input: Box<dyn BufRead>) -> Self {
        Self { out, input }
    }

    /// Standard output and standard input.
    pub fn stdio() -> Self {
        Self::new(Box::new(io::stdout()), Box::new(io::BufReader::new(io::stdin())))
    }

    /// Console writing into a shared buffer, reading the given input.
    pub fn captured(input: &str) -> (Self, SharedBuffer) {
        let buf = SharedBuffer::default();
        (
            Self::new(
                Box::new(buf.clone()),
                Box::new(io::Cursor::new(input.as_bytes().to_vec())),
            ),
            buf,
        )
    }

    fn write_all(&mut self, bytes: &[u8]) -> Result<()> {
        self.out.write_all(bytes)?;
        self.out.flush()?;
        Ok(())
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(TrapError::BadInput("end of input".to_string()).into());
        }
        let trimmed = line.trim_end_matches(&['\r', '\n'][..]).len();
        line.truncate(trimmed);
        Ok(line)
    }

    fn read_byte(&mut self) -> Result<u8> {
        let buf = self.input.fill_buf()?;
        let Some(&b) = buf.first() else {
            return Err(TrapError::BadInput("end of input".to_string()).into());
        };
        self.input.consume(1);
        Ok(b)
    }
}

impl Default for Console {
    fn default() -> Self {
        Self::stdio()
    }
}

/// Clonable in-memory writer; clones share the contents.
#[derive(Clone, Default)]
pub struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> Vec<u8> {
        self.0.borrow().clone()
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.0.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Formats an unsigned value in the given base, upper case digits.
fn format_base(mut val: u32, base: u32) -> String {
    if val == 0 {
        return "0".to_string();
    }
    let mut digits = vec![];
    while val > 0 {
        digits.push(std::char::from_digit(val % base, base).unwrap_or('?'));
        val /= base;
    }
    digits.iter().rev().collect::<String>().to_ascii_uppercase()
}

/// Reads a null-terminated string.
fn read_cstring(bus: &impl Bus, mut addr: Address) -> Result<Vec<u8>> {
    let mut out = vec![];
    loop {
        let b = bus.read_value(addr, Size::Byte)?.as_unsigned() as u8;
        if b == 0 {
            return Ok(out);
        }
        out.push(b);
        addr += 1;
    }
}

/// Services TRAP #15: performs the task selected by D0.
pub fn io_task(
    regs: &mut RegisterFile,
    bus: &mut impl Bus,
    console: &mut Console,
) -> Result<TrapOutcome> {
    let task = TrapTask::from_u32(regs.d[0]).ok_or(TrapError::UnknownTask(regs.d[0]))?;
    debug!("TRAP #15 task {} ({})", regs.d[0], task);

    let a1 = regs.a[1];
    let d1 = regs.d[1];
    match task {
        TrapTask::DisplayString | TrapTask::DisplayStringNoNewline => {
            let mut s = bus.read_bytes(a1, d1 as u16 as usize)?;
            if task == TrapTask::DisplayString {
                s.extend_from_slice(NEWLINE);
            }
            console.write_all(&s)?;
        }
        TrapTask::DisplayNullTermString | TrapTask::DisplayNullTermStringNoNewline => {
            let mut s = read_cstring(bus, a1)?;
            if task == TrapTask::DisplayNullTermString {
                s.extend_from_slice(NEWLINE);
            }
            console.write_all(&s)?;
        }
        TrapTask::DisplayNumber => {
            console.write_all((d1 as i32).to_string().as_bytes())?;
        }
        TrapTask::DisplayChar => {
            console.write_all(&[d1 as u8])?;
        }
        TrapTask::DisplayNumberBase => {
            let base = regs.d[2] as u8;
            if !(2..=36).contains(&base) {
                return Err(TrapError::BadBase(base).into());
            }
            console.write_all(format_base(d1, base.into()).as_bytes())?;
        }
        TrapTask::ReadString => {
            let line = console.read_line()?;
            let bytes = &line.as_bytes()[..line.len().min(MAX_LINE)];
            bus.write_bytes(a1, bytes)?;
            bus.write_bytes(a1 + bytes.len() as Address, &[0])?;
            regs.write_low(
                Register::D1,
                Value::truncate(Size::Word, bytes.len() as u32),
            )?;
        }
        TrapTask::ReadNumber => {
            let line = console.read_line()?;
            let n: i32 = line
                .trim()
                .parse()
                .map_err(|_| TrapError::BadInput(line.clone()))?;
            regs.d[1] = n as u32;
        }
        TrapTask::ReadChar => {
            let b = console.read_byte()?;
            regs.write_low(Register::D1, Value::truncate(Size::Byte, b.into()))?;
        }
        TrapTask::Terminate => return Ok(TrapOutcome::Halt),
    }
    Ok(TrapOutcome::Continue)
}
