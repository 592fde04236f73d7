pub mod listfile;
pub mod srecord;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use strum::Display;

use crate::bus::memory::Memory;
use crate::bus::Address;
use listfile::ListFile;

/// Program file formats.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Display, clap::ValueEnum)]
pub enum Format {
    /// JSON list file
    Json,
    /// Motorola S-records
    Srec,
    /// Raw memory image
    Image,
}

impl Format {
    /// Guesses the format from the file extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Format::Json),
            "s68" | "srec" | "s" => Some(Format::Srec),
            "bin" => Some(Format::Image),
            _ => None,
        }
    }
}

/// A loaded program: memory contents and the start address.
pub struct Program {
    pub memory: Memory,
    pub start: Address,
    /// Absent for memory images
    pub listing: Option<ListFile>,
}

impl Program {
    pub fn from_listfile(listing: ListFile) -> Result<Self> {
        let mut memory = Memory::new();
        listing.load_into(&mut memory)?;
        Ok(Self {
            memory,
            start: listing.starting_execution_address,
            listing: Some(listing),
        })
    }

    pub fn from_image(image: &[u8]) -> Result<Self> {
        Ok(Self {
            memory: Memory::from_image(image)?,
            start: 0,
            listing: None,
        })
    }
}

/// Loads a program file.
pub fn load_file(path: &Path, format: Format) -> Result<Program> {
    let ctx = || format!("Failed to load {} as {}", path.display(), format);
    match format {
        Format::Json => {
            let text = fs::read_to_string(path).with_context(ctx)?;
            Program::from_listfile(ListFile::from_json(&text).with_context(ctx)?)
        }
        Format::Srec => {
            let text = fs::read_to_string(path).with_context(ctx)?;
            Program::from_listfile(srecord::parse(&text).with_context(ctx)?)
        }
        Format::Image => Program::from_image(&fs::read(path).with_context(ctx)?).with_context(ctx),
    }
}
