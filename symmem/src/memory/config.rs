use crate::error::{Error, Result};
use bitflags::bitflags;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

/// Address space a memory model stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryKind {
    Memory,
    Registers,
}

bitflags! {
    #[derive(Clone, Debug, PartialEq, Copy, PartialOrd, Ord, Eq, Hash)]
    pub struct MemoryOptions: u8 {
        /// Fault on accesses that may leave the mapped regions.
        const CHECK_PERMISSIONS       = 0b00000001;
        /// Never-written bytes read as zero instead of fresh symbols.
        const ZERO_FILL_UNCONSTRAINED = 0b00000010;
    }
}

impl Default for MemoryOptions {
    fn default() -> Self {
        MemoryOptions::CHECK_PERMISSIONS
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryConfig {
    pub endian: Endian,
    pub options: MemoryOptions,
    /// Largest accepted upper bound of a symbolic store size.
    pub max_symbolic_size: u64,
    /// Largest accepted concrete access size.
    pub max_concrete_size: u64,
    pub page_size: u64,
    pub addr_bits: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        MemoryConfig {
            endian: Endian::Little,
            options: MemoryOptions::default(),
            max_symbolic_size: 0x2000,
            max_concrete_size: 0x100_0000,
            page_size: 0x1000,
            addr_bits: 64,
        }
    }
}

impl MemoryConfig {
    pub fn with_options(mut self, options: MemoryOptions) -> Self {
        self.options = options;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !self.page_size.is_power_of_two() {
            return Err(Error::InvalidArguments(format!(
                "page size {:#x} is not a power of 2",
                self.page_size
            )));
        }
        if self.addr_bits == 0 || self.addr_bits > 64 {
            return Err(Error::InvalidArguments(format!(
                "{}-bit addresses are not supported",
                self.addr_bits
            )));
        }
        Ok(())
    }
}
