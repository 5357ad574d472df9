//! Chip-level operations the command engine drives.  Implementations own the link to the target
//! and the target-specific acquisition sequences.
use crate::status::Error;

pub mod msp430;
#[cfg(any(test, feature = "test"))]
pub mod fake;

/// Width of a single memory access
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Width {
    Byte,
    Word,
}

impl Width {
    pub const fn bytes(self) -> u32 {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CpuState {
    Halted,
    Running,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EraseScope {
    /// Main and information memory
    Mass,
    /// Main memory only
    Main,
    /// The segment containing the address
    Segment,
}

/// Breakpoint slot selector.  `ClearAll` disables every slot at once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Breakpoint {
    Slot(u32),
    ClearAll,
}

pub trait Device {
    /// Take the target under debug control.  Fails with `FuseBlown` before touching anything
    /// else when the security fuse is blown.  Returns the chip id.
    fn attach(&mut self) -> Result<u32, Error>;
    /// Let the target run from `resume_pc` and release the pins.  `0xffff` resumes through a
    /// reset, `0xfffe` leaves the PC untouched.
    fn detach(&mut self, resume_pc: u32) -> Result<(), Error>;
    fn chip_id(&mut self) -> Result<u32, Error>;
    /// Power-up clear
    fn reset(&mut self) -> Result<(), Error>;
    fn halt(&mut self) -> Result<(), Error>;
    fn resume(&mut self) -> Result<(), Error>;
    fn single_step(&mut self) -> Result<(), Error>;
    fn cpu_state(&mut self) -> Result<CpuState, Error>;

    /// Read one aligned byte or word.  Byte reads return the byte in the low half.
    fn read_mem(&mut self, width: Width, address: u32) -> Result<u16, Error>;
    fn write_mem(&mut self, width: Width, address: u32, value: u16) -> Result<(), Error>;
    /// Program consecutive flash words starting at the even `address`
    fn write_flash_words(&mut self, address: u32, words: &[u16]) -> Result<(), Error>;
    fn erase(&mut self, scope: EraseScope, address: u32) -> Result<(), Error>;

    fn read_reg(&mut self, index: u32) -> Result<u32, Error>;
    fn write_reg(&mut self, index: u32, value: u32) -> Result<(), Error>;
    fn config_fuses(&mut self) -> Result<u8, Error>;
    /// Arm slot `bp` at `address`, or clear all slots.  Out-of-range slots are `TooManyBreaks`.
    fn set_breakpoint(&mut self, bp: Breakpoint, address: u32) -> Result<(), Error>;

    /// One past the highest address the target bus reaches
    fn address_limit(&self) -> u64 {
        1 << 32
    }

    /// `AddressRange` unless all of `[address, address + len)` is reachable
    fn check_range(&self, address: u32, len: u32) -> Result<(), Error> {
        if address as u64 + len as u64 > self.address_limit() {
            return Err(Error::AddressRange { address, len });
        }
        Ok(())
    }
}
