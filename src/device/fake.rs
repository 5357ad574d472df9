//! Simulated target for tests and dry runs.  Memory is a flat 64 KiB space with a flash region
//! that only accepts programming through `write_flash_words` and reads back erased as `0xff`.
use alloc::vec;
use alloc::vec::Vec;

use crate::device::{Breakpoint, CpuState, Device, EraseScope, Width};
use crate::status::Error;

const MEMORY_SIZE: usize = 0x1_0000;
const SEGMENT_SIZE: u32 = 512;

/// One call that reached the simulated hardware
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Access {
    Read(Width, u32),
    Write(Width, u32, u16),
    Flash { address: u32, words: usize },
    Erase(EraseScope, u32),
    Control,
}

pub struct FakeTarget {
    pub memory: Vec<u8>,
    pub flash_start: u32,
    pub registers: [u32; 16],
    pub breakpoints: Vec<Option<u32>>,
    pub fuse_blown: bool,
    pub halted: bool,
    pub chip_id: u32,
    pub config_fuses: u8,
    /// Any access touching this address fails with `TransferFailed`
    pub fail_at: Option<u32>,
    pub accesses: Vec<Access>,
}

impl FakeTarget {
    pub fn new() -> Self {
        let mut memory = vec![0; MEMORY_SIZE];
        let flash_start = 0xc000;
        memory[flash_start as usize..].fill(0xff);
        Self {
            memory,
            flash_start,
            registers: [0; 16],
            breakpoints: vec![None; 3],
            fuse_blown: false,
            halted: true,
            chip_id: 0xf249,
            config_fuses: 0x00,
            fail_at: None,
            accesses: Vec::new(),
        }
    }

    pub fn active_breakpoints(&self) -> usize {
        self.breakpoints.iter().filter(|b| b.is_some()).count()
    }

    fn is_flash(&self, address: u32) -> bool {
        address >= self.flash_start
    }

    fn touch(&self, address: u32, len: u32) -> Result<usize, Error> {
        self.check_range(address, len)?;
        if let Some(bad) = self.fail_at {
            if (address..address + len).contains(&bad) {
                return Err(Error::TransferFailed);
            }
        }
        Ok(address as usize)
    }

    fn aligned(width: Width, address: u32) -> Result<(), Error> {
        if width == Width::Word && address & 1 != 0 {
            return Err(Error::TransferFailed);
        }
        Ok(())
    }
}

impl Default for FakeTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl Device for FakeTarget {
    fn attach(&mut self) -> Result<u32, Error> {
        self.accesses.push(Access::Control);
        if self.fuse_blown {
            return Err(Error::FuseBlown);
        }
        self.halted = true;
        Ok(self.chip_id)
    }

    fn detach(&mut self, resume_pc: u32) -> Result<(), Error> {
        self.accesses.push(Access::Control);
        if resume_pc != 0xffff && resume_pc != 0xfffe {
            self.registers[0] = resume_pc;
        }
        self.halted = false;
        Ok(())
    }

    fn chip_id(&mut self) -> Result<u32, Error> {
        self.accesses.push(Access::Control);
        Ok(self.chip_id)
    }

    fn reset(&mut self) -> Result<(), Error> {
        self.accesses.push(Access::Control);
        self.registers = [0; 16];
        Ok(())
    }

    fn halt(&mut self) -> Result<(), Error> {
        self.accesses.push(Access::Control);
        self.halted = true;
        Ok(())
    }

    fn resume(&mut self) -> Result<(), Error> {
        self.accesses.push(Access::Control);
        self.halted = false;
        Ok(())
    }

    fn single_step(&mut self) -> Result<(), Error> {
        self.accesses.push(Access::Control);
        self.registers[0] = self.registers[0].wrapping_add(2) & 0xffff;
        Ok(())
    }

    fn cpu_state(&mut self) -> Result<CpuState, Error> {
        self.accesses.push(Access::Control);
        Ok(if self.halted { CpuState::Halted } else { CpuState::Running })
    }

    fn read_mem(&mut self, width: Width, address: u32) -> Result<u16, Error> {
        self.accesses.push(Access::Read(width, address));
        Self::aligned(width, address)?;
        match width {
            Width::Byte => {
                let a = self.touch(address, 1)?;
                Ok(self.memory[a] as u16)
            }
            Width::Word => {
                let a = self.touch(address, 2)?;
                Ok(u16::from_le_bytes([self.memory[a], self.memory[a + 1]]))
            }
        }
    }

    fn write_mem(&mut self, width: Width, address: u32, value: u16) -> Result<(), Error> {
        self.accesses.push(Access::Write(width, address, value));
        Self::aligned(width, address)?;
        if self.is_flash(address) {
            return Err(Error::TransferFailed);
        }
        match width {
            Width::Byte => {
                let a = self.touch(address, 1)?;
                self.memory[a] = value as u8;
            }
            Width::Word => {
                let a = self.touch(address, 2)?;
                self.memory[a..a + 2].copy_from_slice(&value.to_le_bytes());
            }
        }
        Ok(())
    }

    fn write_flash_words(&mut self, address: u32, words: &[u16]) -> Result<(), Error> {
        self.accesses.push(Access::Flash { address, words: words.len() });
        if words.is_empty() {
            return Ok(());
        }
        if address & 1 != 0 || !self.is_flash(address) {
            return Err(Error::TransferFailed);
        }
        let a = self.touch(address, 2 * words.len() as u32)?;
        for (i, w) in words.iter().enumerate() {
            // programming can only clear bits
            let [lo, hi] = w.to_le_bytes();
            self.memory[a + 2 * i] &= lo;
            self.memory[a + 2 * i + 1] &= hi;
        }
        Ok(())
    }

    fn erase(&mut self, scope: EraseScope, address: u32) -> Result<(), Error> {
        self.accesses.push(Access::Erase(scope, address));
        let (start, end) = match scope {
            EraseScope::Mass | EraseScope::Main => (self.flash_start, MEMORY_SIZE as u32),
            EraseScope::Segment => {
                if !self.is_flash(address) {
                    return Err(Error::TransferFailed);
                }
                let start = address & !(SEGMENT_SIZE - 1);
                (start, start + SEGMENT_SIZE)
            }
        };
        self.memory[start as usize..end as usize].fill(0xff);
        Ok(())
    }

    fn read_reg(&mut self, index: u32) -> Result<u32, Error> {
        self.accesses.push(Access::Control);
        self.registers.get(index as usize).copied().ok_or(Error::TransferFailed)
    }

    fn write_reg(&mut self, index: u32, value: u32) -> Result<(), Error> {
        self.accesses.push(Access::Control);
        let reg = self.registers.get_mut(index as usize).ok_or(Error::TransferFailed)?;
        *reg = value & 0xffff;
        Ok(())
    }

    fn config_fuses(&mut self) -> Result<u8, Error> {
        self.accesses.push(Access::Control);
        Ok(self.config_fuses)
    }

    fn address_limit(&self) -> u64 {
        MEMORY_SIZE as u64
    }

    fn set_breakpoint(&mut self, bp: Breakpoint, address: u32) -> Result<(), Error> {
        self.accesses.push(Access::Control);
        match bp {
            Breakpoint::ClearAll => {
                self.breakpoints.iter_mut().for_each(|b| *b = None);
                Ok(())
            }
            Breakpoint::Slot(i) => {
                let slot = self.breakpoints.get_mut(i as usize).ok_or(Error::TooManyBreaks(i))?;
                *slot = Some(address);
                Ok(())
            }
        }
    }
}
