//! The scratch buffer shared by bulk host transfers and every memory/flash operation.
use alloc::boxed::Box;
use alloc::vec;

use crate::status::Error;

/// Bytes of scratch space offered to the host
pub const SCRATCH_CAPACITY: usize = 64 * 1024;

pub struct ScratchBuffer {
    data: Box<[u8]>,
}

impl ScratchBuffer {
    pub fn new() -> Self {
        Self::with_capacity(SCRATCH_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { data: vec![0; capacity].into_boxed_slice() }
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Check that `[offset, offset + len)` lies inside the buffer.  The offset itself must be
    /// inside the buffer even for an empty range.
    pub fn check(&self, offset: u32, len: u32) -> Result<(usize, usize), Error> {
        let capacity = self.capacity();
        let (o, n) = (offset as usize, len as usize);
        if o >= capacity || n > capacity - o {
            return Err(Error::OutOfBounds { offset, len });
        }
        Ok((o, n))
    }

    pub fn get(&self, offset: u32, len: u32) -> Result<&[u8], Error> {
        let (o, n) = self.check(offset, len)?;
        Ok(&self.data[o..o + n])
    }

    pub fn get_mut(&mut self, offset: u32, len: u32) -> Result<&mut [u8], Error> {
        let (o, n) = self.check(offset, len)?;
        Ok(&mut self.data[o..o + n])
    }
}

impl Default for ScratchBuffer {
    fn default() -> Self {
        Self::new()
    }
}
