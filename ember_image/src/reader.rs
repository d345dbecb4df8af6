//! Stream capability consumed by the image loader.
//!
//! The loader only needs sequential field reads, a `skip`, and its
//! position within the stream (the padding rule is a function of position
//! and the declared word size). A streaming reader can additionally expose
//! the address it is currently reading from, which lets the loader treat
//! the stream's position as the memory region's final address instead of
//! copying.

use ember_core::Address;

use crate::loader::LoadError;

/// Sequential source of image bytes.
pub trait ImageReader {
    /// Read the next byte.
    fn read_byte(&mut self) -> Result<u8, LoadError>;

    /// Read the next `n` bytes into an owned vector.
    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, LoadError>;

    /// Advance past `n` bytes without reading them.
    fn skip(&mut self, n: usize) -> Result<(), LoadError>;

    /// Bytes consumed so far.
    fn position(&self) -> usize;

    /// The address the next byte will be read from, for readers whose
    /// backing medium is directly addressable. `None` for pure streams.
    fn current_address(&self) -> Option<Address> {
        None
    }

    /// Read a big-endian `u16` header field.
    fn read_u16(&mut self) -> Result<u16, LoadError> {
        let hi = self.read_byte()? as u16;
        let lo = self.read_byte()? as u16;
        Ok((hi << 8) | lo)
    }

    /// Read a big-endian `u32` header field.
    fn read_u32(&mut self) -> Result<u32, LoadError> {
        let mut value = 0u32;
        for _ in 0..4 {
            value = (value << 8) | self.read_byte()? as u32;
        }
        Ok(value)
    }
}

/// Reader over an in-memory image (a file read into a buffer).
#[derive(Debug)]
pub struct SliceReader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> SliceReader<'a> {
    /// Create a reader over `bytes`.
    pub fn new(bytes: &'a [u8]) -> SliceReader<'a> {
        SliceReader { bytes, pos: 0 }
    }
}

impl ImageReader for SliceReader<'_> {
    fn read_byte(&mut self) -> Result<u8, LoadError> {
        let b = *self.bytes.get(self.pos).ok_or(LoadError::Truncated)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, LoadError> {
        let end = self.pos.checked_add(n).ok_or(LoadError::Truncated)?;
        let slice = self.bytes.get(self.pos..end).ok_or(LoadError::Truncated)?;
        self.pos = end;
        Ok(slice.to_vec())
    }

    fn skip(&mut self, n: usize) -> Result<(), LoadError> {
        let end = self.pos.checked_add(n).ok_or(LoadError::Truncated)?;
        if end > self.bytes.len() {
            return Err(LoadError::Truncated);
        }
        self.pos = end;
        Ok(())
    }

    fn position(&self) -> usize {
        self.pos
    }
}

/// Reader over an image already sitting in directly-addressable memory
/// (e.g. execute-in-place flash).
///
/// Exposes [`current_address`](ImageReader::current_address), so the
/// loader can reference the memory region in place instead of copying it.
#[derive(Debug)]
pub struct MemoryReader {
    start: Address,
    len: usize,
    pos: usize,
}

impl MemoryReader {
    /// Create a reader over the `len` bytes at `start`.
    ///
    /// # Safety
    ///
    /// `[start, start + len)` must remain valid for reads for the lifetime
    /// of the reader and of any region loaded in place from it.
    pub unsafe fn new(start: Address, len: usize) -> MemoryReader {
        MemoryReader { start, len, pos: 0 }
    }
}

impl ImageReader for MemoryReader {
    fn read_byte(&mut self) -> Result<u8, LoadError> {
        if self.pos >= self.len {
            return Err(LoadError::Truncated);
        }
        // Safety: in bounds per the check above and the `new` contract.
        let b = unsafe { self.start.read_byte(self.pos) };
        self.pos += 1;
        Ok(b)
    }

    fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, LoadError> {
        let mut bytes = Vec::with_capacity(n);
        for _ in 0..n {
            bytes.push(self.read_byte()?);
        }
        Ok(bytes)
    }

    fn skip(&mut self, n: usize) -> Result<(), LoadError> {
        let end = self.pos.checked_add(n).ok_or(LoadError::Truncated)?;
        if end > self.len {
            return Err(LoadError::Truncated);
        }
        self.pos = end;
        Ok(())
    }

    fn position(&self) -> usize {
        self.pos
    }

    fn current_address(&self) -> Option<Address> {
        Some(self.start.add(self.pos))
    }
}
