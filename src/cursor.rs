// SPDX-FileCopyrightText: © 2025 TTKB, LLC
// SPDX-License-Identifier: BSD-3-CLAUSE

//! Bounds-checked big-endian reads over an in-memory buffer.

use binrw::io::Cursor;
use binrw::BinRead;

use crate::error::{FormatError, Result};
use crate::Tag;

/// Read cursor over a byte slice. All multi-byte reads are big-endian, the
/// native order of the console's VR4300.
///
/// Reads advance the position by exactly the width read. A read that would
/// run past the end of the buffer fails with [FormatError::Truncated] and
/// leaves the position untouched.
#[derive(Clone, Debug)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Creates a cursor over `data` starting at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether every byte has been consumed.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    /// Read a slice of `n` bytes without copying.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Returns the next `n` bytes without consuming them.
    pub fn peek_bytes(&self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        Ok(&self.data[self.pos..self.pos + n])
    }

    pub fn read_tag(&mut self) -> Result<Tag> {
        self.read_bytes(4).map(Tag::from_slice)
    }

    pub fn peek_tag(&self) -> Result<Tag> {
        self.peek_bytes(4).map(Tag::from_slice)
    }

    /// Reads a tag and fails with [FormatError::BadMagic] unless it is `expected`.
    pub fn expect_tag(&mut self, expected: Tag) -> Result<()> {
        let offset = self.pos;
        let found = self.read_tag()?;
        if found != expected {
            return Err(FormatError::BadMagic {
                offset,
                expected,
                found,
            }
            .into());
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let bytes = self.read_bytes(2)?;
        Ok(i16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let bytes = self.read_bytes(4)?;
        Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let bytes = self.read_bytes(8)?;
        Ok(u64::from_be_bytes([
            bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5], bytes[6], bytes[7],
        ]))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        let bytes = self.read_bytes(4)?;
        Ok(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a fixed-layout `#[binrw]` record occupying exactly `size` bytes.
    pub fn read_record<T>(&mut self, size: usize) -> Result<T>
    where
        for<'b> T: BinRead<Args<'b> = ()>,
    {
        let offset = self.pos;
        let bytes = self.read_bytes(size)?;
        T::read_be_args(&mut Cursor::new(bytes), ())
            .map_err(|e| FormatError::from_binrw(offset, size, bytes, e).into())
    }

    fn ensure(&self, n: usize) -> Result<()> {
        match self.pos.checked_add(n) {
            Some(end) if end <= self.data.len() => Ok(()),
            _ => Err(FormatError::Truncated {
                offset: self.pos,
                need: n,
                have: self.remaining(),
            }
            .into()),
        }
    }
}

/// Reads a big-endian `u32` at an absolute offset.
pub fn u32_at(data: &[u8], offset: usize) -> Result<u32> {
    ByteCursor::at(data, offset).read_u32()
}

/// Reads a [Tag] at an absolute offset.
pub fn tag_at(data: &[u8], offset: usize) -> Result<Tag> {
    ByteCursor::at(data, offset).read_tag()
}

/// Returns `data[offset..offset + len]`, failing instead of panicking when
/// the range runs past the end.
pub fn slice_at(data: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    ByteCursor::at(data, offset).read_bytes(len)
}
