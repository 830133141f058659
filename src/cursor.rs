//! Positioned reader over an in-memory payload.
//!
//! Every multi-byte read takes the byte order explicitly; the cursor never
//! guesses. Decoders above it only describe offsets.

use std::io::Cursor;

use binrw::BinRead;
use half::f16;
use log::trace;

use crate::error::{DecodeError, Result};

pub type ByteOrder = binrw::Endian;

/// Longest name the string guess will accept.
pub const MAX_NAME_LEN: usize = 260;

#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn remaining_bytes(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn seek_absolute(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(DecodeError::OutOfBounds {
                position: pos as i64,
                len: self.data.len(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    pub fn seek_relative(&mut self, delta: i64) -> Result<()> {
        let target = self.pos as i64 + delta;
        if target < 0 || target > self.data.len() as i64 {
            return Err(DecodeError::OutOfBounds {
                position: target,
                len: self.data.len(),
            });
        }
        self.pos = target as usize;
        Ok(())
    }

    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.seek_relative(count as i64)
    }

    pub fn take(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining_bytes() {
            return Err(DecodeError::TruncatedInput {
                offset: self.pos,
                wanted: count,
                available: self.remaining_bytes(),
            });
        }
        let data = self.data;
        let bytes = &data[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    pub fn peek_rest(&self) -> &'a [u8] {
        &self.data[self.pos..]
    }

    /// Everything from the current position to the end of the payload.
    pub fn rest(&mut self) -> &'a [u8] {
        let data = self.data;
        let bytes = &data[self.pos..];
        self.pos = data.len();
        bytes
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.array::<1>()?[0])
    }

    pub fn read_u16(&mut self, order: ByteOrder) -> Result<u16> {
        let raw = self.array()?;
        Ok(match order {
            ByteOrder::Big => u16::from_be_bytes(raw),
            ByteOrder::Little => u16::from_le_bytes(raw),
        })
    }

    pub fn read_i16(&mut self, order: ByteOrder) -> Result<i16> {
        Ok(self.read_u16(order)? as i16)
    }

    pub fn read_u32(&mut self, order: ByteOrder) -> Result<u32> {
        let raw = self.array()?;
        Ok(match order {
            ByteOrder::Big => u32::from_be_bytes(raw),
            ByteOrder::Little => u32::from_le_bytes(raw),
        })
    }

    pub fn read_f32(&mut self, order: ByteOrder) -> Result<f32> {
        Ok(f32::from_bits(self.read_u32(order)?))
    }

    pub fn read_f16(&mut self, order: ByteOrder) -> Result<f32> {
        Ok(f16::from_bits(self.read_u16(order)?).to_f32())
    }

    pub fn read_f32s<const N: usize>(&mut self, order: ByteOrder) -> Result<[f32; N]> {
        let mut out = [0.0; N];
        for value in &mut out {
            *value = self.read_f32(order)?;
        }
        Ok(out)
    }

    /// `u32` length followed by that many UTF-8 bytes.
    pub fn read_string(&mut self, order: ByteOrder) -> Result<String> {
        let offset = self.pos;
        let len = self.read_u32(order)? as usize;
        let bytes = self.take(len)?;
        let string = std::str::from_utf8(bytes)
            .map_err(|_| DecodeError::InvalidString { offset })?
            .to_owned();
        trace!("string @0x{offset:x}: {string:?}");
        Ok(string)
    }

    /// Reads a string only if it looks like one, otherwise leaves the cursor untouched.
    pub fn try_read_string(&mut self, order: ByteOrder, max_len: usize) -> Option<String> {
        let start = self.pos;
        let candidate = self.read_u32(order).ok().and_then(|len| {
            let len = len as usize;
            if len > max_len || len > self.remaining_bytes() {
                return None;
            }
            let bytes = self.take(len).ok()?;
            std::str::from_utf8(bytes).ok().map(str::to_owned)
        });
        if candidate.is_none() {
            self.pos = start;
        }
        candidate
    }

    /// `u32` count followed by that many strings.
    pub fn read_string_list(&mut self, order: ByteOrder) -> Result<Vec<String>> {
        let count = self.read_u32(order)? as usize;
        // every string costs at least its length prefix
        if count.saturating_mul(4) > self.remaining_bytes() {
            return Err(DecodeError::TruncatedInput {
                offset: self.pos,
                wanted: count * 4,
                available: self.remaining_bytes(),
            });
        }
        (0..count).map(|_| self.read_string(order)).collect()
    }

    /// Reads a fixed record through its `binrw` description.
    pub fn read<T>(&mut self, order: ByteOrder) -> Result<T>
    where
        T: for<'b> BinRead<Args<'b> = ()>,
    {
        let mut reader = Cursor::new(&self.data[self.pos..]);
        match T::read_options(&mut reader, order, ()) {
            Ok(value) => {
                self.pos += reader.position() as usize;
                Ok(value)
            }
            Err(err) if err.is_eof() => Err(DecodeError::TruncatedInput {
                offset: self.pos,
                wanted: std::mem::size_of::<T>(),
                available: self.remaining_bytes(),
            }),
            Err(err) => Err(err.into()),
        }
    }
}
