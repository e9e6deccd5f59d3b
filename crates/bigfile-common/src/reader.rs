//! Endian-aware binary reader over byte slices.
//!
//! This module provides [`BinaryReader`], a cursor-like type that reads
//! integers and fixed-width strings from a byte slice without copying.
//! Unlike a fixed little-endian reader, the byte order is chosen per reader
//! because archive variants differ in endianness.

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::{Error, Result};

/// Byte order of multi-byte integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Endian {
    #[default]
    Little,
    Big,
}

impl Endian {
    /// Build from a "little endian?" flag.
    #[inline]
    pub const fn from_little(little: bool) -> Self {
        if little {
            Self::Little
        } else {
            Self::Big
        }
    }

    /// Whether this is little-endian.
    #[inline]
    pub const fn is_little(self) -> bool {
        matches!(self, Self::Little)
    }

    /// Read an unsigned integer of `width` bytes (1..=8).
    #[inline]
    pub fn read_uint(self, bytes: &[u8], width: usize) -> u64 {
        match self {
            Self::Little => LittleEndian::read_uint(bytes, width),
            Self::Big => BigEndian::read_uint(bytes, width),
        }
    }

    /// Read a sign-extended integer of `width` bytes (1..=8).
    #[inline]
    pub fn read_int(self, bytes: &[u8], width: usize) -> i64 {
        match self {
            Self::Little => LittleEndian::read_int(bytes, width),
            Self::Big => BigEndian::read_int(bytes, width),
        }
    }

    /// Write an unsigned integer into the first `width` bytes of `buf`.
    #[inline]
    pub fn write_uint(self, buf: &mut [u8], value: u64, width: usize) {
        match self {
            Self::Little => LittleEndian::write_uint(buf, value, width),
            Self::Big => BigEndian::write_uint(buf, value, width),
        }
    }

    /// Write a signed integer into the first `width` bytes of `buf`.
    #[inline]
    pub fn write_int(self, buf: &mut [u8], value: i64, width: usize) {
        match self {
            Self::Little => LittleEndian::write_int(buf, value, width),
            Self::Big => BigEndian::write_int(buf, value, width),
        }
    }

    /// Encode a `u32` in this byte order.
    #[inline]
    pub fn u32_bytes(self, value: u32) -> [u8; 4] {
        match self {
            Self::Little => value.to_le_bytes(),
            Self::Big => value.to_be_bytes(),
        }
    }
}

/// Decode single-byte-charset text, stopping at the first null.
///
/// Every byte maps to the code point of the same value (Latin-1), so the
/// conversion is lossless and never fails.
pub fn decode_fixed_str(bytes: &[u8]) -> String {
    let end = memchr::memchr(0, bytes).unwrap_or(bytes.len());
    bytes[..end].iter().map(|&b| b as char).collect()
}

/// A binary reader over a byte slice with a configurable byte order.
///
/// # Example
///
/// ```
/// use bigfile_common::{BinaryReader, Endian};
///
/// let data = [0x01, 0x02, 0x03, 0x04, 0x00, 0x00, 0x00, 0x2a];
/// let mut le = BinaryReader::new(&data, Endian::Little);
/// assert_eq!(le.read_u32().unwrap(), 0x04030201);
///
/// let mut be = BinaryReader::new_at(&data, 4, Endian::Big);
/// assert_eq!(be.read_u32().unwrap(), 42);
/// assert!(be.is_empty());
/// ```
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    position: usize,
    endian: Endian,
}

impl<'a> BinaryReader<'a> {
    /// Create a new reader from a byte slice.
    #[inline]
    pub const fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            position: 0,
            endian,
        }
    }

    /// Create a new reader starting at a specific position.
    #[inline]
    pub const fn new_at(data: &'a [u8], position: usize, endian: Endian) -> Self {
        Self {
            data,
            position,
            endian,
        }
    }

    /// The byte order used for integer reads.
    #[inline]
    pub const fn endian(&self) -> Endian {
        self.endian
    }

    /// Get the current position in the buffer.
    #[inline]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Get the total length of the underlying buffer.
    #[inline]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Get the number of bytes remaining to read.
    #[inline]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.position)
    }

    /// Check if there are no more bytes to read.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.position >= self.data.len()
    }

    /// Seek to an absolute position.
    #[inline]
    pub fn seek(&mut self, position: usize) {
        self.position = position;
    }

    /// Advance the position by a number of bytes.
    #[inline]
    pub fn advance(&mut self, count: usize) {
        self.position = self.position.saturating_add(count);
    }

    /// Peek at bytes without advancing the position.
    #[inline]
    pub fn peek_bytes(&self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::OutOfRange {
                context: "read".to_string(),
                end: self.position.saturating_add(count),
                available: self.data.len(),
            });
        }
        Ok(&self.data[self.position..self.position + count])
    }

    /// Read bytes and advance the position.
    #[inline]
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        let bytes = self.peek_bytes(count)?;
        self.position += count;
        Ok(bytes)
    }

    /// Read an unsigned integer of `width` bytes (1..=8).
    #[inline]
    pub fn read_uint(&mut self, width: usize) -> Result<u64> {
        let bytes = self.read_bytes(width)?;
        Ok(self.endian.read_uint(bytes, width))
    }

    /// Read a sign-extended integer of `width` bytes (1..=8).
    #[inline]
    pub fn read_int(&mut self, width: usize) -> Result<i64> {
        let bytes = self.read_bytes(width)?;
        Ok(self.endian.read_int(bytes, width))
    }

    /// Read a u16.
    #[inline]
    pub fn read_u16(&mut self) -> Result<u16> {
        self.read_uint(2).map(|v| v as u16)
    }

    /// Read an i16.
    #[inline]
    pub fn read_i16(&mut self) -> Result<i16> {
        self.read_int(2).map(|v| v as i16)
    }

    /// Read a u32.
    #[inline]
    pub fn read_u32(&mut self) -> Result<u32> {
        self.read_uint(4).map(|v| v as u32)
    }

    /// Read an i32.
    #[inline]
    pub fn read_i32(&mut self) -> Result<i32> {
        self.read_int(4).map(|v| v as i32)
    }

    /// Read a string from a fixed-size buffer, stopping at the first null.
    pub fn read_fixed_str(&mut self, width: usize) -> Result<String> {
        self.read_bytes(width).map(decode_fixed_str)
    }
}
