use byteorder::{BigEndian, ByteOrder, LittleEndian};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use super::error::{Error, Result};

/// A bounds-checked view over a file image held in memory.  Every read
/// checks `offset + length` against the buffer size first and reports
/// [`Error::Corrupt`] instead of touching anything out of range.
#[derive(Clone, Copy)]
pub struct ByteSpan<'a> {
    data: &'a [u8],
}

impl<'a> ByteSpan<'a> {
    /// Creates a view over the given bytes.
    pub fn new(data: &'a [u8]) -> ByteSpan<'a> {
        ByteSpan { data }
    }

    /// Returns the total length of the underlying buffer.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the buffer holds no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns the whole underlying buffer.
    pub fn bytes(&self) -> &'a [u8] {
        self.data
    }

    /// Returns true if `length` bytes starting at `offset` lie inside the
    /// buffer.
    pub fn contains(&self, offset: usize, length: usize) -> bool {
        match offset.checked_add(length) {
            Some(end) => end <= self.data.len(),
            None => false,
        }
    }

    /// Fails with a corruption error naming `what` unless `length` bytes at
    /// `offset` are in bounds.
    pub fn require(&self, offset: usize, length: usize, what: &str) -> Result<()> {
        if self.contains(offset, length) {
            Ok(())
        } else {
            Err(Error::Corrupt(format!("{} at offset {:#x} needs {} byte(s), \
                                        but the file is only {} bytes long",
                                       what,
                                       offset,
                                       length,
                                       self.data.len())))
        }
    }

    /// Returns `length` bytes starting at `offset`.
    pub fn slice(&self, offset: usize, length: usize) -> Result<&'a [u8]> {
        self.require(offset, length, "read")?;
        Ok(&self.data[offset..offset + length])
    }

    /// Returns everything from `offset` to the end of the buffer.
    pub fn tail(&self, offset: usize) -> Result<&'a [u8]> {
        self.require(offset, 0, "read")?;
        Ok(&self.data[offset..])
    }

    /// Reads one byte.
    pub fn read_u8(&self, offset: usize) -> Result<u8> {
        Ok(self.slice(offset, 1)?[0])
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16_be(&self, offset: usize) -> Result<u16> {
        Ok(BigEndian::read_u16(self.slice(offset, 2)?))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32_be(&self, offset: usize) -> Result<u32> {
        Ok(BigEndian::read_u32(self.slice(offset, 4)?))
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&self, offset: usize) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.slice(offset, 4)?))
    }

    /// Reads a four-character tag.
    pub fn read_tag(&self, offset: usize) -> Result<[u8; 4]> {
        let mut tag = [0u8; 4];
        tag.copy_from_slice(self.slice(offset, 4)?);
        Ok(tag)
    }
}

/// Reads an entire file into memory.
pub fn read_file(path: &Path) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut data = Vec::new();
    file.read_to_end(&mut data)?;
    Ok(data)
}

/// Reads up to `length` leading bytes of a file, together with the total file
/// size.  Files shorter than `length` yield a shorter header.
pub fn peek_header(path: &Path, length: usize) -> Result<(Vec<u8>, u64)> {
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();
    let mut header = Vec::with_capacity(length);
    BufReader::new(file).take(length as u64).read_to_end(&mut header)?;
    Ok((header, file_size))
}
