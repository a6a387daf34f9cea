//! Random-access block I/O over a backing store, with an offset adapter
//! for reading a GPT-discovered partition as if it were its own device.

use std::io::{Read, Seek, SeekFrom};

use crate::error::{ApfsError, Result};

/// A backing store addressable by byte offset. Implemented for anything
/// `Read + Seek`; every higher-level reader in this crate is generic over
/// this trait rather than over a concrete file type.
pub trait BlockDevice {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize>;

    fn read_block(&mut self, paddr: u64, block_size: u32) -> Result<Vec<u8>> {
        let offset = paddr * block_size as u64;
        let mut block = vec![0u8; block_size as usize];
        let got = self.read_at(offset, &mut block)?;
        if got != block.len() {
            return Err(ApfsError::IoShortRead {
                offset,
                needed: block.len(),
                got,
            });
        }
        Ok(block)
    }

    fn read_bytes(&mut self, paddr: u64, block_size: u32, within_offset: u64, len: usize) -> Result<Vec<u8>> {
        let offset = paddr * block_size as u64 + within_offset;
        let mut buf = vec![0u8; len];
        let got = self.read_at(offset, &mut buf)?;
        if got != buf.len() {
            return Err(ApfsError::IoShortRead {
                offset,
                needed: buf.len(),
                got,
            });
        }
        Ok(buf)
    }
}

impl<T: Read + Seek> BlockDevice for T {
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.seek(SeekFrom::Start(offset))?;
        let mut total = 0;
        while total < buf.len() {
            match self.read(&mut buf[total..])? {
                0 => break,
                n => total += n,
            }
        }
        Ok(total)
    }
}

/// Adapts a `Read + Seek` device so every read is relative to a fixed
/// byte offset within it — used to open a GPT-discovered partition as a
/// standalone container without copying bytes.
pub struct PartitionOffsetReader<R> {
    inner: R,
    base_offset: u64,
}

impl<R: Read + Seek> PartitionOffsetReader<R> {
    pub fn new(inner: R, base_offset: u64) -> Self {
        PartitionOffsetReader { inner, base_offset }
    }

    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read + Seek> Read for PartitionOffsetReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl<R: Read + Seek> Seek for PartitionOffsetReader<R> {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(off) => SeekFrom::Start(self.base_offset + off),
            other => other,
        };
        let absolute = self.inner.seek(target)?;
        Ok(absolute.saturating_sub(self.base_offset))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_at_exact() {
        let mut cur = Cursor::new(vec![1u8, 2, 3, 4, 5, 6, 7, 8]);
        let mut buf = [0u8; 4];
        let n = cur.read_at(2, &mut buf).unwrap();
        assert_eq!(n, 4);
        assert_eq!(buf, [3, 4, 5, 6]);
    }

    #[test]
    fn test_read_at_short_at_eof() {
        let mut cur = Cursor::new(vec![1u8, 2, 3]);
        let mut buf = [0u8; 8];
        let n = cur.read_at(0, &mut buf).unwrap();
        assert_eq!(n, 3);
    }

    #[test]
    fn test_partition_offset_reader() {
        let data: Vec<u8> = (0..32u8).collect();
        let cur = Cursor::new(data);
        let mut part = PartitionOffsetReader::new(cur, 8);
        let mut buf = [0u8; 4];
        part.seek(SeekFrom::Start(0)).unwrap();
        part.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [8, 9, 10, 11]);
    }
}
