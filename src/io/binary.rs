//! Flat binary index format.
//!
//! Every vector is written as `u64 element_size`, `u64 element_count`, zero
//! padding up to the element alignment, then the raw elements in native byte
//! order. Scalars are bare `u64`s aligned to 8. Offsets are counted from the
//! start of the stream, so a region mapped at a page boundary can hand out
//! typed slices directly.

use std::io::{self, Write};
use std::mem::{align_of, size_of};

use bytemuck::Pod;

use crate::error::{IndexError, Result};

const ZEROS: [u8; 64] = [0; 64];

pub struct BinaryWriter<W: Write> {
    inner: W,
    offset: usize,
}

impl<W: Write> BinaryWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner, offset: 0 }
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)?;
        self.offset += bytes.len();
        Ok(())
    }

    fn pad_to(&mut self, align: usize) -> io::Result<()> {
        let pad = self.offset.next_multiple_of(align) - self.offset;
        self.write_bytes(&ZEROS[..pad])
    }

    pub fn write_u64(&mut self, value: u64) -> io::Result<()> {
        self.pad_to(align_of::<u64>())?;
        self.write_bytes(&value.to_ne_bytes())
    }

    pub fn write_slice<T: Pod>(&mut self, data: &[T]) -> io::Result<()> {
        self.write_u64(size_of::<T>() as u64)?;
        self.write_u64(data.len() as u64)?;
        self.pad_to(align_of::<T>())?;
        self.write_bytes(bytemuck::cast_slice(data))
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Cursor handing out typed views of a byte region written by
/// [`BinaryWriter`]. Every read is bounds- and size-checked first.
#[derive(Debug, Clone)]
pub struct Mapper<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> Mapper<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    pub fn is_at_end(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn align_to(&mut self, align: usize) {
        self.offset = self.offset.next_multiple_of(align);
    }

    fn take(&mut self, len: u64) -> Result<&'a [u8]> {
        let overflow = IndexError::BoundsOverflow {
            offset: self.offset,
            len,
            size: self.data.len(),
        };
        let end = usize::try_from(len)
            .ok()
            .and_then(|n| self.offset.checked_add(n))
            .filter(|&end| end <= self.data.len())
            .ok_or(overflow)?;
        let bytes = &self.data[self.offset..end];
        self.offset = end;
        Ok(bytes)
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        self.align_to(align_of::<u64>());
        let bytes = self.take(8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(bytes);
        Ok(u64::from_ne_bytes(buf))
    }

    pub fn read_slice<T: Pod>(&mut self) -> Result<&'a [T]> {
        let header = self.offset;
        let elem_size = self.read_u64()?;
        if elem_size != size_of::<T>() as u64 {
            return Err(IndexError::FormatMismatch {
                offset: header,
                expected: size_of::<T>(),
                found: elem_size,
            });
        }
        let count = self.read_u64()?;
        self.align_to(align_of::<T>());
        let start = self.offset;
        let len = count.checked_mul(elem_size).ok_or(IndexError::BoundsOverflow {
            offset: start,
            len: u64::MAX,
            size: self.data.len(),
        })?;
        let bytes = self.take(len)?;
        bytemuck::try_cast_slice(bytes).map_err(|_| IndexError::Misaligned(start))
    }
}
