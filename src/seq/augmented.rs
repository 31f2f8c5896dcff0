use std::fmt;
use std::io::Write;
use std::ops::Range;

use crate::error::{IndexError, Result};
use crate::io::binary::{BinaryWriter, Mapper};
use crate::seq::packed::PackedSequence;
use crate::util::dna;

/// Bases per annotation block. Run offsets are stored relative to the block
/// start in the upper 24 bits of a run record.
pub const BLOCK_SIZE: usize = 65536;

/// A packed sequence plus a sparse run-length layer of annotation bytes.
///
/// Each run record is `(offset_in_block << 8) | byte`, where `byte == 0` means
/// "ordinary base, read the packed layer". `index[b]` is the position in `rle`
/// of the first run of block `b`, and every block opens with a run at
/// offset 0.
#[derive(Debug, Clone, Default)]
pub struct AugmentedSequence<W = Vec<u64>, T = Vec<u32>> {
    packed: PackedSequence<W>,
    index: T,
    rle: T,
}

pub type MappedAugmentedSequence<'a> = AugmentedSequence<&'a [u64], &'a [u32]>;

impl AugmentedSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_ascii(bytes: &[u8]) -> Self {
        let mut s = Self::new();
        s.append(bytes);
        s
    }

    /// Append ASCII text. Whitespace is skipped; anything other than ACGT is
    /// recorded as an annotation and packed as 'A'.
    pub fn append(&mut self, bytes: &[u8]) {
        let mut pos = self.packed.len();
        let mut prev = self.rle.last().map_or(0, |&r| r & 0xff);
        let mut codes = Vec::with_capacity(bytes.len());
        for &b in bytes {
            if dna::is_whitespace(b) {
                continue;
            }
            let annotation = if dna::is_base(b) { 0 } else { b as u32 };
            let offset = pos % BLOCK_SIZE;
            if offset == 0 {
                self.index.push(self.rle.len() as u32);
                self.rle.push(annotation);
            } else if annotation != prev {
                self.rle.push(((offset as u32) << 8) | annotation);
            }
            prev = annotation;
            codes.push(dna::to_code(b));
            pos += 1;
        }
        self.packed.append_codes(codes);
    }

    /// Truncate to `len` bases, or extend by repeating `fill`.
    pub fn resize(&mut self, len: usize, fill: u8) {
        let cur = self.packed.len();
        if len >= cur {
            let fill = if dna::is_whitespace(fill) { b'A' } else { fill };
            self.append(&vec![fill; len - cur]);
            return;
        }
        self.packed.resize(len);
        if len == 0 {
            self.index.clear();
            self.rle.clear();
            return;
        }
        let last_block = (len - 1) / BLOCK_SIZE;
        self.index.truncate(last_block + 1);
        let lo = self.index[last_block] as usize;
        let end = (len - last_block * BLOCK_SIZE) as u32;
        let keep = self.rle[lo..].partition_point(|&r| (r >> 8) < end);
        self.rle.truncate(lo + keep);
    }
}

impl<W: AsRef<[u64]>, T: AsRef<[u32]>> AugmentedSequence<W, T> {
    pub fn from_parts(packed: PackedSequence<W>, index: T, rle: T) -> Result<Self> {
        let expected = packed.len().div_ceil(BLOCK_SIZE);
        let found = index.as_ref().len();
        if found != expected {
            return Err(IndexError::LengthMismatch { expected, found });
        }
        Ok(Self { packed, index, rle })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.packed.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.packed.is_empty()
    }

    #[inline]
    pub fn packed(&self) -> &PackedSequence<W> {
        &self.packed
    }

    pub fn rle_index(&self) -> &[u32] {
        self.index.as_ref()
    }

    pub fn rle(&self) -> &[u32] {
        self.rle.as_ref()
    }

    /// Annotation byte covering `pos`, or 0 for an ordinary base.
    pub fn annotation(&self, pos: usize) -> u8 {
        let index = self.index.as_ref();
        let rle = self.rle.as_ref();
        let block = pos / BLOCK_SIZE;
        let Some(&lo) = index.get(block) else {
            return 0;
        };
        let hi = index.get(block + 1).map_or(rle.len(), |&h| h as usize);
        let runs = rle.get(lo as usize..hi).unwrap_or(&[]);
        let key = (((pos % BLOCK_SIZE) as u32) << 8) | 0xff;
        let p = runs.partition_point(|&r| r <= key);
        if p == 0 {
            0
        } else {
            (runs[p - 1] & 0xff) as u8
        }
    }

    /// Annotated (non-ACGT) stretches overlapping `offset..offset + len`,
    /// clipped to that window. Adjacent runs with different bytes merge.
    pub fn annotated_runs(&self, offset: usize, len: usize) -> Vec<Range<usize>> {
        let end = offset.saturating_add(len).min(self.len());
        let mut out: Vec<Range<usize>> = Vec::new();
        if offset >= end {
            return out;
        }
        let index = self.index.as_ref();
        let rle = self.rle.as_ref();
        for block in offset / BLOCK_SIZE..=(end - 1) / BLOCK_SIZE {
            let Some(&lo) = index.get(block) else {
                break;
            };
            let hi = index.get(block + 1).map_or(rle.len(), |&h| h as usize);
            let runs = rle.get(lo as usize..hi).unwrap_or(&[]);
            let base = block * BLOCK_SIZE;
            let block_end = (base + BLOCK_SIZE).min(self.len());
            for (j, &r) in runs.iter().enumerate() {
                if r & 0xff == 0 {
                    continue;
                }
                let run_start = base + (r >> 8) as usize;
                let run_end = runs.get(j + 1).map_or(block_end, |&n| base + (n >> 8) as usize);
                let (a, b) = (run_start.max(offset), run_end.min(end));
                if a >= b {
                    continue;
                }
                match out.last_mut() {
                    Some(last) if last.end == a => last.end = b,
                    _ => out.push(a..b),
                }
            }
        }
        out
    }

    /// Character at `pos`; 'N' past the end.
    pub fn get(&self, pos: usize) -> char {
        if pos >= self.len() {
            return 'N';
        }
        match self.annotation(pos) {
            0 => self.packed.get(pos),
            b => b as char,
        }
    }

    /// ASCII text of `len` bases at `offset`, optionally reverse complemented.
    /// Annotation bytes are not complemented.
    pub fn substr(&self, offset: usize, len: usize, rev_comp: bool) -> String {
        let offset = offset.min(self.len());
        let len = len.min(self.len() - offset);
        let range = offset..offset + len;
        if rev_comp {
            range
                .rev()
                .map(|i| dna::complement(self.get(i) as u8) as char)
                .collect()
        } else {
            range.map(|i| self.get(i)).collect()
        }
    }

    pub fn write_binary<Wr: Write>(&self, wr: &mut BinaryWriter<Wr>) -> std::io::Result<()> {
        self.packed.write_binary(wr)?;
        wr.write_slice(self.rle_index())?;
        wr.write_slice(self.rle())
    }
}

impl<'a> AugmentedSequence<&'a [u64], &'a [u32]> {
    pub fn map(m: &mut Mapper<'a>) -> Result<Self> {
        let packed = PackedSequence::map(m)?;
        let index = m.read_slice::<u32>()?;
        let rle = m.read_slice::<u32>()?;
        Self::from_parts(packed, index, rle)
    }
}

impl<W: AsRef<[u64]>, T: AsRef<[u32]>> fmt::Display for AugmentedSequence<W, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.substr(0, self.len(), false))
    }
}
