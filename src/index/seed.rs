//! Two-stage k-mer index: a prefix-sum table over all `4^k` k-mer values
//! pointing into one array of reference positions.

use std::io::{self, Write};
use std::ops::Range;
use std::time::Instant;

use log::info;

use crate::error::{IndexError, Result};
use crate::io::binary::{BinaryWriter, Mapper};
use crate::seq::PackedSequence;
use crate::util::dna;

/// Largest k whose bucket table is built. The table has `4^k + 1` entries.
pub const MAX_TABLE_K: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexConfig {
    /// Seed length k, in `[2, 32]`.
    pub num_indexed_chars: usize,
    /// Leave the all-A and all-T k-mers out of the index.
    pub exclude_polymers: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self { num_indexed_chars: 12, exclude_polymers: true }
    }
}

/// Read side of a seed index, shared by owned and mapped tables.
pub trait SeedLookup {
    fn num_indexed_chars(&self) -> usize;

    /// All indexed positions, grouped by bucket.
    fn addr(&self) -> &[u32];

    /// Range of [`addr`](Self::addr) holding the positions of `kmer`.
    fn bucket_range(&self, kmer: u64) -> Range<usize>;

    fn bucket(&self, kmer: u64) -> &[u32] {
        self.addr().get(self.bucket_range(kmer)).unwrap_or(&[])
    }

    fn num_buckets(&self) -> usize {
        1usize << (2 * self.num_indexed_chars())
    }

    /// A polymer seed (all A or all T) with an empty bucket. Indexes built
    /// with polymer exclusion always leave these buckets empty.
    fn is_excluded(&self, kmer: u64) -> bool {
        (kmer == 0 || kmer == self.num_buckets() as u64 - 1) && self.bucket_range(kmer).is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct SeedIndex<T = Vec<u32>> {
    num_indexed_chars: usize,
    index: T,
    addr: T,
}

/// Index built in memory; the only kind that can be (re)built.
pub type MutableSeedIndex = SeedIndex<Vec<u32>>;

/// Index borrowed from a mapped file.
pub type ImmutableSeedIndex<'a> = SeedIndex<&'a [u32]>;

/// Call `f(pos, kmer)` for every k-mer start in `seq`, rolling the value.
fn for_each_kmer<W: AsRef<[u64]>>(seq: &PackedSequence<W>, k: usize, mut f: impl FnMut(usize, u64)) {
    let mask = (1u64 << (2 * k)) - 1;
    let mut h = seq.kmer(0, k);
    f(0, h);
    for pos in 1..=seq.len() - k {
        h = ((h << 2) | seq.code(pos + k - 1) as u64) & mask;
        f(pos, h);
    }
}

impl SeedIndex<Vec<u32>> {
    pub fn build<W: AsRef<[u64]>>(seq: &PackedSequence<W>, config: &IndexConfig) -> Result<Self> {
        let k = config.num_indexed_chars;
        if !(2..=32).contains(&k) {
            return Err(IndexError::InvalidKmerLength(k));
        }
        let n = seq.len();
        if n < k {
            return Err(IndexError::SequenceTooShort { len: n, k });
        }
        if u32::try_from(n).is_err() {
            return Err(IndexError::AddressOverflow(n));
        }
        if k > MAX_TABLE_K {
            return Err(IndexError::TableTooLarge(k));
        }

        let start = Instant::now();
        let buckets = 1usize << (2 * k);
        let mut index: Vec<u32> = Vec::new();
        index
            .try_reserve_exact(buckets + 1)
            .map_err(|_| IndexError::TableTooLarge(k))?;
        index.resize(buckets + 1, 0);

        let mask = buckets as u64 - 1;
        let excluded = |h: u64| config.exclude_polymers && (h == 0 || h == mask);

        for_each_kmer(seq, k, |_, h| {
            if !excluded(h) {
                index[h as usize] += 1;
            }
        });

        let mut total = 0u32;
        for slot in index.iter_mut() {
            let count = *slot;
            *slot = total;
            total += count;
        }

        let mut addr = vec![0u32; total as usize];
        for_each_kmer(seq, k, |pos, h| {
            if !excluded(h) {
                let slot = &mut index[h as usize];
                addr[*slot as usize] = pos as u32;
                *slot += 1;
            }
        });
        // each slot now holds the end of its bucket; shift back to starts
        for i in (1..=buckets).rev() {
            index[i] = index[i - 1];
        }
        index[0] = 0;

        info!(
            "seed index: {} positions over {} bases, k = {}, {} buckets, {:.2?}",
            total,
            n,
            k,
            buckets,
            start.elapsed()
        );

        Ok(Self {
            num_indexed_chars: k,
            index,
            addr,
        })
    }

    /// Rebuild in place over a new sequence.
    pub fn reindex<W: AsRef<[u64]>>(&mut self, seq: &PackedSequence<W>, config: &IndexConfig) -> Result<()> {
        *self = Self::build(seq, config)?;
        Ok(())
    }

    pub fn as_immutable(&self) -> ImmutableSeedIndex<'_> {
        SeedIndex {
            num_indexed_chars: self.num_indexed_chars,
            index: &self.index,
            addr: &self.addr,
        }
    }
}

impl<T: AsRef<[u32]>> SeedLookup for SeedIndex<T> {
    fn num_indexed_chars(&self) -> usize {
        self.num_indexed_chars
    }

    fn addr(&self) -> &[u32] {
        self.addr.as_ref()
    }

    fn bucket_range(&self, kmer: u64) -> Range<usize> {
        let index = self.index.as_ref();
        let k = kmer as usize;
        match (index.get(k), index.get(k + 1)) {
            (Some(&lo), Some(&hi)) => lo as usize..hi as usize,
            _ => 0..0,
        }
    }
}

impl<T: AsRef<[u32]>> SeedIndex<T> {
    pub fn table(&self) -> &[u32] {
        self.index.as_ref()
    }

    pub fn write_binary<Wr: Write>(&self, wr: &mut BinaryWriter<Wr>) -> io::Result<()> {
        wr.write_u64(self.num_indexed_chars as u64)?;
        wr.write_slice(self.table())?;
        wr.write_slice(self.addr())
    }

    /// One line per non-empty bucket: the k-mer, its size, then positions.
    pub fn write_ascii<Wr: Write>(&self, out: &mut Wr) -> io::Result<()> {
        let k = self.num_indexed_chars;
        for kmer in 0..self.num_buckets() as u64 {
            let bucket = self.bucket(kmer);
            if bucket.is_empty() {
                continue;
            }
            write!(out, "{}\t{}\t", dna::kmer_to_string(kmer, k), bucket.len())?;
            for (i, pos) in bucket.iter().enumerate() {
                let sep = if i == 0 { "" } else { " " };
                write!(out, "{sep}{pos}")?;
            }
            writeln!(out)?;
        }
        Ok(())
    }
}

/// Placeholder written in place of an index that was never built.
pub fn write_absent<Wr: Write>(wr: &mut BinaryWriter<Wr>) -> io::Result<()> {
    wr.write_u64(0)?;
    wr.write_slice::<u32>(&[])?;
    wr.write_slice::<u32>(&[])
}

impl<'a> SeedIndex<&'a [u32]> {
    /// Map an index written by [`SeedIndex::write_binary`] or
    /// [`write_absent`]; the latter maps to `None`. The table is checked
    /// against `seq_len`, the length of the indexed sequence, so a damaged
    /// file fails here rather than at query time.
    pub fn map(m: &mut Mapper<'a>, seq_len: usize) -> Result<Option<Self>> {
        let k = m.read_u64()? as usize;
        let index = m.read_slice::<u32>()?;
        let addr = m.read_slice::<u32>()?;
        if k == 0 {
            return Ok(None);
        }
        if !(2..=MAX_TABLE_K).contains(&k) {
            return Err(IndexError::InvalidKmerLength(k));
        }
        let expected = (1usize << (2 * k)) + 1;
        if index.len() != expected {
            return Err(IndexError::LengthMismatch { expected, found: index.len() });
        }
        let total = index.last().copied().unwrap_or(0) as usize;
        if total != addr.len() {
            return Err(IndexError::LengthMismatch { expected: total, found: addr.len() });
        }
        if index[0] != 0 {
            return Err(IndexError::CorruptIndex { entry: 0, reason: "table does not start at 0" });
        }
        if let Some(i) = index.windows(2).position(|w| w[0] > w[1]) {
            return Err(IndexError::CorruptIndex { entry: i + 1, reason: "table is not ascending" });
        }
        if !addr.is_empty() && seq_len < k {
            return Err(IndexError::SequenceTooShort { len: seq_len, k });
        }
        let last_start = seq_len.saturating_sub(k);
        for w in index.windows(2) {
            let bucket = &addr[w[0] as usize..w[1] as usize];
            if let Some(i) = bucket.iter().position(|&p| p as usize > last_start) {
                return Err(IndexError::CorruptIndex {
                    entry: w[0] as usize + i,
                    reason: "position past the end of the sequence",
                });
            }
            if let Some(i) = bucket.windows(2).position(|p| p[0] >= p[1]) {
                return Err(IndexError::CorruptIndex {
                    entry: w[0] as usize + i + 1,
                    reason: "bucket is not ascending",
                });
            }
        }
        Ok(Some(Self { num_indexed_chars: k, index, addr }))
    }
}
