use std::cmp::Ordering;
use std::fmt;
use std::io::Write;

use crate::error::{IndexError, Result};
use crate::io::binary::{BinaryWriter, Mapper};
use crate::util::bits::{self, CpuFeatures};
use crate::util::dna;

pub const BASES_PER_WORD: usize = 32;

/// DNA stored two bits per base, 32 bases per `u64`, first base in the top
/// bits. Bits past `len` in the last word are always zero.
#[derive(Debug, Clone, Default)]
pub struct PackedSequence<W = Vec<u64>> {
    len: usize,
    words: W,
}

/// Read-only view over words that live in a mapped index file.
pub type MappedPackedSequence<'a> = PackedSequence<&'a [u64]>;

#[inline]
fn words_for(len: usize) -> usize {
    len.div_ceil(BASES_PER_WORD)
}

impl PackedSequence<Vec<u64>> {
    pub fn new() -> Self {
        Self::default()
    }

    /// `len` bases, all 'A'.
    pub fn with_len(len: usize) -> Self {
        Self { len, words: vec![0; words_for(len)] }
    }

    pub fn from_ascii(bytes: &[u8]) -> Self {
        let mut s = Self::new();
        s.append(bytes);
        s
    }

    /// Append ASCII bases. Whitespace is skipped and anything that is not
    /// ACGT packs as 'A'.
    pub fn append(&mut self, bytes: &[u8]) {
        self.append_codes(
            bytes
                .iter()
                .filter(|&&b| !dna::is_whitespace(b))
                .map(|&b| dna::to_code(b)),
        );
    }

    /// Append raw 2-bit codes.
    pub fn append_codes<I: IntoIterator<Item = u8>>(&mut self, codes: I) {
        let rem = self.len % BASES_PER_WORD;
        let mut acc = if rem != 0 {
            self.words.pop().unwrap_or(0) >> ((BASES_PER_WORD - rem) * 2)
        } else {
            0
        };
        for code in codes {
            acc = (acc << 2) | (code & 3) as u64;
            self.len += 1;
            if self.len % BASES_PER_WORD == 0 {
                self.words.push(acc);
                acc = 0;
            }
        }
        let rem = self.len % BASES_PER_WORD;
        if rem != 0 {
            self.words.push(acc << ((BASES_PER_WORD - rem) * 2));
        }
    }

    /// Truncate, or extend with 'A'.
    pub fn resize(&mut self, len: usize) {
        self.words.resize(words_for(len), 0);
        if len < self.len && len % BASES_PER_WORD != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= bits::prefix_mask(len % BASES_PER_WORD);
            }
        }
        self.len = len;
    }

    pub fn set_code(&mut self, index: usize, code: u8) {
        if index >= self.len {
            return;
        }
        let sh = (BASES_PER_WORD - 1 - index % BASES_PER_WORD) * 2;
        let w = &mut self.words[index / BASES_PER_WORD];
        *w = (*w & !(3u64 << sh)) | (((code & 3) as u64) << sh);
    }
}

impl<W: AsRef<[u64]>> PackedSequence<W> {
    /// Wrap existing words, checking the word count against `len`.
    pub fn from_words(len: usize, words: W) -> Result<Self> {
        let expected = words_for(len);
        let found = words.as_ref().len();
        if found != expected {
            return Err(IndexError::LengthMismatch { expected, found });
        }
        Ok(Self { len, words })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn words(&self) -> &[u64] {
        self.words.as_ref()
    }

    #[inline]
    fn word_at(&self, index: i64) -> u64 {
        if index < 0 {
            0
        } else {
            self.words().get(index as usize).copied().unwrap_or(0)
        }
    }

    /// 2-bit code at `index`; 0 past the end.
    #[inline]
    pub fn code(&self, index: usize) -> u8 {
        if index >= self.len {
            return 0;
        }
        let sh = (BASES_PER_WORD - 1 - index % BASES_PER_WORD) * 2;
        ((self.words()[index / BASES_PER_WORD] >> sh) & 3) as u8
    }

    /// ASCII base at `index`; 'N' past the end.
    #[inline]
    pub fn get(&self, index: usize) -> char {
        if index >= self.len {
            'N'
        } else {
            dna::from_code(self.code(index)) as char
        }
    }

    /// The 32 bases starting at `base`, which may be negative or run past the
    /// end; bases outside the sequence read as 'A'.
    #[inline]
    pub fn window(&self, base: i64) -> u64 {
        let offset = base.div_euclid(BASES_PER_WORD as i64);
        let sh = base.rem_euclid(BASES_PER_WORD as i64) as u32 * 2;
        let v0 = self.word_at(offset);
        if sh == 0 {
            v0
        } else {
            (v0 << sh) | (self.word_at(offset + 1) >> (64 - sh))
        }
    }

    /// Right-justified value of the `k` bases at `pos` (k <= 32).
    #[inline]
    pub fn kmer(&self, pos: usize, k: usize) -> u64 {
        if k == 0 {
            return 0;
        }
        self.window(pos as i64) >> ((BASES_PER_WORD - k) * 2)
    }

    pub fn substr(&self, offset: usize, len: usize, rev_comp: bool) -> PackedSequence {
        let offset = offset.min(self.len);
        let len = len.min(self.len - offset);
        let nv = words_for(len);
        let mut words = Vec::with_capacity(nv);
        for i in 0..nv {
            let w = if rev_comp {
                let addr = (offset + len) as i64 - ((i + 1) * BASES_PER_WORD) as i64;
                bits::rev_comp_word(self.window(addr))
            } else {
                self.window((offset + i * BASES_PER_WORD) as i64)
            };
            words.push(w);
        }
        if let Some(last) = words.last_mut() {
            *last &= bits::prefix_mask(len - (nv - 1) * BASES_PER_WORD);
        }
        PackedSequence { len, words }
    }

    pub fn rev_comp(&self) -> PackedSequence {
        self.substr(0, self.len, true)
    }

    /// Walk `other` word by word against `self` at `pos`, counting mismatched
    /// bases until the count exceeds `limit`. Also returns the ordering of the
    /// first differing word. `care` zeroes lanes that must not count.
    fn mismatch_scan<W2: AsRef<[u64]>>(
        &self,
        pos: usize,
        len: usize,
        other: &PackedSequence<W2>,
        care: Option<&[u64]>,
        limit: usize,
    ) -> (usize, Ordering) {
        let pos = pos.min(self.len);
        let len = len.min(other.len).min(self.len - pos);
        let f = CpuFeatures::get();
        let other_words = other.words();
        let nv = words_for(len);
        let mut errors = 0usize;
        let mut first = Ordering::Equal;
        for i in 0..nv {
            let mut mask = if i + 1 == nv {
                bits::prefix_mask(len - i * BASES_PER_WORD)
            } else {
                !0
            };
            if let Some(care) = care {
                mask &= care.get(i).copied().unwrap_or(0);
            }
            let w = self.window((pos + i * BASES_PER_WORD) as i64) & mask;
            let s = other_words[i] & mask;
            if w != s {
                if first == Ordering::Equal {
                    first = w.cmp(&s);
                }
                errors += bits::base_mismatches(w ^ s, f) as usize;
                if errors > limit {
                    break;
                }
            }
        }
        (errors, first)
    }

    /// Lexicographic comparison of `self[pos..pos + len]` against the start of
    /// `other`, over the bases both sides have.
    pub fn compare<W2: AsRef<[u64]>>(
        &self,
        pos: usize,
        len: usize,
        other: &PackedSequence<W2>,
    ) -> Ordering {
        self.compare_inexact(pos, len, other, 0)
    }

    /// `Equal` when at most `max_distance` bases differ, otherwise the order
    /// of the first differing word. With `max_distance == 0` this is
    /// [`compare`](Self::compare).
    pub fn compare_inexact<W2: AsRef<[u64]>>(
        &self,
        pos: usize,
        len: usize,
        other: &PackedSequence<W2>,
        max_distance: usize,
    ) -> Ordering {
        let (errors, first) = self.mismatch_scan(pos, len, other, None, max_distance);
        if errors <= max_distance {
            Ordering::Equal
        } else {
            first
        }
    }

    /// Number of mismatched bases between `self[pos..]` and `other`.
    pub fn distance<W2: AsRef<[u64]>>(
        &self,
        pos: usize,
        len: usize,
        other: &PackedSequence<W2>,
    ) -> usize {
        self.mismatch_scan(pos, len, other, None, usize::MAX).0
    }

    /// Like [`distance`](Self::distance) over all of `other`, but ignoring
    /// lanes cleared in `care` and giving up once the count passes `limit`.
    pub(crate) fn masked_distance<W2: AsRef<[u64]>>(
        &self,
        pos: usize,
        other: &PackedSequence<W2>,
        care: Option<&[u64]>,
        limit: usize,
    ) -> usize {
        self.mismatch_scan(pos, other.len, other, care, limit).0
    }

    /// Exact brute-force search.
    pub fn find<W2: AsRef<[u64]>>(
        &self,
        query: &PackedSequence<W2>,
        start: usize,
        max_len: usize,
    ) -> Option<usize> {
        self.find_inexact(query, start, max_len, 0)
    }

    /// First position `p >= start` with `query` fully inside
    /// `start..start + max_len` and at most `max_distance` mismatches.
    pub fn find_inexact<W2: AsRef<[u64]>>(
        &self,
        query: &PackedSequence<W2>,
        start: usize,
        max_len: usize,
        max_distance: usize,
    ) -> Option<usize> {
        self.find_masked(query, None, start, max_len, max_distance)
    }

    pub(crate) fn find_masked<W2: AsRef<[u64]>>(
        &self,
        query: &PackedSequence<W2>,
        care: Option<&[u64]>,
        start: usize,
        max_len: usize,
        max_distance: usize,
    ) -> Option<usize> {
        let q = query.len();
        if q == 0 {
            return (start <= self.len).then_some(start);
        }
        if start >= self.len {
            return None;
        }
        let last = start + max_len.min(self.len - start);
        if start + q > last {
            return None;
        }
        let final_pos = last - q;
        let f = CpuFeatures::get();
        let s0 = query.words()[0];
        if max_distance == 0 && q >= 4 && care.is_none() {
            return self.exact_scan(query, s0, start, final_pos, f);
        }
        let mut s0mask = bits::prefix_mask(q);
        if let Some(care) = care {
            s0mask &= care.first().copied().unwrap_or(0);
        }
        self.inexact_scan(query, care, s0, s0mask, start, final_pos, max_distance, f)
    }

    /// Test 32 alignments per word for a match of the first four query bases,
    /// then verify only the flagged positions.
    fn exact_scan<W2: AsRef<[u64]>>(
        &self,
        query: &PackedSequence<W2>,
        s0: u64,
        start: usize,
        final_pos: usize,
        f: CpuFeatures,
    ) -> Option<usize> {
        const REPEAT: u64 = 0x5555_5555_5555_5555;
        // each lane of rep_n holds the complement of query base n
        let rep0 = !((s0 >> 62) * REPEAT);
        let rep1 = !(((s0 >> 60) & 3) * REPEAT);
        let rep2 = !(((s0 >> 58) & 3) * REPEAT);
        let rep3 = !(((s0 >> 56) & 3) * REPEAT);
        let s0mask = bits::prefix_mask(query.len());
        for i in start / BASES_PER_WORD..=final_pos / BASES_PER_WORD {
            let v0 = self.word_at(i as i64);
            let v1 = self.word_at(i as i64 + 1);
            // a lane ends up 0b11 where the text base equals the query base
            let mut mask = v0 ^ rep0;
            mask &= ((v0 << 2) | (v1 >> 62)) ^ rep1;
            mask &= ((v0 << 4) | (v1 >> 60)) ^ rep2;
            mask &= ((v0 << 6) | (v1 >> 58)) ^ rep3;
            mask &= mask << 1;
            mask &= 0xaaaa_aaaa_aaaa_aaaa;

            while mask != 0 {
                let lz = bits::leading_zeros(mask, f);
                mask &= !(1u64 << (63 - lz));
                let pos = i * BASES_PER_WORD + lz as usize / 2;
                if pos < start || pos > final_pos {
                    continue;
                }
                if (self.window(pos as i64) ^ s0) & s0mask == 0
                    && self.compare(pos, query.len(), query) == Ordering::Equal
                {
                    return Some(pos);
                }
            }
        }
        None
    }

    /// Popcount pre-filter over the first query word for each of the 32
    /// alignments in a text word; full comparison only for words with a hit.
    fn inexact_scan<W2: AsRef<[u64]>>(
        &self,
        query: &PackedSequence<W2>,
        care: Option<&[u64]>,
        s0: u64,
        s0mask: u64,
        start: usize,
        final_pos: usize,
        max_distance: usize,
        f: CpuFeatures,
    ) -> Option<usize> {
        let budget = max_distance.min(BASES_PER_WORD) as u32;
        for i in start / BASES_PER_WORD..=final_pos / BASES_PER_WORD {
            let mut v0 = self.word_at(i as i64);
            let mut v1 = self.word_at(i as i64 + 1);
            let mut have_hits = false;
            for _ in 0..BASES_PER_WORD {
                have_hits |= bits::base_mismatches((v0 ^ s0) & s0mask, f) <= budget;
                v0 = (v0 << 2) | (v1 >> 62);
                v1 <<= 2;
            }
            if !have_hits {
                continue;
            }
            for j in 0..BASES_PER_WORD {
                let pos = i * BASES_PER_WORD + j;
                if pos < start {
                    continue;
                }
                if pos > final_pos {
                    break;
                }
                let (errors, _) = self.mismatch_scan(pos, query.len(), query, care, max_distance);
                if errors <= max_distance {
                    return Some(pos);
                }
            }
        }
        None
    }

    pub fn write_binary<Wr: Write>(&self, wr: &mut BinaryWriter<Wr>) -> std::io::Result<()> {
        wr.write_u64(self.len as u64)?;
        wr.write_slice(self.words())
    }
}

impl<'a> PackedSequence<&'a [u64]> {
    pub fn map(m: &mut Mapper<'a>) -> Result<Self> {
        let len = m.read_u64()? as usize;
        let words = m.read_slice::<u64>()?;
        Self::from_words(len, words)
    }
}

impl From<&str> for PackedSequence {
    fn from(s: &str) -> Self {
        Self::from_ascii(s.as_bytes())
    }
}

impl<W: AsRef<[u64]>> fmt::Display for PackedSequence<W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s: String = (0..self.len).map(|i| self.get(i)).collect();
        f.write_str(&s)
    }
}

impl<W: AsRef<[u64]>, W2: AsRef<[u64]>> PartialEq<PackedSequence<W2>> for PackedSequence<W> {
    fn eq(&self, other: &PackedSequence<W2>) -> bool {
        self.len == other.len && self.words() == other.words()
    }
}

impl<W: AsRef<[u64]>> Eq for PackedSequence<W> {}

impl<W: AsRef<[u64]>> PartialOrd for PackedSequence<W> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<W: AsRef<[u64]>> Ord for PackedSequence<W> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.words().cmp(other.words()).then(self.len.cmp(&other.len))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_STRING: &str = "ACGTTTGAACCGACCGACCGACCGTGCGACCGACCGACCG";

    fn make_seq(len: usize, seed: u32) -> String {
        let bases = [b'A', b'C', b'G', b'T'];
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                bases[(x >> 16) as usize % 4] as char
            })
            .collect()
    }

    fn naive_distance(a: &[u8], b: &[u8]) -> usize {
        a.iter().zip(b).filter(|(x, y)| x != y).count()
    }

    #[test]
    fn ascii_round_trip() {
        let s = PackedSequence::from("tTAACcGGTTACgtacgtacGTACGTACGTACGTACGT");
        assert_eq!(s.to_string(), "TTAACCGGTTACGTACGTACGTACGTACGTACGTACGT");

        let s = PackedSequence::from("TGCAACGTttttXXXX\nAACCGGTT");
        assert_eq!(s.to_string(), "TGCAACGTTTTTAAAAAACCGGTT");

        let long = make_seq(517, 7);
        assert_eq!(PackedSequence::from(long.as_str()).to_string(), long);
    }

    #[test]
    fn append_across_word_boundaries() {
        let mut b = PackedSequence::from("ACGT");
        b.append(b"TTGA");
        assert_eq!(b.to_string(), "ACGTTTGA");
        b.append(b"ACCGACCGACCGACCGTGCGACCGACCGACCG");
        assert_eq!(b.to_string(), TEST_STRING);
        assert_eq!(b.get(0), 'A');
        assert_eq!(b.get(31), 'G');
        assert_eq!(b.get(32), 'A');
        assert_eq!(b.get(33), 'C');
        assert_eq!(b.get(999), 'N');
        assert_eq!(b.words().len(), 2);
    }

    #[test]
    fn resize_clears_dropped_bases() {
        let mut b = PackedSequence::from("ACGT");
        b.resize(3);
        b.resize(4);
        assert_eq!(b.to_string(), "ACGA");
        assert_eq!(b, PackedSequence::from("ACGA"));
    }

    #[test]
    fn set_code_in_place() {
        let mut b = PackedSequence::with_len(40);
        b.set_code(33, 3);
        b.set_code(40, 3);
        assert_eq!(b.get(33), 'T');
        assert_eq!(b.len(), 40);
        assert_eq!(b.to_string().matches('T').count(), 1);
    }

    #[test]
    fn window_handles_negative_and_straddling_offsets() {
        let s = PackedSequence::from("ACTGTGACTTAACCGGTCTCAGAGACGATTGGCCAATTGA");
        assert_eq!(s.window(-4), s.window(0) >> 8);
        assert_eq!(s.window(4), (s.window(0) << 8) | (s.window(32) >> 56));
        assert_eq!(s.window(-32), 0);
        assert_eq!(s.window(64), 0);
        assert_eq!(s.kmer(2, 4), crate::util::dna::kmer_value(b"TGTG", 0, 4));
    }

    #[test]
    fn substr_forward_and_reverse() {
        let b = PackedSequence::from(TEST_STRING);
        assert_eq!(b.substr(8, 8, false).to_string(), "ACCGACCG");
        assert_eq!(b.substr(8, 40, false).to_string(), &TEST_STRING[8..]);
        assert_eq!(
            PackedSequence::from("TGCAACACACA").rev_comp().to_string(),
            "TGTGTGTTGCA"
        );
        let rc = b.substr(3, 33, true).to_string();
        let expected = String::from_utf8(crate::util::dna::revcomp(&TEST_STRING.as_bytes()[3..36])).unwrap();
        assert_eq!(rc, expected);
    }

    #[test]
    fn rev_comp_is_an_involution() {
        for len in [0, 1, 31, 32, 33, 100, 257] {
            let s = PackedSequence::from(make_seq(len, len as u32 + 1).as_str());
            assert_eq!(s.rev_comp().rev_comp(), s);
        }
    }

    #[test]
    fn find_respects_search_window() {
        let s = PackedSequence::from(
            "ACGTACGTACGTACGTACGTACGTACGTACCATTGTACGTACGTACGTACGTACGTACGTACGT",
        );
        let cat = PackedSequence::from("CAT");
        assert_eq!(s.find(&cat, 0, 33), Some(30));
        assert_eq!(s.find(&cat, 0, 32), None);
        assert_eq!(s.find(&cat, 31, usize::MAX), None);
    }

    #[test]
    fn exact_find_matches_naive_scan() {
        let text = make_seq(2000, 99);
        let s = PackedSequence::from(text.as_str());
        for (qpos, qlen) in [(0, 4), (17, 5), (500, 12), (1999 - 40, 40), (1234, 70)] {
            let query = &text[qpos..qpos + qlen];
            let expected = text.find(query);
            assert_eq!(s.find(&PackedSequence::from(query), 0, usize::MAX), expected);
        }
        assert_eq!(s.find(&PackedSequence::from("ACGTACGTACGTACGTACGTAAAAAA"), 0, usize::MAX), None);
    }

    #[test]
    fn inexact_find_matches_naive_scan() {
        let text = make_seq(600, 3);
        let s = PackedSequence::from(text.as_str());
        let mut query = text.as_bytes()[300..330].to_vec();
        query[5] = if query[5] == b'A' { b'C' } else { b'A' };
        query[20] = if query[20] == b'G' { b'T' } else { b'G' };
        let q = PackedSequence::from(std::str::from_utf8(&query).unwrap());
        let naive = |start: usize, d: usize| {
            (start..=text.len() - query.len())
                .find(|&p| naive_distance(&text.as_bytes()[p..p + query.len()], &query) <= d)
        };
        assert_eq!(naive(0, 2), Some(300));
        assert_eq!(s.find_inexact(&q, 0, usize::MAX, 2), naive(0, 2));
        assert_eq!(s.find_inexact(&q, 0, usize::MAX, 1), naive(0, 1));
        assert_eq!(s.find_inexact(&q, 301, usize::MAX, 2), naive(301, 2));
    }

    #[test]
    fn gataca_with_one_error() {
        let s = PackedSequence::from("ACGTGAAACAGTGATACA");
        let q = PackedSequence::from("GATACA");
        assert_eq!(s.find_inexact(&q, 0, usize::MAX, 1), Some(4));
        assert_eq!(s.find_inexact(&q, 5, usize::MAX, 1), Some(12));
        assert_eq!(s.find(&q, 0, usize::MAX), Some(12));
    }

    #[test]
    fn compare_and_distance() {
        let s = PackedSequence::from("ACGTACGTAC");
        let q = PackedSequence::from("ACGAACGTAT");
        assert_eq!(s.distance(0, 10, &q), 2);
        assert_eq!(s.compare(0, 10, &q), Ordering::Greater);
        assert_eq!(s.compare_inexact(0, 10, &q, 1), Ordering::Greater);
        assert_eq!(s.compare_inexact(0, 10, &q, 2), Ordering::Equal);
        assert_eq!(s.compare(4, 4, &PackedSequence::from("ACGT")), Ordering::Equal);
    }

    #[test]
    fn from_words_checks_word_count() {
        let words = [0u64; 2];
        assert!(PackedSequence::from_words(40, &words[..]).is_ok());
        assert!(matches!(
            PackedSequence::from_words(70, &words[..]),
            Err(IndexError::LengthMismatch { expected: 3, found: 2 })
        ));
    }
}
