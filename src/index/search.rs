//! Seeded inexact search.
//!
//! The query is cut into non-overlapping k-mer seeds. Every bucket hit
//! implies an alignment start (`hit - seed_offset`); the per-seed hit lists
//! are merged through a min-heap and any start implied by at least
//! `active_seeds - max_distance` seeds is verified against the reference.
//! Substitutions only: a start with at most `max_distance` mismatches keeps
//! at least that many seeds intact.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::ops::AddAssign;

use log::debug;

use crate::index::seed::SeedLookup;
use crate::seq::PackedSequence;
use crate::util::dna;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub max_distance: usize,
    /// Reserved; no search consults it yet.
    pub max_gap: usize,
    pub max_results: usize,
    pub always_brute_force: bool,
    pub never_brute_force: bool,
    pub search_rev_comp: bool,
    /// Seeds whose bucket is larger than this are dropped. `None` keeps all.
    pub max_bucket_size: Option<usize>,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            max_distance: 0,
            max_gap: 0,
            max_results: 100,
            always_brute_force: false,
            never_brute_force: false,
            search_rev_comp: false,
            max_bucket_size: Some(100),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub merges_done: u64,
    pub compares_done: u64,
    pub seeds_dropped: u64,
}

impl AddAssign for SearchStats {
    fn add_assign(&mut self, rhs: Self) {
        self.merges_done += rhs.merges_done;
        self.compares_done += rhs.compares_done;
        self.seeds_dropped += rhs.seeds_dropped;
    }
}

/// A query packed for search. Non-ACGT bytes pack as 'A' and are recorded in
/// a care mask (`0b11` per real base, `0b00` per wildcard) so they never
/// count as mismatches.
#[derive(Debug, Clone)]
pub struct Query {
    bases: PackedSequence,
    care: Option<PackedSequence>,
}

impl Query {
    pub fn new(ascii: &[u8]) -> Self {
        let ascii: Vec<u8> = ascii.iter().copied().filter(|&b| !dna::is_whitespace(b)).collect();
        let bases = PackedSequence::from_ascii(&ascii);
        let care = if ascii.iter().all(|&b| dna::is_base(b)) {
            None
        } else {
            let mut care = PackedSequence::new();
            care.append_codes(ascii.iter().map(|&b| if dna::is_base(b) { 3 } else { 0 }));
            Some(care)
        };
        Self { bases, care }
    }

    /// The reverse-complement strand of `ascii`.
    pub fn reverse_complement(ascii: &[u8]) -> Self {
        Self::new(&dna::revcomp(ascii))
    }

    pub fn len(&self) -> usize {
        self.bases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bases.is_empty()
    }

    pub fn bases(&self) -> &PackedSequence {
        &self.bases
    }

    pub fn care(&self) -> Option<&[u64]> {
        self.care.as_ref().map(|c| c.words())
    }

    /// True when `k` bases at `pos` are all real bases.
    pub fn is_clean(&self, pos: usize, k: usize) -> bool {
        match &self.care {
            None => true,
            Some(care) => care.kmer(pos, k) == (1u64 << (2 * k)) - 1,
        }
    }

    /// False for a wildcard position.
    pub fn cares(&self, i: usize) -> bool {
        self.care.as_ref().map_or(true, |care| care.code(i) != 0)
    }

    /// Mismatches against `reference` at `start` when at most `max_distance`.
    pub fn verify<W: AsRef<[u64]>>(
        &self,
        reference: &PackedSequence<W>,
        start: usize,
        max_distance: usize,
    ) -> Option<usize> {
        if start + self.len() > reference.len() {
            return None;
        }
        let distance = reference.masked_distance(start, &self.bases, self.care(), max_distance);
        (distance <= max_distance).then_some(distance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedHit {
    pub pos: usize,
    pub distance: usize,
}

/// One seed's walk through its bucket. Ordered by implied start first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SeedCursor {
    start: usize,
    pos: usize,
    end: usize,
    offset: usize,
}

enum Mode {
    Merge,
    BruteForce { next: usize },
    Done,
}

/// Lazy iterator over verified hits of one query strand. Results come in
/// merge order, which is ascending start within one search.
pub struct InexactSearch<'a, I: SeedLookup, W: AsRef<[u64]>> {
    index: &'a I,
    reference: &'a PackedSequence<W>,
    query: &'a Query,
    max_distance: usize,
    required: usize,
    heap: BinaryHeap<Reverse<SeedCursor>>,
    run_start: Option<usize>,
    run_len: usize,
    mode: Mode,
    stats: SearchStats,
}

impl<'a, I: SeedLookup, W: AsRef<[u64]>> InexactSearch<'a, I, W> {
    /// Set up a search for starts at or after `min_pos`.
    pub fn new(
        index: &'a I,
        reference: &'a PackedSequence<W>,
        query: &'a Query,
        params: &SearchParams,
        min_pos: usize,
    ) -> Self {
        let mut search = Self {
            index,
            reference,
            query,
            max_distance: params.max_distance,
            required: 0,
            heap: BinaryHeap::new(),
            run_start: None,
            run_len: 0,
            mode: Mode::Done,
            stats: SearchStats::default(),
        };

        if query.is_empty() {
            return search;
        }
        let k = index.num_indexed_chars();
        let num_seeds = query.len() / k;
        if params.always_brute_force || num_seeds <= params.max_distance {
            if !params.never_brute_force || params.always_brute_force {
                search.mode = Mode::BruteForce { next: min_pos };
            }
            return search;
        }

        let mut seeds: Vec<(usize, std::ops::Range<usize>)> = (0..num_seeds)
            .map(|s| s * k)
            .filter(|&offset| query.is_clean(offset, k))
            .filter_map(|offset| {
                let kmer = query.bases().kmer(offset, k);
                (!index.is_excluded(kmer)).then(|| (offset, index.bucket_range(kmer)))
            })
            .collect();
        seeds.sort_by_key(|(_, range)| range.len());
        if let Some(cap) = params.max_bucket_size {
            let keep = seeds.partition_point(|(_, range)| range.len() <= cap);
            let dropped = seeds.len() - keep;
            if dropped > 0 {
                debug!("dropping {dropped} of {} seeds with buckets over {cap}", seeds.len());
            }
            search.stats.seeds_dropped += dropped as u64;
            seeds.truncate(keep);
        }

        if seeds.len() <= params.max_distance {
            return search;
        }
        search.required = seeds.len() - params.max_distance;

        let addr = index.addr();
        for (offset, range) in seeds {
            let bucket = addr.get(range.clone()).unwrap_or(&[]);
            let first = bucket.partition_point(|&hit| (hit as usize) < offset + min_pos);
            if first < bucket.len() {
                let pos = range.start + first;
                search.heap.push(Reverse(SeedCursor {
                    start: bucket[first] as usize - offset,
                    pos,
                    end: range.end,
                    offset,
                }));
            }
        }
        search.mode = Mode::Merge;
        search
    }

    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    fn next_brute_force(&mut self, from: usize) -> Option<SeedHit> {
        let mut from = from;
        loop {
            let pos = self.reference.find_masked(
                self.query.bases(),
                self.query.care(),
                from,
                usize::MAX,
                self.max_distance,
            );
            self.stats.compares_done += 1;
            let Some(pos) = pos else {
                self.mode = Mode::Done;
                return None;
            };
            self.mode = Mode::BruteForce { next: pos + 1 };
            if let Some(distance) = self.query.verify(self.reference, pos, self.max_distance) {
                return Some(SeedHit { pos, distance });
            }
            from = pos + 1;
        }
    }

    fn next_merged(&mut self) -> Option<SeedHit> {
        let addr = self.index.addr();
        loop {
            let next_start = self.heap.peek().map(|Reverse(c)| c.start);
            if next_start != self.run_start {
                let finished = self.run_start.take();
                let run_len = std::mem::take(&mut self.run_len);
                if let Some(start) = finished {
                    if run_len >= self.required {
                        self.stats.compares_done += 1;
                        if let Some(distance) = self.query.verify(self.reference, start, self.max_distance) {
                            return Some(SeedHit { pos: start, distance });
                        }
                    }
                }
                self.run_start = next_start;
            }

            let Some(Reverse(mut cursor)) = self.heap.pop() else {
                self.mode = Mode::Done;
                return None;
            };
            self.stats.merges_done += 1;
            self.run_len += 1;
            cursor.pos += 1;
            if cursor.pos < cursor.end {
                // buckets ascend, so a cursor never moves before its seed offset
                if let Some(start) = (addr[cursor.pos] as usize).checked_sub(cursor.offset) {
                    cursor.start = start;
                    self.heap.push(Reverse(cursor));
                }
            }
        }
    }
}

impl<I: SeedLookup, W: AsRef<[u64]>> Iterator for InexactSearch<'_, I, W> {
    type Item = SeedHit;

    fn next(&mut self) -> Option<SeedHit> {
        match self.mode {
            Mode::Merge => self.next_merged(),
            Mode::BruteForce { next } => self.next_brute_force(next),
            Mode::Done => None,
        }
    }
}
