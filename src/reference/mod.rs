//! A multi-chromosome reference: one concatenated [`AugmentedSequence`],
//! the chromosome table, and an optional seed index over the packed bases.

mod chromosome;

pub use chromosome::{Chromosome, NAME_LEN};

use std::io::{self, Write};

use log::{debug, info};

use crate::error::{IndexError, Result};
use crate::index::search::{InexactSearch, Query, SearchParams, SearchStats};
use crate::index::seed::{self, ImmutableSeedIndex, IndexConfig, SeedIndex, SeedLookup};
use crate::io::binary::{BinaryWriter, Mapper};
use crate::io::fasta::FastaReader;
use crate::seq::{AugmentedSequence, MappedAugmentedSequence};
use crate::storage::{Mapped, Owned, Storage};
use crate::util::dna;

/// One hit of a query against the reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FastaResult {
    /// Linear offset into the concatenated reference.
    pub location: u64,
    pub distance: u64,
    pub reverse_complement: bool,
}

pub struct ReferenceStore<S: Storage = Owned> {
    chromosomes: S::Chromosomes,
    sequence: AugmentedSequence<S::Words, S::Table>,
    index: Option<SeedIndex<S::Table>>,
}

pub type MappedReferenceStore<'a> = ReferenceStore<Mapped<'a>>;

impl Default for ReferenceStore<Owned> {
    fn default() -> Self {
        Self { chromosomes: Vec::new(), sequence: AugmentedSequence::new(), index: None }
    }
}

fn is_n(b: u8) -> bool {
    b == b'N' || b == b'n'
}

impl ReferenceStore<Owned> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append every record of a FASTA byte range; the full header line is
    /// kept as chromosome info. Leading and trailing N runs
    /// are not stored, only counted. Returns the number of records added.
    pub fn append(&mut self, fasta: &[u8]) -> usize {
        let mut added = 0;
        for rec in FastaReader::new(fasta) {
            let bases: Vec<u8> = rec.seq.iter().copied().filter(|&b| !dna::is_whitespace(b)).collect();
            let leading = bases.iter().take_while(|&&b| is_n(b)).count();
            let trailing = bases[leading..].iter().rev().take_while(|&&b| is_n(b)).count();
            let body = &bases[leading..bases.len() - trailing];

            let start = self.sequence.len() as u64;
            self.sequence.append(body);
            let mut c = Chromosome::new(rec.id, rec.header, start, self.sequence.len() as u64);
            c.num_leading_n = leading as u64;
            c.num_trailing_n = trailing as u64;
            debug!("chromosome {}: {} bases, {} + {} N stripped", c.name(), c.len(), leading, trailing);
            self.chromosomes.push(c);
            added += 1;
        }
        if added > 0 {
            self.index = None;
        }
        added
    }

    /// Append a chromosome of `len` pseudo-random bases, reproducible from
    /// `seed`.
    pub fn append_random(&mut self, name: &str, len: usize, seed: u64) {
        let mut x = seed;
        let bases: Vec<u8> = (0..len)
            .map(|_| {
                x = x
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                dna::from_code((x >> 62) as u8)
            })
            .collect();
        let start = self.sequence.len() as u64;
        self.sequence.append(&bases);
        self.chromosomes
            .push(Chromosome::new(name.as_bytes(), b"random", start, self.sequence.len() as u64));
        self.index = None;
    }

    pub fn make_index(&mut self, config: &IndexConfig) -> Result<()> {
        if self.sequence.is_empty() {
            return Err(IndexError::EmptyReference);
        }
        info!(
            "indexing {} bases in {} chromosomes",
            self.sequence.len(),
            self.chromosomes.len()
        );
        self.index = Some(SeedIndex::build(self.sequence.packed(), config)?);
        Ok(())
    }

    /// Write the flat binary form that [`ReferenceStore::map`] reads back.
    pub fn write_binary<W: Write>(&self, out: W) -> io::Result<W> {
        let mut wr = BinaryWriter::new(out);
        wr.write_slice(&self.chromosomes)?;
        self.sequence.write_binary(&mut wr)?;
        match &self.index {
            Some(index) => index.write_binary(&mut wr)?,
            None => seed::write_absent(&mut wr)?,
        }
        wr.flush()?;
        Ok(wr.into_inner())
    }
}

impl<'a> ReferenceStore<Mapped<'a>> {
    /// View a region written by [`ReferenceStore::write_binary`] without
    /// copying. The region must start 8-byte aligned.
    pub fn map(data: &'a [u8]) -> Result<Self> {
        let mut m = Mapper::new(data);
        let chromosomes = m.read_slice::<Chromosome>()?;
        let sequence = MappedAugmentedSequence::map(&mut m)?;
        let index = ImmutableSeedIndex::map(&mut m, sequence.len())?;
        info!(
            "mapped {} chromosomes, {} bases, index {}",
            chromosomes.len(),
            sequence.len(),
            index.as_ref().map_or("absent".to_string(), |i| format!("k = {}", i.num_indexed_chars()))
        );
        Ok(Self { chromosomes, sequence, index })
    }
}

impl<S: Storage> ReferenceStore<S> {
    pub fn sequence(&self) -> &AugmentedSequence<S::Words, S::Table> {
        &self.sequence
    }

    pub fn index(&self) -> Option<&SeedIndex<S::Table>> {
        self.index.as_ref()
    }

    pub fn chromosomes(&self) -> &[Chromosome] {
        self.chromosomes.as_ref()
    }

    pub fn num_chromosomes(&self) -> usize {
        self.chromosomes().len()
    }

    pub fn get_chromosome(&self, i: usize) -> Option<&Chromosome> {
        self.chromosomes().get(i)
    }

    /// Chromosome whose stored bases contain linear offset `pos`.
    pub fn find_chromosome(&self, pos: u64) -> Option<&Chromosome> {
        let chromosomes = self.chromosomes();
        let i = chromosomes.partition_point(|c| c.end <= pos);
        chromosomes.get(i).filter(|c| c.contains(pos))
    }

    /// Chromosome and 0-based position within it as written in the FASTA,
    /// counting the stripped leading N run.
    pub fn locate(&self, pos: u64) -> Option<(&Chromosome, u64)> {
        self.find_chromosome(pos)
            .map(|c| (c, pos - c.start + c.num_leading_n))
    }

    /// Search `query` (ASCII) on the forward strand and, if asked, the
    /// reverse complement. Hits that run across a chromosome boundary are
    /// dropped. Annotated reference bases (N and other non-ACGT bytes) count
    /// as mismatches against every real query base. At most
    /// `params.max_results` are returned.
    pub fn find_inexact(
        &self,
        query: &[u8],
        params: &SearchParams,
        stats: &mut SearchStats,
    ) -> Vec<FastaResult> {
        let mut results = Vec::new();
        let forward = Query::new(query);
        if forward.is_empty() || params.max_results == 0 {
            return results;
        }
        let reverse = params.search_rev_comp.then(|| Query::reverse_complement(query));
        let strands = std::iter::once((&forward, false)).chain(reverse.as_ref().map(|q| (q, true)));

        for (q, reverse_complement) in strands {
            let mut push = |pos: usize, distance: usize| -> bool {
                let location = pos as u64;
                let inside = self
                    .find_chromosome(location)
                    .is_some_and(|c| location + q.len() as u64 <= c.end);
                let distance = distance + self.annotation_mismatches(q, pos);
                if inside && distance <= params.max_distance {
                    results.push(FastaResult { location, distance: distance as u64, reverse_complement });
                }
                results.len() >= params.max_results
            };
            match &self.index {
                Some(index) => {
                    let mut search = InexactSearch::new(index, self.sequence.packed(), q, params, 0);
                    let mut full = false;
                    for hit in search.by_ref() {
                        if push(hit.pos, hit.distance) {
                            full = true;
                            break;
                        }
                    }
                    *stats += search.stats();
                    if full {
                        break;
                    }
                }
                None => {
                    // no index yet: scan the whole sequence
                    let packed = self.sequence.packed();
                    let mut from = 0;
                    let mut full = false;
                    while let Some(pos) =
                        packed.find_masked(q.bases(), q.care(), from, usize::MAX, params.max_distance)
                    {
                        stats.compares_done += 1;
                        if let Some(distance) = q.verify(packed, pos, params.max_distance) {
                            if push(pos, distance) {
                                full = true;
                                break;
                            }
                        }
                        from = pos + 1;
                    }
                    if full {
                        break;
                    }
                }
            }
        }
        results
    }

    /// Mismatches the packed layer missed at `pos`: an annotated reference
    /// base reads as 'A' there, so only query 'A's need adding.
    fn annotation_mismatches(&self, q: &Query, pos: usize) -> usize {
        self.sequence
            .annotated_runs(pos, q.len())
            .into_iter()
            .flatten()
            .filter(|&i| q.cares(i - pos) && q.bases().code(i - pos) == 0)
            .count()
    }

    /// Human-readable dump: one line per chromosome, then the seed buckets.
    pub fn write_ascii<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for c in self.chromosomes() {
            writeln!(
                out,
                "{}\t{}\t{}\t{}\t{}\t{}",
                c.name(),
                c.info(),
                c.start,
                c.end,
                c.num_leading_n,
                c.num_trailing_n
            )?;
        }
        if let Some(index) = &self.index {
            writeln!(out, "# seed index k = {}", index.num_indexed_chars())?;
            index.write_ascii(out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn random_bases(len: usize, seed: u32) -> String {
        let mut x = seed;
        (0..len)
            .map(|_| {
                x = x.wrapping_mul(1_103_515_245).wrapping_add(12_345);
                b"ACGT"[(x >> 16) as usize % 4] as char
            })
            .collect()
    }

    fn two_chromosomes() -> (String, String, ReferenceStore) {
        let chr1 = random_bases(800, 1);
        let chr2 = random_bases(600, 2);
        let fasta = format!(">chr1 first\nNNNN{}\n{}NN\n>chr2\n{}\n", &chr1[..400], &chr1[400..], chr2);
        let mut store = ReferenceStore::new();
        assert_eq!(store.append(fasta.as_bytes()), 2);
        (chr1, chr2, store)
    }

    fn params(max_distance: usize) -> SearchParams {
        SearchParams { max_distance, search_rev_comp: true, ..SearchParams::default() }
    }

    fn aligned_copy(bytes: &[u8]) -> Vec<u64> {
        let mut words = vec![0u64; bytes.len().div_ceil(8)];
        bytemuck::cast_slice_mut::<u64, u8>(&mut words)[..bytes.len()].copy_from_slice(bytes);
        words
    }

    #[test]
    fn strips_n_runs_and_records_offsets() {
        let (chr1, chr2, store) = two_chromosomes();
        assert_eq!(store.num_chromosomes(), 2);
        let c1 = store.get_chromosome(0).unwrap();
        assert_eq!(c1.name(), "chr1");
        assert_eq!(c1.info(), "chr1 first");
        assert_eq!((c1.start, c1.end, c1.num_leading_n, c1.num_trailing_n), (0, 800, 4, 2));
        let c2 = store.get_chromosome(1).unwrap();
        assert_eq!((c2.start, c2.end), (800, 1400));
        assert_eq!(store.sequence().to_string(), format!("{chr1}{chr2}"));

        assert_eq!(store.find_chromosome(799).unwrap().name(), "chr1");
        assert_eq!(store.find_chromosome(800).unwrap().name(), "chr2");
        assert!(store.find_chromosome(1400).is_none());
        let (c, rel) = store.locate(10).unwrap();
        assert_eq!(c.name(), "chr1");
        assert_eq!(rel, 14);
        assert_eq!(store.locate(805).unwrap().1, 5);
    }

    #[test]
    fn finds_both_strands() {
        let (chr1, chr2, mut store) = two_chromosomes();
        store.make_index(&IndexConfig { num_indexed_chars: 8, exclude_polymers: true }).unwrap();

        let mut q = chr2.as_bytes()[100..164].to_vec();
        q[10] = if q[10] == b'A' { b'C' } else { b'A' };
        let mut stats = SearchStats::default();
        let hits = store.find_inexact(&q, &params(2), &mut stats);
        assert!(hits.contains(&FastaResult { location: 900, distance: 1, reverse_complement: false }));
        assert!(stats.compares_done > 0);

        let rc = dna::revcomp(&chr1.as_bytes()[300..364]);
        let hits = store.find_inexact(&rc, &params(0), &mut stats);
        assert_eq!(hits, vec![FastaResult { location: 300, distance: 0, reverse_complement: true }]);

        let fwd_only = SearchParams { search_rev_comp: false, ..params(0) };
        assert!(store.find_inexact(&rc, &fwd_only, &mut stats).is_empty());
    }

    #[test]
    fn drops_hits_across_chromosome_boundaries() {
        let (chr1, chr2, mut store) = two_chromosomes();
        store.make_index(&IndexConfig { num_indexed_chars: 6, exclude_polymers: true }).unwrap();
        let spanning = format!("{}{}", &chr1[770..], &chr2[..30]);
        let mut stats = SearchStats::default();
        assert!(store.find_inexact(spanning.as_bytes(), &params(0), &mut stats).is_empty());
    }

    #[test]
    fn searches_without_an_index() {
        let (_, chr2, store) = two_chromosomes();
        assert!(store.index().is_none());
        let mut stats = SearchStats::default();
        let hits = store.find_inexact(&chr2.as_bytes()[50..80], &params(0), &mut stats);
        assert_eq!(hits[0], FastaResult { location: 850, distance: 0, reverse_complement: false });
    }

    #[test]
    fn max_results_caps_output() {
        let mut store = ReferenceStore::new();
        store.append(b">rep\nACGTTGCAACGTTGCAACGTTGCAACGTTGCAACGTTGCA\n");
        store.make_index(&IndexConfig { num_indexed_chars: 4, exclude_polymers: true }).unwrap();
        let mut stats = SearchStats::default();
        let p = SearchParams { max_results: 2, ..SearchParams::default() };
        assert_eq!(store.find_inexact(b"ACGTTGCA", &p, &mut stats).len(), 2);
        let p = SearchParams { max_results: 100, ..SearchParams::default() };
        assert_eq!(store.find_inexact(b"ACGTTGCA", &p, &mut stats).len(), 5);
    }

    #[test]
    fn empty_reference_cannot_be_indexed() {
        let mut store = ReferenceStore::new();
        assert!(matches!(store.make_index(&IndexConfig::default()), Err(IndexError::EmptyReference)));
        store.append(b">empty\nNNNN\n");
        assert_eq!(store.get_chromosome(0).unwrap().num_leading_n, 4);
        assert!(matches!(store.make_index(&IndexConfig::default()), Err(IndexError::EmptyReference)));
    }

    #[test]
    fn append_random_is_reproducible() {
        let mut a = ReferenceStore::new();
        let mut b = ReferenceStore::new();
        a.append_random("r", 500, 42);
        b.append_random("r", 500, 42);
        assert_eq!(a.sequence().to_string(), b.sequence().to_string());
        assert_eq!(a.get_chromosome(0).unwrap().len(), 500);
        b.append_random("s", 10, 43);
        assert_eq!(b.find_chromosome(505).unwrap().name(), "s");
    }

    #[test]
    fn appending_drops_a_stale_index() {
        let (_, _, mut store) = two_chromosomes();
        store.make_index(&IndexConfig::default()).unwrap();
        assert!(store.index().is_some());
        store.append(b">chr3\nACGTACGTACGTACGT\n");
        assert!(store.index().is_none());
    }

    #[test]
    fn mapped_store_answers_like_the_original() {
        let (_, chr2, mut store) = two_chromosomes();
        store.append(b">with_ns\nACGTNNNNNNRYACGT\n");
        store.make_index(&IndexConfig { num_indexed_chars: 8, exclude_polymers: true }).unwrap();
        let bytes = store.write_binary(Vec::new()).unwrap();
        let words = aligned_copy(&bytes);
        let region = &bytemuck::cast_slice::<u64, u8>(&words)[..bytes.len()];
        let mapped = MappedReferenceStore::map(region).unwrap();

        assert_eq!(mapped.num_chromosomes(), 3);
        assert_eq!(mapped.get_chromosome(1).unwrap().name(), "chr2");
        assert_eq!(mapped.sequence().to_string(), store.sequence().to_string());
        assert!(mapped.sequence().to_string().ends_with("ACGTNNNNNNRYACGT"));

        let q = &chr2.as_bytes()[200..260];
        let mut s1 = SearchStats::default();
        let mut s2 = SearchStats::default();
        assert_eq!(
            mapped.find_inexact(q, &params(1), &mut s1),
            store.find_inexact(q, &params(1), &mut s2)
        );
        assert_eq!(s1, s2);

        let mut a = Vec::new();
        let mut b = Vec::new();
        mapped.write_ascii(&mut a).unwrap();
        store.write_ascii(&mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn unindexed_store_maps_without_index() {
        let (_, _, store) = two_chromosomes();
        let bytes = store.write_binary(Vec::new()).unwrap();
        let words = aligned_copy(&bytes);
        let mapped = MappedReferenceStore::map(&bytemuck::cast_slice::<u64, u8>(&words)[..bytes.len()]).unwrap();
        assert!(mapped.index().is_none());

        let truncated = &bytemuck::cast_slice::<u64, u8>(&words)[..bytes.len() - 9];
        assert!(matches!(MappedReferenceStore::map(truncated), Err(IndexError::BoundsOverflow { .. })));
    }

    fn with_raw_index(store: &ReferenceStore, table: &[u32], addr: &[u32]) -> Vec<u64> {
        let mut wr = BinaryWriter::new(Vec::new());
        wr.write_slice(&store.chromosomes).unwrap();
        store.sequence.write_binary(&mut wr).unwrap();
        wr.write_u64(2).unwrap();
        wr.write_slice(table).unwrap();
        wr.write_slice(addr).unwrap();
        aligned_copy(&wr.into_inner())
    }

    #[test]
    fn corrupt_seed_table_fails_to_map() {
        let mut store = ReferenceStore::new();
        store.append(b">short\nACGTACGTCCCC\n");
        let mut table = vec![0u32; 17];
        for slot in &mut table[6..] {
            *slot = 3;
        }
        let words = with_raw_index(&store, &table, &[8, 9, 10]);
        let mapped = MappedReferenceStore::map(bytemuck::cast_slice(&words)).unwrap();
        let mut stats = SearchStats::default();
        let hits = mapped.find_inexact(b"CCCC", &SearchParams::default(), &mut stats);
        assert_eq!(hits, vec![FastaResult { location: 8, distance: 0, reverse_complement: false }]);

        let mut bad = vec![0u32; 17];
        bad[5] = 1000;
        bad[16] = 3;
        let words = with_raw_index(&store, &bad, &[8, 9, 10]);
        assert!(matches!(
            MappedReferenceStore::map(bytemuck::cast_slice(&words)),
            Err(IndexError::CorruptIndex { .. })
        ));

        let words = with_raw_index(&store, &table, &[8, 9, 40]);
        assert!(matches!(
            MappedReferenceStore::map(bytemuck::cast_slice(&words)),
            Err(IndexError::CorruptIndex { entry: 2, .. })
        ));
    }

    fn gapped() -> ReferenceStore {
        let mut store = ReferenceStore::new();
        store.append(b">gap\nACGTTGCAGGCTACGTNNNNNNNNNNNNNNNNNNNNGATTACAGATTACACCGT\n");
        store
    }

    #[test]
    fn internal_n_runs_never_match_a_queries() {
        let mut indexed = gapped();
        indexed.make_index(&IndexConfig { num_indexed_chars: 4, exclude_polymers: false }).unwrap();
        assert!(!indexed.index().unwrap().bucket(0).is_empty());
        let exact = SearchParams { max_distance: 0, ..SearchParams::default() };
        for store in [gapped(), indexed] {
            let mut stats = SearchStats::default();
            assert!(store.find_inexact(b"AAAAAAAAAA", &exact, &mut stats).is_empty());

            let loose = SearchParams { max_distance: 4, ..SearchParams::default() };
            let hits = store.find_inexact(b"ACGTAAAA", &loose, &mut stats);
            assert!(hits.contains(&FastaResult { location: 12, distance: 4, reverse_complement: false }));
            for h in &hits {
                let window = store.sequence().substr(h.location as usize, 8, false);
                let naive = window.bytes().zip(b"ACGTAAAA").filter(|(a, b)| a != *b).count();
                assert_eq!(h.distance as usize, naive, "hit at {}", h.location);
            }
        }
    }

    #[test]
    fn ascii_dump_lists_chromosomes() {
        let (_, _, store) = two_chromosomes();
        let mut out = Vec::new();
        store.write_ascii(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "chr1\tchr1 first\t0\t800\t4\t2\nchr2\tchr2\t800\t1400\t0\t0\n");
    }
}
