//! Batch read alignment against a [`ReferenceStore`].
//!
//! Workers take turns pulling a batch of FASTQ records under a lock, then
//! search the batch without holding it. Output lines are tab separated:
//! `name flags chromosome pos distance`, `pos` 1-based.

use std::io::{BufRead, Write};
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use log::{debug, info};
use rayon::prelude::*;

use crate::index::search::{SearchParams, SearchStats};
use crate::io::fastq::{FastqReader, FastqRecord};
use crate::reference::ReferenceStore;
use crate::storage::Storage;

pub const FLAG_UNMAPPED: u16 = 0x4;
pub const FLAG_REVERSE: u16 = 0x10;
pub const FLAG_SECONDARY: u16 = 0x100;

#[derive(Debug, Clone)]
pub struct AlignOpt {
    pub params: SearchParams,
    pub threads: usize,
    pub batch_size: usize,
}

impl Default for AlignOpt {
    fn default() -> Self {
        Self { params: SearchParams::default(), threads: 1, batch_size: 4096 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlignSummary {
    pub reads: u64,
    pub mapped: u64,
    pub hits: u64,
    pub stats: SearchStats,
}

impl AlignSummary {
    fn merge(mut self, other: Self) -> Self {
        self.reads += other.reads;
        self.mapped += other.mapped;
        self.hits += other.hits;
        self.stats += other.stats;
        self
    }
}

/// 对一个 batch 逐条比对，结果写入 `out`（不加锁）。
fn align_batch<S: Storage>(
    store: &ReferenceStore<S>,
    batch: &[FastqRecord],
    params: &SearchParams,
    out: &mut Vec<u8>,
) -> Result<AlignSummary> {
    let mut summary = AlignSummary::default();
    for rec in batch {
        summary.reads += 1;
        let hits = store.find_inexact(&rec.seq, params, &mut summary.stats);
        let mut written = 0;
        for hit in &hits {
            let Some((chrom, pos)) = store.locate(hit.location) else {
                continue;
            };
            let mut flags = 0u16;
            if hit.reverse_complement {
                flags |= FLAG_REVERSE;
            }
            if written > 0 {
                flags |= FLAG_SECONDARY;
            }
            writeln!(out, "{}\t{}\t{}\t{}\t{}", rec.id, flags, chrom.name(), pos + 1, hit.distance)?;
            written += 1;
        }
        if written == 0 {
            writeln!(out, "{}\t{}\t*\t0\t*", rec.id, FLAG_UNMAPPED)?;
        } else {
            summary.mapped += 1;
            summary.hits += written;
        }
    }
    Ok(summary)
}

/// 多线程比对：`reader` 与 `out` 各由一把锁保护，锁只在读一批 / 写一批时持有。
pub fn align_reads<S, R, W>(
    store: &ReferenceStore<S>,
    reader: R,
    out: W,
    opt: &AlignOpt,
) -> Result<AlignSummary>
where
    S: Storage,
    ReferenceStore<S>: Sync,
    R: BufRead + Send,
    W: Write + Send,
{
    let start = Instant::now();
    let threads = opt.threads.max(1);
    let batch_size = opt.batch_size.max(1);
    let reader = Mutex::new(FastqReader::new(reader));
    let out = Mutex::new(out);

    let worker = |id: usize| -> Result<AlignSummary> {
        let mut summary = AlignSummary::default();
        let mut buf = Vec::new();
        loop {
            let batch = {
                let mut reader = reader.lock().map_err(|_| anyhow!("reader lock poisoned"))?;
                reader.read_batch(batch_size)?
            };
            if batch.is_empty() {
                break;
            }
            buf.clear();
            let done = align_batch(store, &batch, &opt.params, &mut buf)?;
            debug!("worker {id}: {} reads, {} mapped", done.reads, done.mapped);
            summary = summary.merge(done);
            let mut out = out.lock().map_err(|_| anyhow!("output lock poisoned"))?;
            out.write_all(&buf).context("cannot write alignments")?;
        }
        Ok(summary)
    };

    let pool = rayon::ThreadPoolBuilder::new().num_threads(threads).build()?;
    let summaries: Vec<AlignSummary> =
        pool.install(|| (0..threads).into_par_iter().map(worker).collect::<Result<_>>())?;
    let summary = summaries.into_iter().fold(AlignSummary::default(), AlignSummary::merge);

    out.into_inner()
        .map_err(|_| anyhow!("output lock poisoned"))?
        .flush()
        .context("cannot flush alignments")?;

    info!(
        "aligned {} reads ({} mapped, {} hits) with {} threads in {:.2?}",
        summary.reads,
        summary.mapped,
        summary.hits,
        threads,
        start.elapsed()
    );
    info!(
        "merges {}, compares {}, seeds dropped {}",
        summary.stats.merges_done, summary.stats.compares_done, summary.stats.seeds_dropped
    );
    Ok(summary)
}
