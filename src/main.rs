use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use memmap2::Mmap;

use genidx::align::{self, AlignOpt};
use genidx::index::fm::{Contig, FmIndex, IndexMeta};
use genidx::index::{IndexConfig, SearchParams};
use genidx::reference::{MappedReferenceStore, ReferenceStore};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(
    name = "genidx",
    author,
    version,
    about = "Packed DNA reference index with seeded inexact search",
    arg_required_else_help = true
)]
struct Cli {
    /// More log output (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a binary reference index from one or more FASTA files
    Index {
        /// Reference FASTA files, concatenated in order
        #[arg(required = true)]
        fasta: Vec<PathBuf>,
        #[arg(short, long, default_value = "index.bin")]
        output: PathBuf,
        /// Seed length
        #[arg(short, long, default_value_t = 12)]
        k: usize,
        /// Index all-A / all-T seeds as well
        #[arg(long)]
        keep_polymers: bool,
    },
    /// Align FASTQ reads against a binary index
    Align {
        index: PathBuf,
        reads: PathBuf,
        /// Output path (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(short = 'd', long, default_value_t = 0)]
        max_distance: usize,
        #[arg(long, default_value_t = 100)]
        max_results: usize,
        /// Seeds with larger buckets are dropped; 0 keeps every seed
        #[arg(long, default_value_t = 100)]
        max_bucket_size: usize,
        /// Also search the reverse-complement strand
        #[arg(long)]
        rev_comp: bool,
        #[arg(long)]
        never_brute_force: bool,
        #[arg(short = 't', long, default_value_t = 1)]
        threads: usize,
        #[arg(long, default_value_t = 4096)]
        batch_size: usize,
    },
    /// Print chromosomes and seed buckets of a binary index
    Dump { index: PathBuf },
    /// Build, verify and save an FM index (bincode)
    Fm {
        fasta: PathBuf,
        #[arg(short, long, default_value = "ref.fm")]
        output: PathBuf,
        /// Occurrence sampling interval
        #[arg(long, default_value_t = 64)]
        block: usize,
        /// Exact patterns to count and locate once the index is built
        #[arg(long = "locate", value_name = "PATTERN")]
        patterns: Vec<String>,
    },
}

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .init();
}

/// 只读映射整个文件；空文件无法映射，返回 None。
#[allow(unsafe_code)]
fn map_file(path: &Path) -> Result<Option<Mmap>> {
    let file = File::open(path).with_context(|| format!("cannot open '{}'", path.display()))?;
    if file.metadata()?.len() == 0 {
        return Ok(None);
    }
    // SAFETY: the file is opened read-only and is not modified while mapped.
    let mmap = unsafe { Mmap::map(&file) }
        .with_context(|| format!("cannot map '{}'", path.display()))?;
    Ok(Some(mmap))
}

fn load_fasta(paths: &[PathBuf]) -> Result<ReferenceStore> {
    let mut store = ReferenceStore::new();
    for path in paths {
        let added = match map_file(path)? {
            Some(mmap) => store.append(&mmap),
            None => 0,
        };
        if added == 0 {
            bail!("FASTA file '{}' contains no sequences", path.display());
        }
        info!("{}: {} records", path.display(), added);
    }
    Ok(store)
}

fn run_index(fasta: &[PathBuf], output: &Path, config: &IndexConfig) -> Result<()> {
    let mut store = load_fasta(fasta)?;
    store.make_index(config)?;
    let file = File::create(output).with_context(|| format!("cannot create '{}'", output.display()))?;
    store
        .write_binary(BufWriter::new(file))
        .with_context(|| format!("cannot write index to '{}'", output.display()))?;
    info!(
        "index saved: {} ({} chromosomes, {} bases)",
        output.display(),
        store.num_chromosomes(),
        store.sequence().len()
    );
    Ok(())
}

fn open_index(path: &Path) -> Result<Mmap> {
    map_file(path)?.with_context(|| format!("index '{}' is empty", path.display()))
}

fn run_align(index: &Path, reads: &Path, output: Option<&Path>, opt: &AlignOpt) -> Result<()> {
    let mmap = open_index(index)?;
    let store = MappedReferenceStore::map(&mmap)
        .with_context(|| format!("'{}' is not a valid index", index.display()))?;
    if store.index().is_none() {
        info!("index has no seed table, falling back to brute force");
    }
    let fq = File::open(reads).with_context(|| format!("cannot open reads '{}'", reads.display()))?;
    let reader = BufReader::new(fq);
    match output {
        Some(p) => {
            let f = File::create(p).with_context(|| format!("cannot create '{}'", p.display()))?;
            align::align_reads(&store, reader, BufWriter::new(f), opt)?;
        }
        None => {
            align::align_reads(&store, reader, BufWriter::new(std::io::stdout()), opt)?;
        }
    }
    Ok(())
}

fn run_dump(index: &Path) -> Result<()> {
    let mmap = open_index(index)?;
    let store = MappedReferenceStore::map(&mmap)?;
    let mut out = BufWriter::new(std::io::stdout().lock());
    store.write_ascii(&mut out)?;
    out.flush()?;
    Ok(())
}

fn run_fm(fasta: &Path, output: &Path, block: usize, patterns: &[String]) -> Result<()> {
    let store = load_fasta(&[fasta.to_path_buf()])?;
    let contigs: Vec<Contig> = store
        .chromosomes()
        .iter()
        .map(|c| Contig { name: c.name().into_owned(), len: c.len() as u32, offset: c.start as u32 })
        .collect();
    let seq = store.sequence().packed();
    let mut fm = FmIndex::build(seq, contigs, block)?;
    if !fm.verify(seq) {
        bail!("FM index of '{}' failed verification", fasta.display());
    }
    fm.set_meta(IndexMeta {
        reference_file: Some(fasta.display().to_string()),
        build_args: Some(std::env::args().collect::<Vec<_>>().join(" ")),
        build_timestamp: Some(chrono::Utc::now().to_rfc3339()),
    });
    fm.save_to_file(output)?;
    info!("FM index saved: {}", output.display());

    let mut out = BufWriter::new(std::io::stdout().lock());
    for pattern in patterns {
        write!(out, "{}\t{}", pattern, fm.count(pattern.as_bytes()))?;
        for pos in fm.locate(pattern.as_bytes()) {
            if let Some((i, off)) = fm.map_text_pos(pos) {
                write!(out, "\t{}:{}", fm.contigs[i].name, off + 1)?;
            }
        }
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);
    match cli.command {
        Commands::Index { fasta, output, k, keep_polymers } => {
            let config = IndexConfig { num_indexed_chars: k, exclude_polymers: !keep_polymers };
            run_index(&fasta, &output, &config)
        }
        Commands::Align {
            index,
            reads,
            output,
            max_distance,
            max_results,
            max_bucket_size,
            rev_comp,
            never_brute_force,
            threads,
            batch_size,
        } => {
            let opt = AlignOpt {
                params: SearchParams {
                    max_distance,
                    max_results,
                    max_bucket_size: (max_bucket_size > 0).then_some(max_bucket_size),
                    search_rev_comp: rev_comp,
                    never_brute_force,
                    ..SearchParams::default()
                },
                threads,
                batch_size,
            };
            run_align(&index, &reads, output.as_deref(), &opt)
        }
        Commands::Dump { index } => run_dump(&index),
        Commands::Fm { fasta, output, block, patterns } => run_fm(&fasta, &output, block, &patterns),
    }
}
