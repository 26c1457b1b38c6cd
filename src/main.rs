mod engine;
mod error;
mod measurement;
mod partition;
mod scan;
mod table;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::Parser;
use memmap2::MmapOptions;

use crate::engine::{default_workers, run, EngineConfig, Input, RunSummary};
use crate::scan::SCAN_PADDING;
use crate::table::{TableConfig, DEFAULT_CAPACITY, DEFAULT_SEED_1, DEFAULT_SEED_2};

/// Single-pass parallel aggregation of `name;measurement` record files:
/// per-name min/mean/max over the whole file, sorted by name.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input file of `name;measurement` lines.
    path: PathBuf,

    /// Worker count; defaults to the available parallelism.
    #[arg(short, long)]
    threads: Option<usize>,

    /// Aggregate table slot count: a power of two comfortably above the
    /// expected number of distinct names.
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    table_capacity: usize,

    /// First seed of the double-hashing probe sequence.
    #[arg(long, default_value_t = DEFAULT_SEED_1)]
    hash_seed1: u64,

    /// Second seed of the double-hashing probe sequence.
    #[arg(long, default_value_t = DEFAULT_SEED_2)]
    hash_seed2: u64,

    /// Print run diagnostics to the error stream.
    #[arg(long)]
    stats: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let started = Instant::now();

    let config = EngineConfig {
        workers: args.threads.unwrap_or_else(default_workers),
        table: TableConfig {
            capacity: args.table_capacity,
            seed1: args.hash_seed1,
            seed2: args.hash_seed2,
        },
    };

    let file = File::open(&args.path)
        .with_context(|| format!("couldn't open {}", args.path.display()))?;
    let len = file
        .metadata()
        .with_context(|| format!("couldn't stat {}", args.path.display()))?
        .len() as usize;

    let mut out = BufWriter::with_capacity(2 * 1024 * 1024, std::io::stdout());

    let summary = if len == 0 {
        // nothing to map or scan
        writeln!(out, "Distinct cities: 0")?;
        RunSummary::default()
    } else {
        // over-map by the scan padding so vectorized lookahead past the
        // last record stays inside the mapping
        let mmap = unsafe { MmapOptions::new().len(len + SCAN_PADDING).map(&file) }
            .with_context(|| format!("couldn't map {}", args.path.display()))?;
        #[cfg(unix)]
        mmap.advise(memmap2::Advice::Sequential)
            .context("couldn't advise sequential access")?;

        run(Input::new(&mmap, len), &config, &mut out)?
        // the mapping drops here, before the process exits
    };

    out.flush().context("couldn't flush stdout")?;

    if args.stats {
        eprintln!(
            "{} records, {} distinct names, max probe distance {}, {:.3}s",
            summary.records,
            summary.distinct,
            summary.max_probe,
            started.elapsed().as_secs_f64()
        );
    }
    Ok(())
}
