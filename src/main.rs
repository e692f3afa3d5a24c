use std::fs;
use std::io::{self, Write};

use anyhow::{Context, Result};
use clap::Parser;

use heapsample::cli::{self, Args, ReplayHeap};
use heapsample::{
  write_heap_report, write_report, HeapProfiler, HeapStatsSource, ProfilerConfig,
};

fn main() -> Result<()> {
  let args = Args::parse();

  let contents = fs::read_to_string(&args.log)
    .with_context(|| format!("failed to read {}", args.log.display()))?;
  let events = cli::parse_log(&contents)?;

  let mut config = ProfilerConfig::default();
  if let Some(seed) = args.seed {
    config = config.with_seed(seed);
  }

  let profiler = HeapProfiler::with_config(config);
  profiler.start(args.interval, args.depth)?;

  let mut heap = ReplayHeap::default();
  for event in &events {
    heap.on_allocate(event);
    profiler.on_allocate(&event.stack, event.size);
  }

  let profile = profiler.stop();

  let stdout = io::stdout();
  let mut out = stdout.lock();
  write_report(&profile, &mut out)?;
  writeln!(out)?;

  let snapshot = heap.snapshot()?;
  write_heap_report(&snapshot, &mut out)?;

  Ok(())
}
