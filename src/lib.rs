//! Statistical heap-allocation profiler for embedded managed runtimes.
//!
//! The host runtime feeds allocation events into [`HeapProfiler::on_allocate`]
//! while sampling is armed; events are sampled on a byte-interval Poisson
//! process, attributed to resolved call stacks, and aggregated into a call
//! tree that can be rendered as a text report or exported as JSON or pprof.

pub mod cli;
mod config;
mod export;
mod frame;
mod heap_stats;
pub mod pprof;
mod profile;
mod profiler;
mod report;
mod resolver;
mod sampler;
mod tree;

pub use {
  config::ProfilerConfig,
  export::{
    build_pprof_profile, ExportError, JsonLinesWriter, MmapStreamWriter,
    ProfileStreamWriter,
  },
  frame::{CallPath, Frame, RawFrame, ANONYMOUS_FUNCTION, UNKNOWN_SCRIPT},
  heap_stats::{
    write_heap_report, HeapSnapshot, HeapSpaceStats, HeapStatsSource,
    SnapshotError,
  },
  profile::{Profile, RecordedSample},
  profiler::{HeapProfiler, ProfilerError},
  report::{report_to_string, write_report, Render, ReportLine},
  resolver::StackResolver,
  sampler::Sampler,
  tree::{AllocationRecord, CallTree, NodeId, TreeNode},
};
