use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Parser;

use crate::frame::RawFrame;
use crate::heap_stats::{HeapSnapshot, HeapSpaceStats, HeapStatsSource, SnapshotError};

#[derive(Parser, Debug)]
#[command(author, version, about = "Replay an allocation log through the sampling heap profiler")]
pub struct Args {
  /// Allocation log to replay. One event per line:
  /// `<size> <function>@<script>:<line>;...`, outermost frame first.
  pub log: PathBuf,

  /// Maximum stack depth resolved per sampled allocation.
  #[arg(short, long, default_value_t = 16)]
  pub depth: u32,

  /// Expected bytes allocated between two samples.
  #[arg(short, long, default_value_t = 1024)]
  pub interval: u64,

  /// Fixed RNG seed for reproducible sampling.
  #[arg(long)]
  pub seed: Option<u64>,
}

/// One parsed allocation event from a replay log.
#[derive(Debug, Clone)]
pub struct ReplayEvent {
  pub size: u64,
  pub stack: Vec<RawFrame>,
}

/// Parse a whole replay log. Blank lines and `#` comments are skipped.
///
/// # Errors
///
/// Returns an error naming the offending line when any event is malformed.
pub fn parse_log(contents: &str) -> Result<Vec<ReplayEvent>> {
  let mut events = Vec::new();

  for (number, line) in contents.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
      continue;
    }

    let event = parse_line(line)
      .with_context(|| format!("malformed event on line {}", number + 1))?;
    events.push(event);
  }

  Ok(events)
}

/// Parse one `<size> <frame>;<frame>;...` event line.
///
/// # Errors
///
/// Returns an error if the size or any line number fails to parse.
pub fn parse_line(line: &str) -> Result<ReplayEvent> {
  let Some((size, stack)) = line.split_once(' ') else {
    bail!("expected `<size> <stack>`, got {line:?}");
  };

  let size: u64 = size
    .parse()
    .with_context(|| format!("invalid allocation size {size:?}"))?;

  let stack = stack
    .split(';')
    .map(parse_frame)
    .collect::<Result<Vec<RawFrame>>>()?;

  Ok(ReplayEvent { size, stack })
}

/// Frame syntax is `function@script:line`; the script and line parts are
/// optional, and an empty function name stands for an anonymous function.
fn parse_frame(text: &str) -> Result<RawFrame> {
  let (function, location) = match text.split_once('@') {
    Some((function, location)) => (function, Some(location)),
    None => (text, None),
  };

  let function_name = if function.is_empty() {
    None
  } else {
    Some(function.to_string())
  };

  let (script_name, line_number) = match location {
    None => (None, 0),
    Some(location) => match location.rsplit_once(':') {
      None => (non_empty(location), 0),
      Some((script, line)) => {
        let line: u32 = line
          .parse()
          .with_context(|| format!("invalid line number {line:?} in frame {text:?}"))?;
        (non_empty(script), line)
      }
    },
  };

  Ok(RawFrame::new(function_name, script_name, line_number))
}

fn non_empty(text: &str) -> Option<String> {
  if text.is_empty() {
    None
  } else {
    Some(text.to_string())
  }
}

/// Heap counters accumulated while replaying a log.
///
/// Stands in for the memory manager's counters: one space per script seen,
/// sized by the bytes its events allocated.
#[derive(Debug, Default)]
pub struct ReplayHeap {
  allocated: u64,
  spaces: Vec<(String, u64)>,
}

impl ReplayHeap {
  const SIZE_LIMIT: u64 = 2 * 1024 * 1024 * 1024;

  pub fn on_allocate(&mut self, event: &ReplayEvent) {
    self.allocated = self.allocated.saturating_add(event.size);

    let space = event
      .stack
      .last()
      .and_then(|frame| frame.script_name.clone())
      .unwrap_or_else(|| "<unknown>".to_string());

    match self.spaces.iter_mut().find(|(name, _)| name == &space) {
      Some((_, bytes)) => *bytes = bytes.saturating_add(event.size),
      None => self.spaces.push((space, event.size)),
    }
  }
}

impl HeapStatsSource for ReplayHeap {
  fn snapshot(&self) -> Result<HeapSnapshot, SnapshotError> {
    Ok(HeapSnapshot {
      native_context_count: 1,
      size_limit: Self::SIZE_LIMIT,
      spaces: self
        .spaces
        .iter()
        .map(|(name, bytes)| HeapSpaceStats {
          name: name.clone(),
          size: *bytes,
          used_size: *bytes,
        })
        .collect(),
      total_size: self.allocated,
      used_size: self.allocated,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_a_full_event_line() {
    let event = parse_line("64 main@app.js:1;build@app.js:9").expect("parse failed");

    assert_eq!(event.size, 64);
    assert_eq!(event.stack.len(), 2);
    assert_eq!(event.stack[0].function_name.as_deref(), Some("main"));
    assert_eq!(event.stack[1].script_name.as_deref(), Some("app.js"));
    assert_eq!(event.stack[1].line_number, 9);
  }

  #[test]
  fn missing_parts_become_unresolved_frames() {
    let event = parse_line("8 @lib.js:3;helper").expect("parse failed");

    assert!(event.stack[0].function_name.is_none());
    assert_eq!(event.stack[0].script_name.as_deref(), Some("lib.js"));
    assert_eq!(event.stack[1].function_name.as_deref(), Some("helper"));
    assert!(event.stack[1].script_name.is_none());
    assert_eq!(event.stack[1].line_number, 0);
  }

  #[test]
  fn rejects_garbage_sizes_and_lines() {
    assert!(parse_line("lots main@app.js:1").is_err());
    assert!(parse_line("64 main@app.js:one").is_err());
  }

  #[test]
  fn log_parser_skips_blanks_and_comments() {
    let log = "# synthetic workload\n\n16 f@a.js:1\n32 g@a.js:2\n";
    let events = parse_log(log).expect("parse failed");
    assert_eq!(events.len(), 2);
  }

  #[test]
  fn replay_heap_buckets_bytes_by_script() {
    let mut heap = ReplayHeap::default();
    heap.on_allocate(&parse_line("16 f@a.js:1").expect("parse failed"));
    heap.on_allocate(&parse_line("32 g@b.js:2").expect("parse failed"));
    heap.on_allocate(&parse_line("8 h@a.js:3").expect("parse failed"));

    let snapshot = heap.snapshot().expect("snapshot failed");
    assert_eq!(snapshot.total_size, 56);
    assert_eq!(snapshot.spaces.len(), 2);
    assert_eq!(snapshot.spaces[0], HeapSpaceStats {
      name: "a.js".to_string(),
      size: 24,
      used_size: 24,
    });
  }
}
