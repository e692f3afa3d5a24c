use std::fmt::{self, Display, Formatter};
use std::io::{self, Write};

use serde::Serialize;

/// Point-in-time counters for one heap space.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct HeapSpaceStats {
  pub name: String,
  pub size: u64,
  pub used_size: u64,
}

/// Aggregate heap counters at a single point in time.
///
/// A plain value type: recomputed on every request, no ownership concerns,
/// independent of sampler state. The individual values are defined by the
/// underlying memory manager; only the shape is fixed here.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize)]
pub struct HeapSnapshot {
  pub native_context_count: u64,
  pub size_limit: u64,
  pub spaces: Vec<HeapSpaceStats>,
  pub total_size: u64,
  pub used_size: u64,
}

/// The heap snapshot could not be obtained from the host.
#[derive(Debug)]
pub struct SnapshotError {
  reason: String,
}

impl SnapshotError {
  #[must_use]
  pub fn new(reason: impl Into<String>) -> Self {
    Self {
      reason: reason.into(),
    }
  }
}

impl Display for SnapshotError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(f, "heap snapshot unavailable: {}", self.reason)
  }
}

impl std::error::Error for SnapshotError {}

/// Host-side source of heap counters.
///
/// `snapshot` is a synchronous read with no side effects and may be called at
/// any time. A failure is surfaced to the caller and never retried here.
pub trait HeapStatsSource {
  /// # Errors
  ///
  /// Returns a `SnapshotError` when the host cannot produce its counters.
  fn snapshot(&self) -> Result<HeapSnapshot, SnapshotError>;
}

/// Write the heap-statistics text block for a snapshot.
///
/// # Errors
///
/// Returns an error if the downstream writer reports a failure.
pub fn write_heap_report<W: Write>(
  snapshot: &HeapSnapshot,
  writer: &mut W,
) -> io::Result<()> {
  writeln!(writer, "=== Heap Statistics ===")?;
  writeln!(writer, "Total heap size: {} bytes", snapshot.total_size)?;
  writeln!(writer, "Used heap size: {} bytes", snapshot.used_size)?;
  writeln!(writer, "Heap size limit: {} bytes", snapshot.size_limit)?;
  writeln!(
    writer,
    "Number of native contexts: {}",
    snapshot.native_context_count
  )?;

  for space in &snapshot.spaces {
    writeln!(writer)?;
    writeln!(writer, "=== Heap Space Statistics ===")?;
    writeln!(writer, "Space name: {}", space.name)?;
    writeln!(writer, "Total space size: {} bytes", space.size)?;
    writeln!(writer, "Used space size: {} bytes", space.used_size)?;
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn snapshot() -> HeapSnapshot {
    HeapSnapshot {
      native_context_count: 1,
      size_limit: 4096,
      spaces: vec![
        HeapSpaceStats {
          name: "new_space".to_string(),
          size: 1024,
          used_size: 512,
        },
        HeapSpaceStats {
          name: "old_space".to_string(),
          size: 2048,
          used_size: 100,
        },
      ],
      total_size: 3072,
      used_size: 612,
    }
  }

  #[test]
  fn heap_report_lists_totals_and_spaces() {
    let mut buffer = Vec::new();
    write_heap_report(&snapshot(), &mut buffer).expect("write failed");
    let text = String::from_utf8(buffer).expect("non-utf8 report");

    assert!(text.contains("Total heap size: 3072 bytes"));
    assert!(text.contains("Number of native contexts: 1"));
    assert!(text.contains("Space name: new_space"));
    assert!(text.contains("Used space size: 100 bytes"));
  }

  #[test]
  fn snapshot_error_carries_its_reason() {
    let err = SnapshotError::new("host out of memory");
    assert!(err.to_string().contains("host out of memory"));
  }
}
