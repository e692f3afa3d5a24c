use std::io::{self, Write};

use crate::frame::Frame;
use crate::profile::Profile;
use crate::tree::NodeId;

/// One logical line of a rendered allocation profile.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum ReportLine {
  /// Identifies a call-tree node that holds at least one allocation record.
  Header { depth: usize, frame: Frame },
  /// Emitted when the profile holds no samples at all.
  NoData,
  /// Direct totals for the node named by the preceding header. Descendants
  /// are not rolled in; callers wanting subtree totals sum the traversal.
  Summary {
    depth: usize,
    total_count: u64,
    total_size: u64,
  },
}

/// Lazy depth-first pre-order rendering of a frozen profile.
///
/// Children are visited in insertion order. Re-running the traversal against
/// the same profile always yields the same sequence.
#[derive(Debug)]
pub struct Render<'a> {
  pending: Option<ReportLine>,
  profile: &'a Profile,
  stack: Vec<(NodeId, usize)>,
  started: bool,
}

impl<'a> Render<'a> {
  #[must_use]
  pub fn new(profile: &'a Profile) -> Self {
    Self {
      pending: None,
      profile,
      stack: vec![(profile.root(), 0)],
      started: false,
    }
  }
}

impl Iterator for Render<'_> {
  type Item = ReportLine;

  fn next(&mut self) -> Option<ReportLine> {
    if let Some(line) = self.pending.take() {
      return Some(line);
    }

    if !self.started {
      self.started = true;
      if self.profile.is_empty() {
        self.stack.clear();
        return Some(ReportLine::NoData);
      }
    }

    while let Some((id, depth)) = self.stack.pop() {
      let node = self.profile.node(id);
      for child in node.children().iter().rev() {
        self.stack.push((*child, depth + 1));
      }

      if node.allocations().is_empty() {
        continue;
      }

      self.pending = Some(ReportLine::Summary {
        depth,
        total_count: node.total_count(),
        total_size: node.total_size(),
      });

      return Some(ReportLine::Header {
        depth,
        frame: node.frame().clone(),
      });
    }

    None
  }
}

/// Write the line-oriented text report for a profile.
///
/// # Errors
///
/// Returns an error if the downstream writer reports a failure.
pub fn write_report<W: Write>(profile: &Profile, writer: &mut W) -> io::Result<()> {
  writeln!(writer, "=== Allocation Profile ===")?;
  writeln!(writer, "Total samples: {}", profile.samples().len())?;

  for line in Render::new(profile) {
    match line {
      ReportLine::Header { depth, frame } => {
        writeln!(
          writer,
          "{}Function: {} (Script: {}, Line: {})",
          "  ".repeat(depth),
          frame.function_name,
          frame.script_name,
          frame.line_number
        )?;
      }
      ReportLine::NoData => {
        writeln!(writer, "No allocation samples recorded")?;
      }
      ReportLine::Summary {
        depth,
        total_count,
        total_size,
      } => {
        writeln!(
          writer,
          "{}  -> Total: {total_size} bytes, Count: {total_count}",
          "  ".repeat(depth)
        )?;
      }
    }
  }

  Ok(())
}

/// Render the text report into an owned string.
#[must_use]
pub fn report_to_string(profile: &Profile) -> String {
  let mut buffer = Vec::new();
  // Writing into a Vec cannot fail.
  let _ = write_report(profile, &mut buffer);
  String::from_utf8(buffer).unwrap_or_default()
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::profile::RecordedSample;
  use crate::tree::CallTree;

  fn frame(name: &str) -> Frame {
    Frame::new(name, "app.js", 10)
  }

  fn sample_profile() -> Profile {
    let mut tree = CallTree::new();
    let ab = vec![frame("a"), frame("b")];
    let ac = vec![frame("a"), frame("c")];

    let mut samples = Vec::new();
    for _ in 0..3 {
      tree.insert(&ab, 16);
      samples.push(RecordedSample { path: ab.clone(), size: 16 });
    }
    tree.insert(&ab, 32);
    samples.push(RecordedSample { path: ab.clone(), size: 32 });
    for _ in 0..5 {
      tree.insert(&ac, 8);
      samples.push(RecordedSample { path: ac.clone(), size: 8 });
    }

    Profile::new(tree, samples)
  }

  #[test]
  fn reports_direct_totals_only() {
    let profile = sample_profile();
    let lines: Vec<ReportLine> = Render::new(&profile).collect();

    // Node "a" has no direct records, so only "b" and "c" produce lines.
    assert_eq!(lines.len(), 4);
    assert_eq!(
      lines[0],
      ReportLine::Header { depth: 2, frame: frame("b") }
    );
    assert_eq!(
      lines[1],
      ReportLine::Summary { depth: 2, total_count: 4, total_size: 80 }
    );
    assert_eq!(
      lines[2],
      ReportLine::Header { depth: 2, frame: frame("c") }
    );
    assert_eq!(
      lines[3],
      ReportLine::Summary { depth: 2, total_count: 5, total_size: 40 }
    );
  }

  #[test]
  fn rendering_is_idempotent() {
    let profile = sample_profile();
    let first: Vec<ReportLine> = Render::new(&profile).collect();
    let second: Vec<ReportLine> = Render::new(&profile).collect();
    assert_eq!(first, second);
  }

  #[test]
  fn empty_profile_renders_the_no_data_line() {
    let profile = Profile::empty();
    let lines: Vec<ReportLine> = Render::new(&profile).collect();
    assert_eq!(lines, vec![ReportLine::NoData]);

    let text = report_to_string(&profile);
    assert!(text.contains("No allocation samples recorded"));
    assert!(text.contains("Total samples: 0"));
  }

  #[test]
  fn text_report_matches_the_line_format() {
    let profile = sample_profile();
    let text = report_to_string(&profile);

    assert!(text.contains("Function: b (Script: app.js, Line: 10)"));
    assert!(text.contains("-> Total: 80 bytes, Count: 4"));
    assert!(text.contains("-> Total: 40 bytes, Count: 5"));
  }
}
