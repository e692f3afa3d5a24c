use crate::frame::{CallPath, Frame, RawFrame, ANONYMOUS_FUNCTION, UNKNOWN_SCRIPT};

/// Maps the runtime's in-flight call stack into stable frame identities.
///
/// Resolution is a pure function of the raw stack: it never fails, never
/// allocates proportionally to anything but the output path, and never
/// re-enters the profiler.
#[derive(Debug, Clone)]
pub struct StackResolver {
  max_depth: usize,
}

impl StackResolver {
  #[must_use]
  pub fn max_depth(&self) -> usize {
    self.max_depth
  }

  #[must_use]
  pub fn new(max_depth: u32) -> Self {
    Self {
      max_depth: usize::try_from(max_depth.max(1)).unwrap_or(1),
    }
  }

  /// Resolve a raw stack (outermost frame first) into a call path.
  ///
  /// Stacks deeper than the configured maximum are truncated by dropping
  /// root-most frames first: leaf attribution matters most, so the deepest
  /// `max_depth` frames are the ones kept.
  #[must_use]
  pub fn resolve(&self, raw_stack: &[RawFrame]) -> CallPath {
    let start = raw_stack.len().saturating_sub(self.max_depth);
    raw_stack[start..].iter().map(resolve_frame).collect()
  }
}

fn resolve_frame(raw: &RawFrame) -> Frame {
  let function_name = match raw.function_name.as_deref() {
    Some(name) if !name.is_empty() => name,
    _ => ANONYMOUS_FUNCTION,
  };

  let script_name = match raw.script_name.as_deref() {
    Some(name) if !name.is_empty() => name,
    _ => UNKNOWN_SCRIPT,
  };

  Frame::new(function_name, script_name, raw.line_number)
}
