use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Sentinel used when an allocation site has no resolvable function name.
pub const ANONYMOUS_FUNCTION: &str = "<anonymous>";

/// Sentinel used when an allocation site has no resolvable script name.
pub const UNKNOWN_SCRIPT: &str = "<unknown>";

/// Stable identity of one stack location.
///
/// Two frames are equal iff function name, script name, and line number all
/// match; the sentinels are ordinary values, never an error state.
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct Frame {
  pub function_name: Arc<str>,
  pub line_number: u32,
  pub script_name: Arc<str>,
}

impl Frame {
  #[must_use]
  pub fn new(
    function_name: impl Into<String>,
    script_name: impl Into<String>,
    line_number: u32,
  ) -> Self {
    Self {
      function_name: Arc::<str>::from(function_name.into()),
      line_number,
      script_name: Arc::<str>::from(script_name.into()),
    }
  }
}

impl Display for Frame {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    write!(
      f,
      "{}@{}:{}",
      self.function_name, self.script_name, self.line_number
    )
  }
}

/// Frame state as handed over by the executing runtime, before resolution.
///
/// Missing or empty names are legal and map to the sentinel strings.
#[derive(Debug, Clone, Default)]
pub struct RawFrame {
  pub function_name: Option<String>,
  pub line_number: u32,
  pub script_name: Option<String>,
}

impl RawFrame {
  #[must_use]
  pub fn new(
    function_name: Option<String>,
    script_name: Option<String>,
    line_number: u32,
  ) -> Self {
    Self {
      function_name,
      line_number,
      script_name,
    }
  }
}

/// Ordered frame sequence from outermost caller to allocation site.
pub type CallPath = Vec<Frame>;

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn frames_compare_on_all_fields() {
    let a = Frame::new("run", "worker.js", 12);
    let b = Frame::new("run", "worker.js", 12);
    let c = Frame::new("run", "worker.js", 13);

    assert_eq!(a, b);
    assert_ne!(a, c);
  }

  #[test]
  fn sentinel_frames_are_ordinary_values() {
    let frame = Frame::new(ANONYMOUS_FUNCTION, UNKNOWN_SCRIPT, 0);
    assert_eq!(frame.function_name.as_ref(), "<anonymous>");
    assert_eq!(frame.script_name.as_ref(), "<unknown>");
  }
}
