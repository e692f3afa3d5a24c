/// Controls how the profiler samples allocation events.
#[derive(Debug, Clone)]
pub struct ProfilerConfig {
  /// Maximum number of stack frames resolved per sampled allocation. Deeper
  /// stacks are truncated root-first, keeping the leaf-most frames.
  pub max_stack_depth: u32,
  /// Expected bytes allocated between two samples.
  pub sample_interval_bytes: u64,
  /// Fixed RNG seed for the sampling intervals. Leave unset outside of tests.
  pub seed: Option<u64>,
}

impl Default for ProfilerConfig {
  fn default() -> Self {
    Self {
      max_stack_depth: 128,
      sample_interval_bytes: 512 * 1024,
      seed: None,
    }
  }
}

impl ProfilerConfig {
  /// Builder-style helper to adjust the maximum stack depth.
  #[must_use]
  pub fn with_max_stack_depth(mut self, depth: u32) -> Self {
    self.max_stack_depth = depth;
    self
  }

  /// Builder-style helper to adjust the sampling interval.
  #[must_use]
  pub fn with_sample_interval(mut self, interval_bytes: u64) -> Self {
    self.sample_interval_bytes = interval_bytes;
    self
  }

  /// Builder-style helper to pin the sampling RNG seed.
  #[must_use]
  pub fn with_seed(mut self, seed: u64) -> Self {
    self.seed = Some(seed);
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_interval_is_half_a_mebibyte() {
    let config = ProfilerConfig::default();
    assert_eq!(config.sample_interval_bytes, 512 * 1024);
    assert_eq!(config.max_stack_depth, 128);
    assert!(config.seed.is_none());
  }

  #[test]
  fn builder_helpers_overwrite_fields() {
    let config = ProfilerConfig::default()
      .with_sample_interval(1024)
      .with_max_stack_depth(16)
      .with_seed(7);

    assert_eq!(config.sample_interval_bytes, 1024);
    assert_eq!(config.max_stack_depth, 16);
    assert_eq!(config.seed, Some(7));
  }
}
