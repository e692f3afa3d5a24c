use std::fmt::{self, Display, Formatter};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::ProfilerConfig;
use crate::frame::RawFrame;
use crate::profile::{Profile, RecordedSample};
use crate::resolver::StackResolver;
use crate::sampler::Sampler;
use crate::tree::CallTree;

/// Errors reported by [`HeapProfiler::start`].
///
/// Both variants leave prior profiler state unchanged.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ProfilerError {
  /// Start was called while sampling was already armed.
  AlreadyRunning,
  /// Start was called with a zero sampling interval.
  InvalidInterval,
}

impl Display for ProfilerError {
  fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
    match self {
      Self::AlreadyRunning => write!(f, "sampling heap profiler is already running"),
      Self::InvalidInterval => write!(f, "sampling interval must be non-zero"),
    }
  }
}

impl std::error::Error for ProfilerError {}

/// Mutable state of one armed sampling run.
#[derive(Debug)]
struct Session {
  resolver: StackResolver,
  sampler: Sampler,
  samples: Vec<RecordedSample>,
  tree: CallTree,
}

impl Session {
  fn new(interval_bytes: u64, max_stack_depth: u32, seed: Option<u64>) -> Self {
    Self {
      resolver: StackResolver::new(max_stack_depth),
      sampler: Sampler::new(interval_bytes, seed),
      samples: Vec::new(),
      tree: CallTree::new(),
    }
  }

  fn on_allocate(&mut self, raw_stack: &[RawFrame], size: u64) {
    if !self.sampler.observe(size) {
      return;
    }

    let path = self.resolver.resolve(raw_stack);
    self.tree.insert(&path, size);
    self.samples.push(RecordedSample { path, size });
  }
}

#[derive(Debug)]
struct ProfilerInner {
  armed: AtomicBool,
  config: ProfilerConfig,
  session: Mutex<Option<Session>>,
}

/// Entry point for the start/stop/on-allocate boundary.
///
/// Cheap to clone; all clones share one session. The armed flag gates the
/// allocation hook without taking the lock, and every mutation of the call
/// tree is serialized behind the single session mutex, so `stop` observes a
/// fully aggregated tree.
#[derive(Clone, Debug)]
pub struct HeapProfiler {
  inner: Arc<ProfilerInner>,
}

impl Default for HeapProfiler {
  fn default() -> Self {
    Self::new()
  }
}

impl HeapProfiler {
  #[must_use]
  pub fn config(&self) -> &ProfilerConfig {
    &self.inner.config
  }

  #[must_use]
  pub fn is_running(&self) -> bool {
    self.inner.armed.load(Ordering::Acquire)
  }

  fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
    match self.inner.session.lock() {
      Ok(guard) => guard,
      Err(err) => err.into_inner(),
    }
  }

  #[must_use]
  pub fn new() -> Self {
    Self::with_config(ProfilerConfig::default())
  }

  /// Allocation hook invoked by the host runtime.
  ///
  /// Must never fail the allocator: when the profiler is not armed, or any
  /// internal state is unavailable, the event is silently dropped.
  pub fn on_allocate(&self, raw_stack: &[RawFrame], size: u64) {
    if !self.is_running() {
      return;
    }

    let mut guard = self.lock_session();
    if let Some(session) = guard.as_mut() {
      session.on_allocate(raw_stack, size);
    }
  }

  /// Arm sampling with the given interval and stack depth.
  ///
  /// # Errors
  ///
  /// Rejects a zero interval and a start while already running; in both
  /// cases the prior state is left untouched.
  pub fn start(&self, interval_bytes: u64, max_stack_depth: u32) -> Result<(), ProfilerError> {
    if interval_bytes == 0 {
      return Err(ProfilerError::InvalidInterval);
    }

    let mut guard = self.lock_session();
    if guard.is_some() {
      return Err(ProfilerError::AlreadyRunning);
    }

    *guard = Some(Session::new(
      interval_bytes,
      max_stack_depth,
      self.inner.config.seed,
    ));
    self.inner.armed.store(true, Ordering::Release);
    Ok(())
  }

  /// Arm sampling with the interval and depth from the profiler's config.
  ///
  /// # Errors
  ///
  /// Same rejection rules as [`HeapProfiler::start`].
  pub fn start_default(&self) -> Result<(), ProfilerError> {
    let config = self.inner.config.clone();
    self.start(config.sample_interval_bytes, config.max_stack_depth)
  }

  /// Disarm sampling and materialize the frozen profile.
  ///
  /// Safe to call when not running; that yields an empty profile. The
  /// session is taken out under the lock, so the result includes every
  /// insert that happened-before this call and nothing after it.
  pub fn stop(&self) -> Profile {
    self.inner.armed.store(false, Ordering::Release);

    let taken = self.lock_session().take();
    match taken {
      Some(session) => Profile::new(session.tree, session.samples),
      None => Profile::empty(),
    }
  }

  #[must_use]
  pub fn with_config(config: ProfilerConfig) -> Self {
    Self {
      inner: Arc::new(ProfilerInner {
        armed: AtomicBool::new(false),
        config,
        session: Mutex::new(None),
      }),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::frame::Frame;

  fn raw(function: &str, script: &str, line: u32) -> RawFrame {
    RawFrame::new(Some(function.to_string()), Some(script.to_string()), line)
  }

  // An interval of one byte samples every allocation: the redrawn
  // exponential interval is clamped to at least one byte.
  fn sample_everything() -> HeapProfiler {
    let profiler = HeapProfiler::with_config(ProfilerConfig::default().with_seed(1));
    profiler.start(1, 16).expect("start failed");
    profiler
  }

  #[test]
  fn start_while_running_is_rejected() {
    let profiler = sample_everything();
    profiler.on_allocate(&[raw("f", "a.js", 1)], 64);

    assert_eq!(profiler.start(1024, 16), Err(ProfilerError::AlreadyRunning));

    // Prior state is untouched: the earlier sample survives.
    let profile = profiler.stop();
    assert_eq!(profile.samples().len(), 1);
  }

  #[test]
  fn zero_interval_is_rejected_before_arming() {
    let profiler = HeapProfiler::new();
    assert_eq!(profiler.start(0, 16), Err(ProfilerError::InvalidInterval));
    assert!(!profiler.is_running());
  }

  #[test]
  fn stop_when_idle_returns_an_empty_profile() {
    let profiler = HeapProfiler::new();
    let profile = profiler.stop();
    assert!(profile.is_empty());
  }

  #[test]
  fn events_are_dropped_while_disarmed() {
    let profiler = HeapProfiler::new();
    profiler.on_allocate(&[raw("f", "a.js", 1)], 1 << 20);
    assert!(profiler.stop().is_empty());
  }

  #[test]
  fn recorded_samples_aggregate_into_the_tree() {
    let profiler = sample_everything();
    let stack = [raw("main", "app.js", 1), raw("build", "app.js", 9)];
    for _ in 0..3 {
      profiler.on_allocate(&stack, 48);
    }

    let profile = profiler.stop();
    assert!(!profiler.is_running());
    assert_eq!(profile.samples().len(), 3);

    let main = profile.node(profile.root()).children()[0];
    let build = profile.node(main).children()[0];
    assert_eq!(profile.node(build).frame(), &Frame::new("build", "app.js", 9));
    assert_eq!(profile.node(build).total_size(), 144);
    assert_eq!(profile.node(build).total_count(), 3);
  }

  #[test]
  fn profile_is_frozen_against_later_activity() {
    let profiler = sample_everything();
    profiler.on_allocate(&[raw("f", "a.js", 1)], 32);
    let profile = profiler.stop();

    profiler.start(1, 16).expect("restart failed");
    profiler.on_allocate(&[raw("g", "a.js", 2)], 32);

    assert_eq!(profile.samples().len(), 1);
    assert_eq!(profiler.stop().samples().len(), 1);
  }
}
