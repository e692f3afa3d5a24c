use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Poisson-process allocation sampler.
///
/// Maintains a running "bytes until next sample" counter drawn from an
/// exponential distribution with mean `interval_bytes`. Each allocation
/// decrements the counter by its size; crossing zero records exactly one
/// sample and redraws until the counter is positive again. Over `N` bytes
/// allocated the expected sample count converges to `N / interval_bytes`,
/// which makes `Σ(sample.size)` an unbiased estimator of bytes allocated
/// per call path.
#[derive(Debug)]
pub struct Sampler {
  bytes_until_sample: u64,
  interval_bytes: u64,
  rng: SmallRng,
}

impl Sampler {
  #[must_use]
  pub fn interval_bytes(&self) -> u64 {
    self.interval_bytes
  }

  /// `interval_bytes` must be non-zero; the profiler validates this before
  /// constructing a sampler.
  #[must_use]
  pub fn new(interval_bytes: u64, seed: Option<u64>) -> Self {
    let rng = match seed {
      Some(seed) => SmallRng::seed_from_u64(seed),
      None => SmallRng::from_os_rng(),
    };

    let mut sampler = Self {
      bytes_until_sample: 0,
      interval_bytes: interval_bytes.max(1),
      rng,
    };
    sampler.bytes_until_sample = sampler.next_interval();
    sampler
  }

  fn next_interval(&mut self) -> u64 {
    let uniform: f64 = self.rng.random();
    let interval = -(self.interval_bytes as f64) * (1.0 - uniform).ln();
    // At least one byte so the redraw loop always terminates.
    interval.max(1.0).min(u64::MAX as f64) as u64
  }

  /// Observe one allocation event. Returns whether it should be recorded.
  pub fn observe(&mut self, size: u64) -> bool {
    if size < self.bytes_until_sample {
      self.bytes_until_sample -= size;
      return false;
    }

    // One sample per crossing; a single large allocation may span several
    // intervals but still yields a single recorded sample.
    let mut carry = size - self.bytes_until_sample;
    loop {
      let next = self.next_interval();
      if carry < next {
        self.bytes_until_sample = next - carry;
        break;
      }
      carry -= next;
    }

    true
  }
}
