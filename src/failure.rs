//! Per-worker stochastic fault and recovery process.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::{RECOVERY_MS_MAX, RECOVERY_MS_MIN, TICK_SECONDS};
use crate::types::WorkerId;

/// Derive a worker's stream seed from the run seed.
pub fn worker_seed(run_seed: u64, worker: WorkerId) -> u64 {
    // splitmix64 finalizer over the combined value.
    let mut z = run_seed ^ (worker as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Probability that a worker faults during one tick: `B * dt`, except that
/// `B = 1` means a fault on every tick.
pub fn tick_hazard(failure_probability: f64) -> f64 {
    let p = failure_probability.clamp(0.0, 1.0);
    if p >= 1.0 { 1.0 } else { p * TICK_SECONDS }
}

/// Inline fault source owned by one worker thread.
pub struct FailureInjector {
    rng: ChaCha8Rng,
    hazard: f64,
}

impl FailureInjector {
    pub fn new(run_seed: u64, worker: WorkerId, failure_probability: f64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(worker_seed(run_seed, worker)),
            hazard: tick_hazard(failure_probability),
        }
    }

    /// Draw for this tick; `true` means the worker faults now.
    pub fn strikes(&mut self) -> bool {
        if self.hazard <= 0.0 {
            return false;
        }
        self.rng.gen_range(0.0..1.0) < self.hazard
    }

    /// Simulated downtime in seconds before the worker comes back.
    pub fn recovery_seconds(&mut self) -> f64 {
        self.rng.gen_range(RECOVERY_MS_MIN..RECOVERY_MS_MAX) as f64 / 1000.0
    }
}
