//! Injectable randomness
//!
//! Opponent generation and simulated drivers draw from a [`RandomSource`]
//! so tests can seed it and assert exact outputs.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Uniform random number source
pub trait RandomSource: Send + Sync {
    /// Uniform sample in `[0, 1)`
    fn next_f64(&self) -> f64;

    /// Uniform sample in `[low, high)`
    fn range_f64(&self, low: f64, high: f64) -> f64 {
        if high <= low {
            return low;
        }
        low + (high - low) * self.next_f64()
    }
}

/// ChaCha20-backed source
pub struct ChaChaSource {
    rng: parking_lot::Mutex<ChaCha20Rng>,
}

impl ChaChaSource {
    /// Deterministic source for tests and reproducible simulations
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: parking_lot::Mutex::new(ChaCha20Rng::seed_from_u64(seed)),
        }
    }

    /// Source seeded from OS entropy
    pub fn from_entropy() -> Self {
        Self {
            rng: parking_lot::Mutex::new(ChaCha20Rng::from_entropy()),
        }
    }
}

impl RandomSource for ChaChaSource {
    fn next_f64(&self) -> f64 {
        self.rng.lock().gen::<f64>()
    }
}
