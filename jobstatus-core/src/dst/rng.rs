//! DeterministicRng - Seeded Randomness
//!
//! Every random decision in simulation flows through one seeded ChaCha
//! stream, so a failing run can be replayed with `DST_SEED=<seed>`.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::constants::ENV_DST_SEED;

/// Seeded random number generator for simulation.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    seed: u64,
    rng: ChaCha8Rng,
}

impl DeterministicRng {
    /// A stream fully determined by `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Use `DST_SEED` if set and numeric, otherwise a fresh random seed.
    /// The chosen seed is logged.
    #[must_use]
    pub fn from_env() -> Self {
        let seed = parse_seed(std::env::var(ENV_DST_SEED).ok().as_deref())
            .unwrap_or_else(rand::random);
        tracing::info!(seed, "DST seed (replay with {}={})", ENV_DST_SEED, seed);
        Self::new(seed)
    }

    /// Seed to replay this stream with.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform in `[0, 1)`.
    pub fn next_f64(&mut self) -> f64 {
        self.rng.gen()
    }

    /// True with the given probability.
    ///
    /// # Panics
    /// Panics if `probability` is outside `[0, 1]`.
    pub fn chance(&mut self, probability: f64) -> bool {
        assert!(
            (0.0..=1.0).contains(&probability),
            "probability {probability} outside [0, 1]"
        );
        if probability >= 1.0 {
            return true;
        }
        self.next_f64() < probability
    }
}

fn parse_seed(raw: Option<&str>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse().ok())
}
