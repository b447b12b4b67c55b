//! Synthetic tick feed standing in for a real market-data connection.
//!
//! Any `Iterator<Item = Tick> + Send` can drive the producer thread; this is
//! the default one. Pacing is applied by the producer loop, not here.

use crate::stream::types::Tick;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomWalkConfig {
    /// Initial midpoint
    pub start_mid: f64,

    /// Price move per unit of the uniform draw (mid moves by `(u - 50) * step`)
    pub step: f64,

    /// Quotes are `mid - half_spread` / `mid + half_spread`
    pub half_spread: f64,

    /// Volume attached to every tick
    pub volume: u32,
}

impl Default for RandomWalkConfig {
    fn default() -> Self {
        Self {
            start_mid: 100.0,
            step: 0.0005,
            half_spread: 0.01,
            volume: 10,
        }
    }
}

/// Infinite random walk around a drifting midpoint.
///
/// Each call draws `u` uniformly from `0..100` and moves the mid by
/// `(u - 50) * step`, so the walk has a slight downward bias of half a step.
pub struct RandomWalkSource {
    config: RandomWalkConfig,
    mid: f64,
    rng: StdRng,
}

impl RandomWalkSource {
    pub fn new(config: RandomWalkConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Deterministic walk for reproducible runs.
    pub fn with_seed(config: RandomWalkConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: RandomWalkConfig, rng: StdRng) -> Self {
        Self {
            mid: config.start_mid,
            config,
            rng,
        }
    }

    /// Current midpoint (the mid of the last tick produced).
    pub fn mid(&self) -> f64 {
        self.mid
    }
}

impl Iterator for RandomWalkSource {
    type Item = Tick;

    #[inline]
    fn next(&mut self) -> Option<Tick> {
        let draw: i32 = self.rng.gen_range(0..100);
        self.mid += f64::from(draw - 50) * self.config.step;

        Some(Tick::now(
            self.mid - self.config.half_spread,
            self.mid + self.config.half_spread,
            self.config.volume,
        ))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (usize::MAX, None)
    }
}
