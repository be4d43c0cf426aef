//! Injectable randomness for the stochastic parts of the link.
//!
//! The MAC's busy/collision trials, its backoff draws and the fault injector
//! all pull from a [`RandomSource`]. Production runs use a seeded ChaCha8
//! stream, so a run is reproducible from its seed; tests script the exact
//! values they need.

use std::collections::VecDeque;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Source of uniform draws.
pub trait RandomSource: Send {
    /// Uniform value in `[0.0, 1.0)`.
    fn next_uniform(&mut self) -> f64;

    /// Uniform integer in `[lo, hi]` (inclusive). Requires `lo <= hi`.
    fn next_in_range(&mut self, lo: i64, hi: i64) -> i64;
}

impl<R: RandomSource + ?Sized> RandomSource for Box<R> {
    fn next_uniform(&mut self) -> f64 {
        (**self).next_uniform()
    }

    fn next_in_range(&mut self, lo: i64, hi: i64) -> i64 {
        (**self).next_in_range(lo, hi)
    }
}

/// Deterministic ChaCha8 stream.
#[derive(Debug, Clone)]
pub struct SeededRandom {
    rng: ChaCha8Rng,
    seed: u64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed from OS entropy; the chosen seed is still recorded.
    pub fn from_entropy() -> Self {
        Self::new(rand::thread_rng().gen())
    }

    /// Seed this stream started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomSource for SeededRandom {
    fn next_uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn next_in_range(&mut self, lo: i64, hi: i64) -> i64 {
        self.rng.gen_range(lo..=hi)
    }
}

/// Replays fixed values, for tests that need an exact trial sequence.
///
/// Once a script runs dry, uniform draws return [`ScriptedRandom::IDLE`]
/// (free channel, no collision) and range draws return `lo`.
/// Range values are clamped into the requested bounds.
#[derive(Debug, Clone, Default)]
pub struct ScriptedRandom {
    uniforms: VecDeque<f64>,
    ranges: VecDeque<i64>,
}

impl ScriptedRandom {
    /// Uniform value returned when the script is exhausted.
    pub const IDLE: f64 = 0.99;

    pub fn new(uniforms: impl IntoIterator<Item = f64>, ranges: impl IntoIterator<Item = i64>) -> Self {
        Self {
            uniforms: uniforms.into_iter().collect(),
            ranges: ranges.into_iter().collect(),
        }
    }

    /// Uniform draws not consumed yet.
    pub fn remaining_uniforms(&self) -> usize {
        self.uniforms.len()
    }
}

impl RandomSource for ScriptedRandom {
    fn next_uniform(&mut self) -> f64 {
        self.uniforms.pop_front().unwrap_or(Self::IDLE)
    }

    fn next_in_range(&mut self, lo: i64, hi: i64) -> i64 {
        self.ranges.pop_front().unwrap_or(lo).clamp(lo, hi)
    }
}
