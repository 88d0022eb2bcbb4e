//! Injectable randomness for scoring jitter and transmission simulation.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Maximum absolute jitter added to a method score.
pub const MAX_JITTER: f64 = 0.1;

/// Source of every random draw the dispatch pipeline makes.
pub trait RandomSource: Send {
    /// Score jitter in `[-MAX_JITTER, MAX_JITTER]`.
    fn jitter(&mut self) -> f64;
    /// Uniform draw in `[0, 1)`.
    fn unit(&mut self) -> f64;
    /// Uniform index in `0..len`. `len` is never zero.
    fn index(&mut self, len: usize) -> usize;
}

/// Production source backed by a seedable [`StdRng`].
#[derive(Debug)]
pub struct SeededRandom {
    rng: StdRng,
}

impl SeededRandom {
    /// Deterministic source for a fixed seed.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Source seeded from OS entropy.
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl RandomSource for SeededRandom {
    fn jitter(&mut self) -> f64 {
        self.rng.gen_range(-MAX_JITTER..=MAX_JITTER)
    }

    fn unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn index(&mut self, len: usize) -> usize {
        self.rng.gen_range(0..len.max(1))
    }
}

/// Pinned source: constant jitter and unit draws, index always zero.
///
/// With `jitter = 0.0` method selection is fully deterministic; `unit` controls
/// whether a simulated transmission succeeds (`unit < success probability`).
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom {
    /// Value returned by every [`RandomSource::jitter`] call, clamped to range.
    pub jitter: f64,
    /// Value returned by every [`RandomSource::unit`] call.
    pub unit: f64,
}

impl FixedRandom {
    /// Zero jitter and a unit draw that always succeeds.
    pub fn succeeding() -> Self {
        Self {
            jitter: 0.0,
            unit: 0.0,
        }
    }

    /// Zero jitter and a unit draw that always fails.
    pub fn failing() -> Self {
        Self {
            jitter: 0.0,
            unit: 0.999_999,
        }
    }
}

impl RandomSource for FixedRandom {
    fn jitter(&mut self) -> f64 {
        self.jitter.clamp(-MAX_JITTER, MAX_JITTER)
    }

    fn unit(&mut self) -> f64 {
        self.unit
    }

    fn index(&mut self, _len: usize) -> usize {
        0
    }
}

/// Replays a scripted list of unit draws, then repeats the last one.
///
/// Used to simulate "fail first, succeed on retry" sequences.
#[derive(Debug, Clone)]
pub struct ScriptedRandom {
    units: Vec<f64>,
    position: usize,
}

impl ScriptedRandom {
    /// Source replaying `units` in order; jitter is always zero.
    pub fn new(units: Vec<f64>) -> Self {
        Self { units, position: 0 }
    }
}

impl RandomSource for ScriptedRandom {
    fn jitter(&mut self) -> f64 {
        0.0
    }

    fn unit(&mut self) -> f64 {
        let value = self
            .units
            .get(self.position)
            .or_else(|| self.units.last())
            .copied()
            .unwrap_or(0.0);
        self.position = self.position.saturating_add(1);
        value
    }

    fn index(&mut self, _len: usize) -> usize {
        0
    }
}
