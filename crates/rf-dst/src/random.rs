//! Seeded randomness.
//!
//! Every random decision in a trial comes from a `DeterministicRng` seeded
//! with the trial seed, so a seed is a complete description of a schedule.
//! ChaCha8 is used instead of `StdRng` because its output stream is fixed
//! across `rand` releases, which keeps recorded seeds replayable.

use rand::distributions::uniform::{SampleRange, SampleUniform};
use rand::distributions::{Distribution, Standard};
use rand::seq::SliceRandom;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Deterministic pseudo-random generator.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Seed this generator was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn gen<T>(&mut self) -> T
    where
        Standard: Distribution<T>,
    {
        self.rng.gen()
    }

    /// Uniform sample from `range`.
    pub fn gen_range<T, R>(&mut self, range: R) -> T
    where
        T: SampleUniform,
        R: SampleRange<T>,
    {
        self.rng.gen_range(range)
    }

    pub fn gen_bool(&mut self, probability: f64) -> bool {
        debug_assert!((0.0..=1.0).contains(&probability));
        self.rng.gen_bool(probability)
    }

    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        items.shuffle(&mut self.rng);
    }

    pub fn next_u64(&mut self) -> u64 {
        self.rng.next_u64()
    }
}

/// Stream of trial seeds derived from a campaign's master seed.
///
/// The same master seed always yields the same sequence of trial seeds, so a
/// whole campaign is reproducible, not only its individual trials.
#[derive(Debug, Clone)]
pub struct SeedSource {
    rng: DeterministicRng,
    drawn_count: u64,
}

impl SeedSource {
    pub fn new(master_seed: u64) -> Self {
        Self {
            rng: DeterministicRng::new(master_seed),
            drawn_count: 0,
        }
    }

    pub fn master_seed(&self) -> u64 {
        self.rng.seed()
    }

    /// Number of seeds handed out so far.
    pub fn drawn_count(&self) -> u64 {
        self.drawn_count
    }

    /// Next trial seed. Never zero.
    pub fn next_seed(&mut self) -> u64 {
        let seed = loop {
            let candidate = self.rng.next_u64();
            if candidate != 0 {
                break candidate;
            }
        };
        self.drawn_count += 1;
        seed
    }
}

impl Iterator for SeedSource {
    type Item = u64;

    fn next(&mut self) -> Option<u64> {
        Some(self.next_seed())
    }
}
