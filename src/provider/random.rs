//! Randomness abstraction.
//!
//! The hub draws peer identifiers through this trait. Keeping randomness
//! behind a provider makes id generation swappable in tests that want
//! predictable ids.

use rand::distr::uniform::SampleUniform;
use rand::distr::{Distribution, StandardUniform};
use rand::prelude::*;
use std::cell::RefCell;
use std::ops::Range;

/// Provider of random values.
pub trait RandomProvider: Clone {
    /// Generate a random value of type `T`.
    fn random<T>(&self) -> T
    where
        StandardUniform: Distribution<T>;

    /// Generate a random value in `range` (upper bound exclusive).
    fn random_range<T>(&self, range: Range<T>) -> T
    where
        T: SampleUniform + PartialOrd;

    /// Generate a random `f64` in `[0.0, 1.0)`.
    fn random_ratio(&self) -> f64;

    /// Generate a random bool that is true with the given probability.
    fn random_bool(&self, probability: f64) -> bool;
}

/// Production randomness over the thread-local `rand` RNG.
#[derive(Clone, Debug, Default)]
pub struct TokioRandomProvider;

impl TokioRandomProvider {
    /// Create a production random provider.
    pub fn new() -> Self {
        Self
    }
}

thread_local! {
    static RNG: RefCell<rand::rngs::ThreadRng> = RefCell::new(rand::rng());
}

impl RandomProvider for TokioRandomProvider {
    fn random<T>(&self) -> T
    where
        StandardUniform: Distribution<T>,
    {
        RNG.with(|rng| rng.borrow_mut().random())
    }

    fn random_range<T>(&self, range: Range<T>) -> T
    where
        T: SampleUniform + PartialOrd,
    {
        RNG.with(|rng| rng.borrow_mut().random_range(range))
    }

    fn random_ratio(&self) -> f64 {
        RNG.with(|rng| rng.borrow_mut().random())
    }

    fn random_bool(&self, probability: f64) -> bool {
        self.random_ratio() < probability
    }
}
