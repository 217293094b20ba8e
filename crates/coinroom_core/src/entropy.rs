//! Injected randomness for reward and term sampling.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::collections::VecDeque;
use std::sync::Mutex;

/// Uniform integer source.
pub trait Entropy {
    /// Uniform value in `[0, bound)`. `bound == 0` yields `0`.
    fn below(&self, bound: u32) -> u32;

    /// Uniform value in `[low, high]`.
    fn between(&self, low: u32, high: u32) -> u32 {
        if high <= low {
            return low;
        }
        let span = high - low;
        match span.checked_add(1) {
            Some(bound) => low + self.below(bound),
            None => low + self.below(span),
        }
    }
}

/// Per-call `rand::thread_rng()`; stateless and shareable.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadEntropy;

impl Entropy for ThreadEntropy {
    fn below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..bound)
    }
}

/// Wraps an owned RNG, e.g. a seeded `StdRng` for reproducible runs.
#[derive(Debug)]
pub struct RngEntropy<R> {
    rng: Mutex<R>,
}

impl<R: RngCore> RngEntropy<R> {
    pub fn new(rng: R) -> Self {
        Self {
            rng: Mutex::new(rng),
        }
    }
}

impl RngEntropy<StdRng> {
    pub fn seeded(seed: u64) -> Self {
        Self::new(StdRng::seed_from_u64(seed))
    }
}

impl<R: RngCore> Entropy for RngEntropy<R> {
    fn below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        match self.rng.lock() {
            Ok(mut rng) => rng.gen_range(0..bound),
            Err(poisoned) => poisoned.into_inner().gen_range(0..bound),
        }
    }
}

/// Replays a fixed sequence, each value reduced modulo the requested bound.
/// Once exhausted it yields `0`.
#[derive(Debug, Default)]
pub struct SequenceEntropy {
    values: Mutex<VecDeque<u32>>,
}

impl SequenceEntropy {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        self.values.lock().map_or(0, |values| values.len())
    }
}

impl Entropy for SequenceEntropy {
    fn below(&self, bound: u32) -> u32 {
        if bound == 0 {
            return 0;
        }
        let next = match self.values.lock() {
            Ok(mut values) => values.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.unwrap_or(0) % bound
    }
}

impl<E: Entropy + ?Sized> Entropy for &E {
    fn below(&self, bound: u32) -> u32 {
        (**self).below(bound)
    }
}

impl<E: Entropy + ?Sized> Entropy for std::sync::Arc<E> {
    fn below(&self, bound: u32) -> u32 {
        (**self).below(bound)
    }
}
