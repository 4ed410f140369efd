//! Randomness abstraction
//!
//! Failure draws and duration jitter each read from their own
//! [`RandomSource`], so a scripted source sees exactly one failure draw per
//! stage attempt. A stage
//! fails when a draw lands strictly below its effective failure
//! probability, so a draw of `0.0` fails any stage with `p > 0` and a draw
//! close to `1.0` passes any stage with `p < 1`.

use rand::Rng;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Source of uniform draws in `[0, 1)`
pub trait RandomSource: Send + Sync {
    fn next_unit(&self) -> f64;
}

/// Thread-local RNG from the `rand` crate
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_unit(&self) -> f64 {
        rand::rng().random::<f64>()
    }
}

/// Always returns the same value
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub f64);

impl RandomSource for FixedRandom {
    fn next_unit(&self) -> f64 {
        self.0
    }
}

/// Replays a fixed sequence of draws, then a fallback value forever
pub struct SequenceRandom {
    values: Mutex<VecDeque<f64>>,
    fallback: f64,
}

impl SequenceRandom {
    /// Replays `values`; once exhausted every draw returns `0.999`, which
    /// passes any stage whose failure probability is below 1
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        Self::with_fallback(values, 0.999)
    }

    pub fn with_fallback(values: impl IntoIterator<Item = f64>, fallback: f64) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            fallback,
        }
    }

    /// Number of scripted draws not yet consumed
    pub fn remaining(&self) -> usize {
        self.values.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl RandomSource for SequenceRandom {
    fn next_unit(&self) -> f64 {
        self.values
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or(self.fallback)
    }
}
