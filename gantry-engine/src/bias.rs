//! Success-rate self-tuning
//!
//! The engine keeps one [`SuccessBias`] per instance. It is a pure function
//! of the sequence of terminal run outcomes: nothing is resampled between
//! draws, so long-run statistics follow history rather than noise.

use gantry_core::domain::history::RunHistoryEntry;

use crate::config::BiasConfig;

/// Accumulated failure-probability offset
#[derive(Debug, Clone)]
pub struct SuccessBias {
    config: BiasConfig,
    bias: f64,
}

impl SuccessBias {
    pub fn new(config: BiasConfig) -> Self {
        Self { config, bias: 0.0 }
    }

    /// Current offset added to base failure probabilities
    pub fn value(&self) -> f64 {
        self.bias
    }

    /// Folds one terminal run outcome into the bias
    ///
    /// The offset is kept within `[-max, max]` so a long streak can always
    /// be walked back.
    pub fn record(&mut self, succeeded: bool) {
        let step = if succeeded {
            -self.config.success_step
        } else {
            self.config.failure_step
        };
        self.bias = (self.bias + step).clamp(-self.config.max, self.config.max);
    }

    /// Replays history, oldest entry first
    pub fn replay<'a>(&mut self, entries: impl IntoIterator<Item = &'a RunHistoryEntry>) {
        for entry in entries {
            self.record(entry.succeeded());
        }
    }

    /// Effective failure probability for a stage
    ///
    /// Bases of exactly 0 or 1 describe stages that never or always fail
    /// and are not tuned. Anything in between is offset by the bias and
    /// clamped into the configured band.
    pub fn effective(&self, base: f64) -> f64 {
        if base <= 0.0 || base >= 1.0 {
            return base.clamp(0.0, 1.0);
        }
        (base + self.bias).clamp(self.config.min, self.config.max)
    }
}
