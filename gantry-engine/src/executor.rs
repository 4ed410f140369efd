//! Stage execution
//!
//! A [`StageExecutor`] performs the work of one stage. The engine races it
//! against the stage timeout and a forced failure, then decides the outcome
//! with its own failure draw; an executor only reports whether the work
//! itself completed.

use async_trait::async_trait;
use gantry_core::domain::run::RunId;
use gantry_core::domain::stage::StageDefinition;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::clock::Clock;
use crate::random::RandomSource;

/// What the executor knows about the stage it is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageContext {
    pub run_id: RunId,
    pub stage_index: usize,
    /// 1 for the first execution, 2 for the recovery retry
    pub attempt: u32,
}

/// Performs the work of a stage
///
/// Implementations must be cancel-safe: the engine drops the future when
/// the stage times out or a failure is forced.
#[async_trait]
pub trait StageExecutor: Send + Sync {
    /// Runs the stage to completion
    ///
    /// Returns `Err` with a message if the work itself failed.
    async fn execute(&self, stage: &StageDefinition, ctx: &StageContext) -> Result<(), String>;
}

/// Simulates a stage by sleeping for its nominal duration plus jitter
///
/// The jitter is proportional to the stage, so a stage runs for at most
/// `nominal × (1 + jitter)`.
pub struct SimulatedExecutor {
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    jitter: f64,
}

impl SimulatedExecutor {
    /// # Arguments
    /// * `clock` - Clock to sleep on
    /// * `random` - Source for the jitter draw, separate from the engine's
    ///   failure draws
    /// * `jitter` - Upper bound of the extra duration as a fraction of the
    ///   nominal duration; `0.0` disables the draw entirely
    pub fn new(clock: Arc<dyn Clock>, random: Arc<dyn RandomSource>, jitter: f64) -> Self {
        Self {
            clock,
            random,
            jitter,
        }
    }

    fn planned_duration(&self, stage: &StageDefinition) -> Duration {
        let nominal = stage.nominal_duration();
        if self.jitter <= 0.0 {
            return nominal;
        }
        nominal + nominal.mul_f64(self.jitter * self.random.next_unit())
    }
}

#[async_trait]
impl StageExecutor for SimulatedExecutor {
    async fn execute(&self, stage: &StageDefinition, ctx: &StageContext) -> Result<(), String> {
        let duration = self.planned_duration(stage);
        debug!(
            "Simulating stage '{}' (run {}, attempt {}) for {} ms",
            stage.name,
            ctx.run_id.short(),
            ctx.attempt,
            duration.as_millis()
        );
        self.clock.sleep(duration).await;
        Ok(())
    }
}
