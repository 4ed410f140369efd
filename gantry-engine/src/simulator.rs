//! Commit simulator
//!
//! Pushes a random commit into an engine every few minutes, the way a busy
//! repository would. Each tick waits a random interval, then commits with
//! `commit_probability` unless a run is still in flight. Triggering goes
//! through [`PipelineEngine::on_commit`], so the branch policy applies.

use gantry_core::domain::commit::Commit;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::commit::CommitDecision;
use crate::engine::PipelineEngine;
use crate::error::{EngineError, Result};
use crate::random::RandomSource;

/// Commit simulator settings
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Shortest wait between two ticks
    pub min_interval: Duration,

    /// Longest wait between two ticks
    pub max_interval: Duration,

    /// Chance that a tick produces a commit
    pub commit_probability: f64,

    /// Branches commits are pushed to
    pub branches: Vec<String>,

    /// Commit messages to pick from
    pub messages: Vec<String>,
}

impl SimulatorConfig {
    /// Sets the interval bounds
    pub fn with_interval(mut self, min: Duration, max: Duration) -> Self {
        self.min_interval = min;
        self.max_interval = max;
        self
    }

    /// Sets the commit probability
    pub fn with_commit_probability(mut self, probability: f64) -> Self {
        self.commit_probability = probability;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.min_interval > self.max_interval {
            anyhow::bail!(
                "min_interval ({:?}) must not exceed max_interval ({:?})",
                self.min_interval,
                self.max_interval
            );
        }

        if self.max_interval.is_zero() {
            anyhow::bail!("max_interval must be greater than 0");
        }

        if !(0.0..=1.0).contains(&self.commit_probability) {
            anyhow::bail!("commit_probability must lie within [0, 1]");
        }

        if self.branches.is_empty() || self.messages.is_empty() {
            anyhow::bail!("branches and messages must not be empty");
        }

        Ok(())
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_secs(120),
            max_interval: Duration::from_secs(300),
            commit_probability: 0.7,
            branches: ["main", "develop", "feature/auth", "release/v1.3"]
                .into_iter()
                .map(String::from)
                .collect(),
            messages: [
                "feat: add JWT authentication",
                "fix: correct Kubernetes deployment bug",
                "docs: document the Docker commands in the README",
                "test: add integration tests for the auth module",
                "refactor: slim down the multi-stage Dockerfile",
                "chore: bump dependencies with security fixes",
                "ci: cache npm in the workflow",
                "perf: speed up database queries",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// What one tick of the simulator did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulationTick {
    /// The commit draw came up empty
    NoCommit,
    /// A run was still in flight; nothing was pushed
    Busy,
    /// A commit was pushed and the engine decided what to do with it
    Committed(Commit, CommitDecision),
}

/// Drives an engine with random commits
pub struct CommitSimulator {
    engine: PipelineEngine,
    clock: Arc<dyn Clock>,
    random: Arc<dyn RandomSource>,
    config: SimulatorConfig,
}

impl CommitSimulator {
    /// # Arguments
    /// * `engine` - Engine that receives the commits
    /// * `clock` - Clock the intervals are waited on
    /// * `random` - Source for intervals, commit chance and commit contents
    /// * `config` - Simulator settings; rejected if invalid
    pub fn new(
        engine: PipelineEngine,
        clock: Arc<dyn Clock>,
        random: Arc<dyn RandomSource>,
        config: SimulatorConfig,
    ) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            clock,
            random,
            config,
        })
    }

    /// Ticks until the engine stops, reporting every tick to `on_tick`
    pub async fn run(&self, mut on_tick: impl FnMut(&SimulationTick)) {
        info!(
            "Starting commit simulator (every {:?} to {:?})",
            self.config.min_interval, self.config.max_interval
        );

        loop {
            match self.tick().await {
                Ok(tick) => on_tick(&tick),
                Err(EngineError::EngineStopped) => {
                    debug!("Engine stopped, commit simulator exiting");
                    return;
                }
                Err(e) => debug!("Simulated commit rejected: {}", e),
            }
        }
    }

    /// Waits one random interval, then maybe pushes a commit
    pub async fn tick(&self) -> Result<SimulationTick> {
        self.clock.sleep(self.next_interval()).await;

        if self.random.next_unit() >= self.config.commit_probability {
            return Ok(SimulationTick::NoCommit);
        }

        let state = self.engine.state();
        if state.status.is_active() || state.recovery_pending {
            debug!("Run {} in flight, skipping simulated commit", state.run_id.short());
            return Ok(SimulationTick::Busy);
        }

        let commit = self.next_commit();
        let decision = self.engine.on_commit(commit.clone()).await?;
        info!(
            "Simulated commit {} on {}: {:?}",
            commit.short_hash(),
            commit.branch,
            decision
        );
        Ok(SimulationTick::Committed(commit, decision))
    }

    fn next_interval(&self) -> Duration {
        let span = self.config.max_interval - self.config.min_interval;
        self.config.min_interval + span.mul_f64(self.random.next_unit())
    }

    fn next_commit(&self) -> Commit {
        let message = pick(&self.config.messages, self.random.next_unit());
        let branch = pick(&self.config.branches, self.random.next_unit());
        Commit::new(Uuid::new_v4().simple().to_string(), branch, message)
    }
}

fn pick(items: &[String], draw: f64) -> &str {
    let index = ((draw * items.len() as f64) as usize).min(items.len().saturating_sub(1));
    items.get(index).map(String::as_str).unwrap_or_default()
}
