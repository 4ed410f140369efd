//! Run command handlers
//!
//! Spawns a local engine backed by the history file, renders its events as
//! the terminal feed, and reports the outcome.

use anyhow::{Context, Result};
use colored::*;
use gantry_core::domain::commit::Commit;
use gantry_core::domain::event::Event;
use gantry_core::domain::log::{LogEntry, LogLevel};
use gantry_core::domain::run::{RunStatus, StageOutcome};
use gantry_engine::{
    CommitDecision, CommitSimulator, EngineError, PipelineEngine, SimulationTick, SimulatorConfig,
    Subscription, ThreadRandom, TokioClock,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::output::{print_log_entry, print_run_summary};

/// A spawned engine with its feed attached
struct Session {
    engine: PipelineEngine,
    _feed: Subscription,
    diagnostics: JoinHandle<()>,
}

impl Session {
    async fn start(config: &Config) -> Result<Self> {
        let template = config.template()?;
        let history = config.history().await?;

        let engine = PipelineEngine::builder(template)
            .config(config.engine()?)
            .history(Arc::new(history))
            .seed_bias_from_history(true)
            .spawn()
            .await?;

        let feed = engine.subscribe(|event: &Event| -> anyhow::Result<()> {
            print_log_entry(&LogEntry::from(event));
            Ok(())
        });

        let mut diagnostics = engine.diagnostics();
        let diagnostics = tokio::spawn(async move {
            while let Ok(diagnostic) = diagnostics.recv().await {
                print_log_entry(&LogEntry {
                    timestamp: diagnostic.timestamp,
                    level: LogLevel::Warning,
                    message: diagnostic.message,
                });
            }
        });

        Ok(Self {
            engine,
            _feed: feed,
            diagnostics,
        })
    }

    async fn close(self) -> Result<()> {
        self.engine.shutdown().await?;
        self.diagnostics.abort();
        Ok(())
    }
}

/// Run the full pipeline
pub async fn run_pipeline(config: &Config, force_error_after_ms: Option<u64>) -> Result<()> {
    let session = Session::start(config).await?;
    println!(
        "{}",
        format!("Running pipeline '{}'", session.engine.template().name()).bold()
    );

    session.engine.trigger().await?;

    if let Some(ms) = force_error_after_ms {
        let engine = session.engine.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            match engine.force_error().await {
                Ok(()) => info!("Forced failure after {} ms", ms),
                Err(EngineError::NotRunning) => {
                    warn!("No stage was running after {} ms, nothing to fail", ms)
                }
                Err(e) => warn!("Failed to force error: {}", e),
            }
        });
    }

    finish_run(session).await
}

/// Run one stage by name
pub async fn run_step(config: &Config, stage: &str) -> Result<()> {
    let session = Session::start(config).await?;

    let outcome = session
        .engine
        .run_single_step(stage)
        .await
        .with_context(|| format!("Failed to run stage '{}'", stage))?;
    session.close().await?;

    match outcome {
        StageOutcome::Success => {
            println!("{} Stage '{}' succeeded", "✓".green(), stage);
            Ok(())
        }
        _ => anyhow::bail!("Stage '{}' failed", stage),
    }
}

/// Simulate a pushed commit
pub async fn commit(config: &Config, branch: String, message: String) -> Result<()> {
    let session = Session::start(config).await?;

    let hash = Uuid::new_v4().simple().to_string();
    let commit = Commit::new(hash, branch, message);
    println!(
        "{} Commit {} on {}: {}",
        "▸".cyan(),
        commit.short_hash().yellow(),
        commit.branch.cyan(),
        commit.message
    );

    let decision = session.engine.on_commit(commit.clone()).await?;
    match decision {
        CommitDecision::Triggered(run_id) => {
            info!("Commit {} triggered run {}", commit.short_hash(), run_id);
            finish_run(session).await
        }
        CommitDecision::Deferred => {
            println!(
                "{}",
                format!("Pipeline waiting for a merge request on {}", commit.branch).yellow()
            );
            session.close().await
        }
        CommitDecision::Skipped => {
            println!("{}", "A run is already in progress, commit skipped".yellow());
            session.close().await
        }
    }
}

/// Push random commits into the engine until Ctrl-C
pub async fn watch(config: &Config, simulator: SimulatorConfig) -> Result<()> {
    let session = Session::start(config).await?;
    let simulator = CommitSimulator::new(
        session.engine.clone(),
        Arc::new(TokioClock::new()),
        Arc::new(ThreadRandom),
        simulator,
    )
    .context("Invalid commit simulator settings")?;

    println!(
        "{}",
        format!(
            "Watching pipeline '{}' for commits (Ctrl-C to stop)",
            session.engine.template().name()
        )
        .bold()
    );

    tokio::select! {
        _ = simulator.run(print_tick) => {}
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, stopping after the current run");
        }
    }

    session.close().await
}

fn print_tick(tick: &SimulationTick) {
    match tick {
        SimulationTick::NoCommit => {}
        SimulationTick::Busy => {
            println!("{}", "A run is in progress, no commit pushed".dimmed());
        }
        SimulationTick::Committed(commit, decision) => {
            println!(
                "{} Commit {} on {}: {}",
                "▸".cyan(),
                commit.short_hash().yellow(),
                commit.branch.cyan(),
                commit.message
            );
            if *decision == CommitDecision::Deferred {
                println!(
                    "{}",
                    format!("Pipeline waiting for a merge request on {}", commit.branch).yellow()
                );
            }
        }
    }
}

async fn finish_run(session: Session) -> Result<()> {
    let finished = session.engine.wait_for_terminal().await?;
    session.close().await?;

    print_run_summary(&finished);

    if finished.status == RunStatus::Failed {
        anyhow::bail!(
            "Pipeline run {} failed: {}",
            finished.run_id,
            finished.error_detail.unwrap_or_default()
        );
    }
    Ok(())
}
