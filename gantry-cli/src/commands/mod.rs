//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod history;
mod run;
mod stages;

use anyhow::Result;
use clap::Subcommand;
use gantry_engine::SimulatorConfig;
use std::time::Duration;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the full pipeline and stream its feed
    Run {
        /// Force the executing stage to fail after this many milliseconds
        #[arg(long)]
        force_error_after_ms: Option<u64>,
    },
    /// Run a single stage outside the pipeline order
    Step {
        /// Stage name
        stage: String,
    },
    /// List the stages of the template
    Stages,
    /// Show recent runs
    History {
        /// Maximum number of runs to show
        #[arg(short, long, default_value_t = 10)]
        limit: usize,

        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Show success rate and average duration
    Stats {
        /// Print raw JSON
        #[arg(long)]
        json: bool,
    },
    /// Simulate a commit; main and develop trigger a run
    Commit {
        /// Branch the commit was pushed to
        #[arg(short, long, default_value = "main")]
        branch: String,

        /// Commit message
        #[arg(short, long)]
        message: String,
    },
    /// Push random commits every few minutes until interrupted
    Watch {
        /// Shortest wait between two simulated commits, in seconds
        #[arg(long, default_value_t = 120)]
        min_interval_secs: u64,

        /// Longest wait between two simulated commits, in seconds
        #[arg(long, default_value_t = 300)]
        max_interval_secs: u64,

        /// Chance that a wait ends in a commit
        #[arg(long, default_value_t = 0.7)]
        commit_probability: f64,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler module.
///
/// # Arguments
/// * `command` - The command to execute
/// * `config` - The CLI configuration
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Run {
            force_error_after_ms,
        } => run::run_pipeline(config, force_error_after_ms).await,
        Commands::Step { stage } => run::run_step(config, &stage).await,
        Commands::Commit { branch, message } => run::commit(config, branch, message).await,
        Commands::Watch {
            min_interval_secs,
            max_interval_secs,
            commit_probability,
        } => {
            let simulator = SimulatorConfig::default()
                .with_interval(
                    Duration::from_secs(min_interval_secs),
                    Duration::from_secs(max_interval_secs),
                )
                .with_commit_probability(commit_probability);
            run::watch(config, simulator).await
        }
        Commands::Stages => stages::list_stages(config),
        Commands::History { limit, json } => history::list_history(config, limit, json).await,
        Commands::Stats { json } => history::show_stats(config, json).await,
    }
}
