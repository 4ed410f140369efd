//! Gantry CLI
//!
//! Runs pipeline templates on a local engine and inspects run history.
//! The terminal feed goes to stdout; tracing output goes to stderr.

mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "gantry")]
#[command(about = "Gantry CI/CD pipeline simulator", long_about = None)]
struct Cli {
    /// Pipeline template (JSON); the built-in ci-cd template when omitted
    #[arg(long, env = "GANTRY_TEMPLATE")]
    template: Option<PathBuf>,

    /// File the run history is kept in
    #[arg(long, env = "GANTRY_HISTORY_FILE", default_value = "gantry-history.json")]
    history_file: PathBuf,

    /// Number of runs kept in the history file
    #[arg(long, env = "GANTRY_HISTORY_CAPACITY", default_value_t = 20)]
    history_capacity: usize,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gantry_cli=info,gantry_engine=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config {
        template_path: cli.template,
        history_file: cli.history_file,
        history_capacity: cli.history_capacity,
    };

    handle_command(cli.command, &config).await
}
