//! Configuration module
//!
//! Handles CLI configuration: which template to run and where history lives.

use anyhow::{Context, Result};
use gantry_core::domain::stage::PipelineTemplate;
use gantry_engine::template::load_template;
use gantry_engine::{EngineConfig, JsonFileHistoryStore};
use std::path::PathBuf;
use tracing::debug;

/// CLI configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Template file; `None` selects the built-in ci-cd template
    pub template_path: Option<PathBuf>,

    /// JSON file backing the run history
    pub history_file: PathBuf,

    /// Maximum number of runs kept in the history file
    pub history_capacity: usize,
}

impl Config {
    /// Loads the configured pipeline template
    pub fn template(&self) -> Result<PipelineTemplate> {
        match &self.template_path {
            Some(path) => {
                debug!("Loading template from {}", path.display());
                load_template(path)
            }
            None => Ok(PipelineTemplate::default_ci()),
        }
    }

    /// Engine settings, read from GANTRY_* environment variables
    pub fn engine(&self) -> Result<EngineConfig> {
        EngineConfig::from_env().context("Invalid engine configuration")
    }

    /// Opens the history file
    pub async fn history(&self) -> Result<JsonFileHistoryStore> {
        JsonFileHistoryStore::open(&self.history_file, self.history_capacity)
            .await
            .with_context(|| format!("Failed to open history file {}", self.history_file.display()))
    }
}
