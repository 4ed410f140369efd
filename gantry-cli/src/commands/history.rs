//! History command handlers

use anyhow::Result;
use colored::*;
use gantry_core::domain::history::HistoryStats;
use gantry_engine::HistoryStore;

use crate::config::Config;
use crate::output::print_history_entry;

/// List recent runs, newest first
pub async fn list_history(config: &Config, limit: usize, json: bool) -> Result<()> {
    let store = config.history().await?;
    let entries = store.recent(limit).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("{}", "No runs recorded yet.".yellow());
        return Ok(());
    }

    let template = config.template()?;
    println!("{}", format!("Last {} run(s):", entries.len()).bold());
    println!();
    for entry in &entries {
        print_history_entry(entry, &template);
    }

    Ok(())
}

/// Show aggregate statistics over the stored history
pub async fn show_stats(config: &Config, json: bool) -> Result<()> {
    let store = config.history().await?;
    let entries = store.recent(config.history_capacity).await?;
    let stats = HistoryStats::from_entries(&entries);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    let rate = format!("{:.1}%", stats.success_rate);
    let rate = if stats.success_rate >= 90.0 {
        rate.green()
    } else if stats.success_rate >= 70.0 {
        rate.yellow()
    } else {
        rate.red()
    };

    println!("{}", "Pipeline Statistics:".bold());
    println!("  Total runs:       {}", stats.total_runs);
    println!("  Successful runs:  {}", stats.successful_runs);
    println!("  Success rate:     {}", rate);
    println!(
        "  Average duration: {:.1}s",
        stats.average_duration_ms as f64 / 1000.0
    );

    Ok(())
}
