//! Terminal rendering helpers

use colored::*;
use gantry_core::domain::history::RunHistoryEntry;
use gantry_core::domain::log::{LogEntry, LogLevel};
use gantry_core::domain::run::{RunState, RunStatus, StageOutcome};
use gantry_core::domain::stage::PipelineTemplate;

/// Print a line of the terminal feed
pub fn print_log_entry(log: &LogEntry) {
    let level_str = format!("{:?}", log.level).to_uppercase();
    let level_colored = match log.level {
        LogLevel::Info => level_str.cyan(),
        LogLevel::Warning => level_str.yellow(),
        LogLevel::Error => level_str.red(),
    };

    println!(
        "{} [{}] {}",
        log.timestamp.format("%H:%M:%S").to_string().dimmed(),
        level_colored,
        log.message
    );
}

/// Colorize run status for display
pub fn colorize_status(status: RunStatus) -> ColoredString {
    let status_str = status.to_string();
    match status {
        RunStatus::Idle => status_str.dimmed(),
        RunStatus::Running => status_str.cyan(),
        RunStatus::Recovering => status_str.yellow(),
        RunStatus::Succeeded => status_str.green(),
        RunStatus::Failed => status_str.red(),
    }
}

fn outcome_marker(outcome: StageOutcome) -> ColoredString {
    match outcome {
        StageOutcome::Success => "✓".green(),
        StageOutcome::Failure => "✗".red(),
        StageOutcome::Skipped => "·".dimmed(),
    }
}

/// Print the final state of a run
pub fn print_run_summary(state: &RunState) {
    println!();
    println!("{}", "Run Summary:".bold());
    println!("  Run ID:   {}", state.run_id.to_string().cyan());
    println!("  Pipeline: {}", state.template.name());
    println!("  Status:   {}", colorize_status(state.status));

    if let (Some(started), Some(finished)) = (state.started_at, state.finished_at) {
        let duration = finished.signed_duration_since(started);
        println!("  Duration: {:.1}s", duration.num_milliseconds() as f64 / 1000.0);
    }

    println!();
    for (index, stage) in state.template.stages().iter().enumerate() {
        match state.stage_outcomes.get(index) {
            Some(result) => {
                let retried = if result.attempts > 1 {
                    format!(" (attempt {})", result.attempts).yellow().to_string()
                } else {
                    String::new()
                };
                println!(
                    "  {} {:<12} {:>6} ms{}",
                    outcome_marker(result.outcome),
                    stage.name,
                    result.duration_ms(),
                    retried
                );
            }
            None => println!(
                "  {} {}",
                outcome_marker(StageOutcome::Skipped),
                stage.name.dimmed()
            ),
        }
    }

    if let Some(detail) = &state.error_detail {
        println!("\n{}", "Error:".bold());
        println!("{}", detail.red());
    }
}

/// Print one history entry
pub fn print_history_entry(entry: &RunHistoryEntry, template: &PipelineTemplate) {
    println!("  {} Run {}", "▸".cyan(), entry.run_id.to_string().dimmed());
    println!("    Pipeline: {}", entry.template_name);
    println!("    Status:   {}", colorize_status(entry.status));
    println!(
        "    Started:  {}",
        entry
            .started_at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .dimmed()
    );
    println!("    Duration: {} ms", entry.duration_ms());

    let stages: Vec<String> = entry
        .stage_outcomes
        .iter()
        .map(|record| {
            let name = if entry.template_name == template.name() {
                template
                    .stage(record.stage_index)
                    .map(|s| s.name.clone())
                    .unwrap_or_else(|| format!("#{}", record.stage_index))
            } else {
                format!("#{}", record.stage_index)
            };
            format!("{} {}", outcome_marker(record.outcome), name)
        })
        .collect();
    if !stages.is_empty() {
        println!("    Stages:   {}", stages.join("  "));
    }

    if let Some(error) = &entry.error_detail {
        println!("    Error:    {}", error.red());
    }
    println!();
}
