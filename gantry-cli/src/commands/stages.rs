//! Template inspection

use anyhow::Result;
use colored::*;

use crate::config::Config;

/// List the template's stages in execution order
pub fn list_stages(config: &Config) -> Result<()> {
    let template = config.template()?;

    println!(
        "{}",
        format!(
            "Pipeline '{}' ({} stages):",
            template.name(),
            template.len()
        )
        .bold()
    );
    println!();

    for (index, stage) in template.stages().iter().enumerate() {
        println!("  {} {}", format!("{}.", index + 1).dimmed(), stage.name.cyan());
        println!("     Duration:    {} ms", stage.nominal_duration_ms);
        println!(
            "     Failure rate: {:.0}%",
            stage.base_failure_probability * 100.0
        );
    }

    Ok(())
}
