//! Synth command

use anyhow::{Context, Result};
use colored::*;
use std::path::Path;

use crate::config::Config;

/// Write every template plus `manifest.json` to `out`
pub fn synth_assembly(config: &Config, out: &Path) -> Result<()> {
    let topology = config.topology()?;
    let manifest = nimbus_stacks::synth(&topology, out)
        .with_context(|| format!("Failed to synthesize into {}", out.display()))?;

    println!("{}", "✓ Cloud assembly written".green().bold());
    println!("  Directory:   {}", out.display().to_string().cyan());
    println!("  Environment: {}", manifest.environment);
    for entry in &manifest.stacks {
        println!(
            "    {} {} {}",
            "▸".cyan(),
            entry.template_file,
            format!("(wave {})", entry.wave).dimmed()
        );
    }

    Ok(())
}
