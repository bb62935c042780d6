//! List command

use anyhow::Result;
use colored::*;

use crate::config::Config;

/// Print every stack grouped by deployment wave
pub fn list_stacks(config: &Config) -> Result<()> {
    let topology = config.topology()?;
    let waves = topology.waves()?;

    println!(
        "{}",
        format!(
            "{} stack(s) for {} in {} wave(s):",
            topology.stacks().len(),
            topology.env(),
            waves.len()
        )
        .bold()
    );
    println!();

    for (index, wave) in waves.iter().enumerate() {
        println!("  {} {}", "Wave".bold(), index.to_string().cyan());
        for stack in wave {
            let dependencies = stack
                .dependencies()
                .iter()
                .map(|d| d.as_str())
                .collect::<Vec<_>>();
            println!(
                "    {} {} {}",
                "▸".cyan(),
                stack.id().as_str().bold(),
                format!(
                    "({} resources, {} exports)",
                    stack.template().resources.len(),
                    stack.exports().len()
                )
                .dimmed()
            );
            if !dependencies.is_empty() {
                println!("      depends on: {}", dependencies.join(", ").dimmed());
            }
        }
        println!();
    }

    Ok(())
}
