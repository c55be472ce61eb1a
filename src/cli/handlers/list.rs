// src/cli/handlers/list.rs

use super::commons;
use crate::core::{config_loader, session::Session};
use anyhow::Result;
use colored::Colorize;

/// `list`: prints the available targets and every loaded blueprint's tasks.
pub fn handle(_argument: Option<&str>, session: &Session) -> Result<()> {
    let targets = config_loader::targets(session.environment())?;
    if !targets.is_empty() {
        println!("{}", "Targets:".bold());
        let width = targets.iter().map(|t| t.name.len()).max().unwrap_or(0);
        for target in &targets {
            println!("    {:<width$}  {}", target.name.green(), target.doc.dimmed(), width = width);
        }
        println!();
    }

    println!("{}", "Tasks:".bold());
    let entries = session.registry().entries();
    if entries.is_empty() {
        println!("    {}", "(no blueprints configured)".dimmed());
    }
    for entry in entries {
        println!("  {} {}", entry.name.yellow(), commons::first_line(&entry.descriptor.doc).dimmed());
        commons::print_tasks(entry);
    }
    Ok(())
}
