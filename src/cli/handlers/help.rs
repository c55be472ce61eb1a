// src/cli/handlers/help.rs

use super::commons;
use crate::core::session::Session;
use anyhow::Result;
use colored::Colorize;

/// `help:<blueprint>`: prints the blueprint's documentation and tasks.
pub fn handle(name: Option<&str>, session: &Session) -> Result<()> {
    let entry = commons::require_blueprint(session, "help", "python", name)?;

    println!("\n--- {} '{}' ---", "Blueprint".bold(), entry.name.yellow());
    println!("  {:<10} {}", "package".blue(), entry.package);
    let doc = entry.descriptor.doc.trim();
    if doc.is_empty() {
        println!("\n  {}", "(no documentation)".dimmed());
    } else {
        println!();
        for line in doc.lines() {
            println!("  {}", line);
        }
    }

    if entry.tasks.is_empty() {
        println!("\n  {}", "(no tasks)".dimmed());
    } else {
        println!("\n  {}", "Tasks:".bold());
        commons::print_tasks(entry);
    }
    Ok(())
}
