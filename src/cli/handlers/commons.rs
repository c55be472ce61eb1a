// src/cli/handlers/commons.rs

// Shared helpers for builtin handlers.

use crate::core::{blueprint_registry::BlueprintEntry, session::Session};
use anyhow::Result;
use colored::Colorize;
use thiserror::Error;

/// A builtin was called without what it needs; reported, not fatal.
#[derive(Error, Debug)]
#[error("No blueprint provided, example: rigger {command}:{example}")]
pub struct UsageError {
    /// Builtin that was called.
    pub command: String,
    /// Sample argument shown in the message.
    pub example: String,
}

/// Finds the blueprint a builtin was called for.
///
/// `example` is the blueprint suggested when none was given.
pub fn require_blueprint<'s>(
    session: &'s Session,
    command: &str,
    example: &str,
    name: Option<&str>,
) -> Result<&'s BlueprintEntry> {
    let name = name.ok_or_else(|| UsageError {
        command: command.to_string(),
        example: example.to_string(),
    })?;
    Ok(session.registry().require(name)?)
}

/// Prints a blueprint's tasks, one per line, by dispatch path.
pub fn print_tasks(entry: &BlueprintEntry) {
    let width = entry.tasks.iter().map(|t| t.qualified.len()).max().unwrap_or(0);
    for route in &entry.tasks {
        let doc = entry
            .task(&route.name)
            .map(|t| first_line(&t.doc))
            .unwrap_or_default();
        println!("    {:<width$}  {}", route.qualified.cyan(), doc.dimmed(), width = width);
    }
}

/// First non-empty line of a doc string.
pub fn first_line(doc: &str) -> &str {
    doc.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("")
}
