// src/core/task_executor.rs

use crate::core::blueprint::{TaskAction, TaskDescriptor};
use crate::core::config_resolver;
use crate::core::task_context::TaskContext;
use crate::models::Step;
use anyhow::{Context, Result};
use colored::Colorize;
use toml::{Table, Value};

/// Runs one task against the host in `ctx`.
pub fn execute_task(task: &TaskDescriptor, ctx: &TaskContext<'_>) -> Result<()> {
    println!(
        "{} {}.{}{}",
        "==>".blue().bold(),
        ctx.blueprint.name,
        task.name.bold(),
        ctx.host.map(|h| format!(" [{}]", h)).unwrap_or_default().dimmed()
    );

    match &task.action {
        TaskAction::Native(action) => action(ctx),
        TaskAction::Steps(steps) => {
            for (index, step) in steps.iter().enumerate() {
                execute_step(step, ctx)
                    .with_context(|| format!("Step {} of '{}.{}' failed", index + 1, ctx.blueprint.name, task.name))?;
            }
            Ok(())
        }
    }
}

fn execute_step(step: &Step, ctx: &TaskContext<'_>) -> Result<()> {
    match step {
        Step::Run { run } => ctx.run(run).map(|_| ()),
        Step::Sudo { sudo, user } => ctx.sudo(sudo, user.as_deref()).map(|_| ()),
        Step::Upload { upload } => {
            let context = expand_context(&upload.context, ctx)?;
            ctx.upload(
                &upload.template,
                &upload.destination,
                Some(context),
                upload.owner.as_deref(),
                upload.group.as_deref(),
            )
            .map(|_| ())
        }
    }
}

/// Expands `$(...)` variables inside a step's literal template context.
fn expand_context(context: &Table, ctx: &TaskContext<'_>) -> Result<Table> {
    let mut expanded = Table::new();
    for (key, value) in context {
        let value = match value {
            Value::String(text) => Value::String(config_resolver::substitute(ctx.tree, text)?),
            other => other.clone(),
        };
        expanded.insert(key.clone(), value);
    }
    Ok(expanded)
}
