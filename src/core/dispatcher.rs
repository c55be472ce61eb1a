// src/core/dispatcher.rs

use crate::constants::KEY_HOSTS;
use crate::core::blueprint::TaskDescriptor;
use crate::core::blueprint_registry::BlueprintEntry;
use crate::core::commons;
use crate::core::config_resolver::{self, ResolverError};
use crate::core::session::{Session, SessionError};
use crate::core::task_executor;
use crate::models::{DispatchReport, ExecutedTask};
use thiserror::Error;

/// Errors that abort a dispatch.
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Switching environment, applying roles or loading blueprints failed.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The host list could not be resolved.
    #[error(transparent)]
    Resolver(#[from] ResolverError),
    /// A qualified task names no loaded task.
    #[error("Task '{0}' not found.")]
    UnknownTask(String),
    /// A task returned an error on one host.
    #[error("Task '{task}' failed on {host}: {message}")]
    TaskFailed {
        task: String,
        host: String,
        message: String,
    },
}

/// Result alias for dispatching.
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Runs `tasks` in `environment`.
///
/// `roles` of `None` activates every role declared by the environment.
/// Roles are validated and applied before any task runs.
pub fn dispatch(
    session: &mut Session,
    environment: &str,
    roles: Option<&[String]>,
    tasks: &[String],
) -> DispatchResult<DispatchReport> {
    prepare(session, environment, roles)?;
    execute(session, tasks)
}

/// Switches environment, activates roles and reloads blueprints.
pub fn prepare(session: &mut Session, environment: &str, roles: Option<&[String]>) -> DispatchResult<()> {
    log::debug!("Preparing environment '{}' with roles {:?}", environment, roles);
    // Roles of a previous target may not exist in the new environment.
    session.set_roles(&[])?;
    session.switch_environment(environment)?;

    let roles = match roles {
        Some(roles) => roles.to_vec(),
        None => session
            .environment()
            .role_names()
            .map_err(SessionError::from)?,
    };
    session.set_roles(&roles)?;
    // Blueprint lists may differ once roles are final.
    session.refresh_blueprints()?;
    Ok(())
}

/// Runs each task token against the prepared session.
///
/// `blueprint.task` runs that one task. A bare name fans out to every active
/// blueprint declaring it; the others are skipped with a warning.
pub fn execute(session: &Session, tasks: &[String]) -> DispatchResult<DispatchReport> {
    let hosts = config_resolver::resolve_list(session.tree(), KEY_HOSTS)?;
    let mut report = DispatchReport::default();

    for token in tasks {
        let mut plan: Vec<(&BlueprintEntry, &TaskDescriptor)> = Vec::new();

        if token.contains('.') {
            let found = session
                .registry()
                .resolve_task(token)
                .ok_or_else(|| DispatchError::UnknownTask(token.clone()))?;
            plan.push(found);
        } else {
            for entry in session.active_blueprints() {
                match entry.task(token) {
                    Some(task) => plan.push((entry, task)),
                    None => {
                        let warning = format!("Blueprint '{}' has no task '{}', skipping.", entry.name, token);
                        commons::warn(&warning);
                        report.warnings.push(warning);
                    }
                }
            }
            if plan.is_empty() {
                let warning = format!("No blueprint provides task '{}'.", token);
                commons::warn(&warning);
                report.warnings.push(warning);
            }
        }

        for (entry, task) in plan {
            run_on_hosts(session, entry, task, &hosts, &mut report)?;
        }
    }

    Ok(report)
}

fn run_on_hosts(
    session: &Session,
    entry: &BlueprintEntry,
    task: &TaskDescriptor,
    hosts: &[String],
    report: &mut DispatchReport,
) -> DispatchResult<()> {
    let qualified = format!("{}.{}", entry.name, task.name);
    let targets: Vec<Option<&str>> = if hosts.is_empty() {
        vec![None]
    } else {
        hosts.iter().map(|h| Some(h.as_str())).collect()
    };

    for host in targets {
        let ctx = session.task_context(entry, host);
        task_executor::execute_task(task, &ctx).map_err(|e| DispatchError::TaskFailed {
            task: qualified.clone(),
            host: host.unwrap_or("<no host>").to_string(),
            message: format!("{:#}", e),
        })?;
        report.executed.push(ExecutedTask {
            task: qualified.clone(),
            host: host.map(str::to_string),
        });
    }
    Ok(())
}
