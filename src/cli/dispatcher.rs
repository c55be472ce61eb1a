// src/cli/dispatcher.rs

use anyhow::{Result, anyhow, bail};
use colored::Colorize;

use crate::{
    cli::handlers,
    constants::DEFAULT_ENVIRONMENT,
    core::{blueprint_registry::RegistryError, dispatcher, session::Session},
    models::DispatchReport,
};

// --- Command Definition and Registry ---

/// A builtin command, its aliases, and its handler.
/// Handlers receive the optional `command:argument` argument.
struct CommandDefinition {
    name: &'static str,
    aliases: &'static [&'static str],
    handler: fn(Option<&str>, &Session) -> Result<()>,
}

/// The single source of truth for all builtin commands.
static COMMAND_REGISTRY: &[CommandDefinition] = &[
    CommandDefinition {
        name: "help",
        aliases: &[],
        handler: handlers::help::handle,
    },
    CommandDefinition {
        name: "init",
        aliases: &[],
        handler: handlers::init::handle,
    },
    CommandDefinition {
        name: "list",
        aliases: &["ls"],
        handler: handlers::list::handle,
    },
];

/// Finds a command definition in the registry by its name or alias.
fn find_command(name: &str) -> Option<&'static CommandDefinition> {
    COMMAND_REGISTRY
        .iter()
        .find(|cmd| cmd.name == name || cmd.aliases.contains(&name))
}

// --- Token grammar ---

/// Environment and roles a group of tokens runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Environment name; `default` when the token names none.
    pub environment: String,
    /// `None` activates every role the environment declares.
    pub roles: Option<Vec<String>>,
}

impl Target {
    fn new(environment: &str, roles: Option<Vec<String>>) -> Self {
        Self {
            environment: environment.to_string(),
            roles,
        }
    }
}

/// One thing to run from the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    /// A task token, bare or `blueprint.task`.
    Task(String),
    /// A builtin command with its optional `:argument`.
    Builtin { command: String, argument: Option<String> },
}

/// Invocations sharing one target, in command-line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// Where the batch runs.
    pub target: Target,
    /// What the batch runs.
    pub items: Vec<Invocation>,
}

/// Parses `role@env` / `@env`. An empty environment means the default one.
fn parse_target(text: &str, default_roles: Option<&[String]>) -> Result<Target> {
    let (roles, environment) = text
        .split_once('@')
        .ok_or_else(|| anyhow!("Invalid target '{}', expected 'role@environment'.", text))?;
    let environment = if environment.is_empty() {
        DEFAULT_ENVIRONMENT
    } else {
        environment
    };
    let roles: Vec<String> = roles
        .split(',')
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
        .collect();
    let roles = if roles.is_empty() {
        default_roles.map(<[String]>::to_vec)
    } else {
        Some(roles)
    };
    Ok(Target::new(environment, roles))
}

fn parse_invocation(text: &str) -> Result<Invocation> {
    if text.is_empty() {
        bail!("Empty task name.");
    }
    match text.split_once(':') {
        Some((command, argument)) => {
            let definition =
                find_command(command).ok_or_else(|| anyhow!("Unknown command '{}' in '{}'.", command, text))?;
            Ok(Invocation::Builtin {
                command: definition.name.to_string(),
                argument: Some(argument.to_string()).filter(|a| !a.is_empty()),
            })
        }
        None => Ok(match find_command(text) {
            Some(definition) => Invocation::Builtin {
                command: definition.name.to_string(),
                argument: None,
            },
            None => Invocation::Task(text.to_string()),
        }),
    }
}

fn push(batches: &mut Vec<Batch>, target: &Target, item: Option<Invocation>) {
    match batches.last_mut() {
        Some(last) if last.target == *target => last.items.extend(item),
        _ => batches.push(Batch {
            target: target.clone(),
            items: item.into_iter().collect(),
        }),
    }
}

/// Groups command-line tokens by target.
///
/// `role@env` and `@env` set the target for the tokens after them;
/// `role@env:task` targets only that task. An empty command line lists
/// what is available.
pub fn parse_tokens(tokens: &[String], default_roles: Option<&[String]>) -> Result<Vec<Batch>> {
    let mut current = Target::new(DEFAULT_ENVIRONMENT, default_roles.map(<[String]>::to_vec));
    let mut batches = Vec::new();

    if tokens.is_empty() {
        push(&mut batches, &current, Some(Invocation::Builtin {
            command: "list".to_string(),
            argument: None,
        }));
        return Ok(batches);
    }

    for token in tokens {
        let token = token.trim();
        let head = token.split(':').next().unwrap_or(token);
        if head.contains('@') {
            let target = parse_target(head, default_roles)?;
            match token.get(head.len() + 1..) {
                Some(rest) => {
                    let item = parse_invocation(rest)?;
                    push(&mut batches, &target, Some(item));
                }
                None => {
                    push(&mut batches, &target, None);
                    current = target;
                }
            }
        } else {
            let item = parse_invocation(token)?;
            push(&mut batches, &current, Some(item));
        }
    }

    log::debug!("Parsed command line into {:?}", batches);
    Ok(batches)
}

// --- Execution ---

/// Runs every batch: prepare its target, then its invocations in order.
///
/// Builtins naming an unknown blueprint report the error and carry on.
pub fn run(session: &mut Session, batches: &[Batch]) -> Result<DispatchReport> {
    let mut report = DispatchReport::default();
    for batch in batches {
        dispatcher::prepare(session, &batch.target.environment, batch.target.roles.as_deref())?;

        for item in &batch.items {
            match item {
                Invocation::Task(name) => {
                    report.extend(dispatcher::execute(session, std::slice::from_ref(name))?);
                }
                Invocation::Builtin { command, argument } => {
                    let definition = find_command(command)
                        .ok_or_else(|| anyhow!("Unknown command '{}'.", command))?;
                    if let Err(e) = (definition.handler)(argument.as_deref(), session) {
                        if e.downcast_ref::<RegistryError>().is_none() && !is_usage_error(&e) {
                            return Err(e);
                        }
                        eprintln!("{}: {}", "Error".red().bold(), e);
                    }
                }
            }
        }
    }
    Ok(report)
}

fn is_usage_error(e: &anyhow::Error) -> bool {
    e.downcast_ref::<handlers::commons::UsageError>().is_some()
}
