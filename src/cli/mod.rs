// src/cli/mod.rs

use clap::Parser;
use std::path::PathBuf;

/// Token parsing and batch execution.
pub mod dispatcher;
/// Builtin commands.
pub mod handlers;

/// rigger: deploy blueprints to environments and roles over SSH.
///
/// Tokens are task names (`deploy`, `web.deploy`), targets that apply to the
/// following tokens (`@prod`, `web@prod`), one-off targeted tasks
/// (`web@prod:deploy`) and builtins (`list`, `help:web`, `init:web`).
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    styles = clap::builder::Styles::styled()
        .header(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .usage(clap::builder::styling::AnsiColor::Yellow.on_default().bold())
        .literal(clap::builder::styling::AnsiColor::Cyan.on_default().bold())
        .placeholder(clap::builder::styling::AnsiColor::Green.on_default()),
)]
/// Parsed command line.
#[command(disable_help_subcommand = true)]
pub struct Cli {
    /// Configuration file (defaults to ./rigger.toml, then the user config dir).
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Roles to activate for targets that name none, comma separated.
    #[arg(short = 'R', long, value_name = "ROLES", value_delimiter = ',')]
    pub roles: Option<Vec<String>>,

    /// Run commands on this machine instead of over SSH.
    #[arg(long)]
    pub local: bool,

    /// Overwrite remotely changed files without asking.
    #[arg(short, long)]
    pub yes: bool,

    /// Targets, tasks and builtins, processed left to right.
    #[arg(value_name = "TOKENS")]
    pub tokens: Vec<String>,
}
