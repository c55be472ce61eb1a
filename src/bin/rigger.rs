// src/bin/rigger.rs

//! Command-line entry point: loads the configuration and runs the requested tokens.

use anyhow::Result;
use clap::Parser;
use colored::*;
use rigger::{
    cli::{Cli, dispatcher},
    constants::{KEY_FORWARD_AGENT, KEY_USER},
    core::{
        config_loader::{self, LoadedConfig},
        config_resolver,
        session::{Services, Session},
    },
    system::{
        executor::{LocalExecutor, RemoteExecutor, SshExecutor},
        prompt::{ConflictAnswer, ConflictPrompt, DialoguerPrompt, FixedAnswer},
    },
};

/// The main entry point of the `rigger` application.
/// It sets up logging, parses arguments, runs the command line and
/// performs centralized error handling.
fn main() {
    env_logger::init();

    if let Err(e) = run_cli(Cli::parse()) {
        eprintln!("\n{}: {:#}", "Error".red().bold(), e);
        std::process::exit(1);
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    log::debug!("CLI args parsed: {:?}", cli);

    let path = config_loader::find_config(cli.config.as_deref())?;
    let config = config_loader::load(&path)?;
    let services = build_services(&cli, &config)?;
    let mut session = Session::from_config(config, services);

    let batches = dispatcher::parse_tokens(&cli.tokens, cli.roles.as_deref())?;
    let report = dispatcher::run(&mut session, &batches)?;

    if !report.executed.is_empty() {
        let summary = format!(
            "{} task run(s), {} warning(s)",
            report.executed.len(),
            report.warnings.len()
        );
        println!("\n{}{}", "Done: ".green(), summary.yellow());
    }
    Ok(())
}

/// Picks the executor and conflict prompt from the flags and configuration.
fn build_services(cli: &Cli, config: &LoadedConfig) -> Result<Services> {
    let executor: Box<dyn RemoteExecutor> = if cli.local {
        Box::new(LocalExecutor)
    } else {
        let user = config_resolver::resolve_str(&config.tree, KEY_USER)?;
        let forward_agent = config_resolver::resolve_bool(&config.tree, KEY_FORWARD_AGENT, true)?;
        Box::new(SshExecutor::new(user, forward_agent))
    };
    let prompt: Box<dyn ConflictPrompt> = if cli.yes {
        Box::new(FixedAnswer(ConflictAnswer::Overwrite))
    } else {
        Box::new(DialoguerPrompt)
    };
    Ok(Services { executor, prompt })
}
