// src/core/mod.rs

/// Static blueprint and task descriptors.
pub mod blueprint;
/// Blueprints loaded for the active configuration.
pub mod blueprint_registry;
/// Operator-facing output helpers.
pub mod commons;
/// Finding and parsing `rigger.toml`.
pub mod config_loader;
/// Dotted-path lookup and `$(...)` substitution.
pub mod config_resolver;
/// Runs tasks against an environment and its roles.
pub mod dispatcher;
/// Remote command execution with sudo handling.
pub mod operations;
/// Merging configuration tables.
pub mod overlay;
/// The context object a deployment run works on.
pub mod session;
/// Socket address parsing and formatting.
pub mod socket;
/// What a running task can reach.
pub mod task_context;
/// Runs native and step tasks.
pub mod task_executor;
/// Checksum-guarded template uploads.
pub mod template_sync;
