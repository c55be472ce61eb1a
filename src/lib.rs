// src/lib.rs

//! Deployment automation over SSH: layered environment/role configuration,
//! blueprint task dispatch and checksum-verified template synchronization.

/// Command-line surface: argument parsing, token grammar and builtins.
pub mod cli;
/// File names, reserved names and configuration keys.
pub mod constants;
/// Configuration, blueprints, dispatch and template synchronization.
pub mod core;
/// Plain data shared across layers.
pub mod models;
/// The active environment and its role overlays.
pub mod state;
/// Adapters for remote hosts, templates and prompts.
pub mod system;
