// src/cli/handlers/mod.rs

// Builtin commands reachable as `command` or `command:argument`.

/// Helpers shared by the builtins.
pub mod commons;
/// `help:<blueprint>`
pub mod help;
/// `init:<blueprint>`
pub mod init;
/// `list`
pub mod list;
