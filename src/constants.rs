// src/constants.rs

/// The name of the deployment configuration file.
pub const CONFIG_FILENAME: &str = "rigger.toml";

/// The name of the per-user configuration directory (in ~/.config/).
pub const CONFIG_DIR_NAME: &str = "rigger";

/// The environment activated when none is requested.
pub const DEFAULT_ENVIRONMENT: &str = "default";

/// Reserved name; it used to hold the pre-overlay snapshot and may not name an environment.
pub const SNAPSHOT_NAME: &str = "_current";

/// Directory (under the deploy root and under each blueprint) holding templates.
pub const TEMPLATES_DIR: &str = "templates";

/// Template files never uploaded.
pub const IGNORED_FILES: &[&str] = &[".DS_Store"];

/// Suffix marking a template that is copied byte-for-byte instead of rendered.
pub const RAW_EXTENSION: &str = ".__raw__";

/// Suffix of the remote checksum sidecar written after every successful sync.
pub const CHECKSUM_EXTENSION: &str = ".md5";

/// User that owns uploaded files and runs sudo commands when nothing else is configured.
pub const DEFAULT_SUDO_USER: &str = "root";

// MARK: Well-known configuration keys

/// Table of named environments.
pub const KEY_STATES: &str = "states";
/// Table of role overlays.
pub const KEY_ROLEDEFS: &str = "roledefs";
/// Merge role overlays deeply instead of replacing keys.
pub const KEY_MERGE_STATES: &str = "merge_states";
/// Blueprint packages enabled for the active configuration.
pub const KEY_BLUEPRINTS: &str = "blueprints";
/// Hosts tasks run against.
pub const KEY_HOSTS: &str = "hosts";
/// SSH login user.
pub const KEY_USER: &str = "user";
/// Default sudo target user.
pub const KEY_SUDO_USER: &str = "sudo_user";
/// Run every command through sudo.
pub const KEY_USE_SUDO: &str = "use_sudo";
/// Environment exposed to templates as `env`.
pub const KEY_SHELL_ENV: &str = "shell_env";
/// Per-blueprint settings.
pub const KEY_SETTINGS: &str = "settings";
/// Forward the SSH agent to hosts.
pub const KEY_FORWARD_AGENT: &str = "forward_agent";
/// Declarative blueprint packages.
pub const KEY_CATALOG: &str = "catalog";
