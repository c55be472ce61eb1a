// src/core/operations.rs

use crate::constants::{KEY_SUDO_USER, KEY_USE_SUDO, KEY_USER};
use crate::core::config_resolver::{self, ResolverResult};
use crate::models::{ExecOptions, ExecOutput};
use crate::system::executor::{ExecResult, ExecutionError, RemoteExecutor};
use toml::Table;

/// Per-call options for [`Operations::run`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Run through sudo.
    pub sudo: bool,
    /// Run as this user (implies sudo).
    pub user: Option<String>,
    /// Request a pseudo terminal.
    pub pty: bool,
    /// Fold stderr into stdout.
    pub combine_stderr: bool,
}

impl RunOptions {
    /// Sudo as `user`, or as the configured sudo user when `None`.
    pub fn sudo(user: Option<&str>) -> Self {
        Self {
            sudo: true,
            user: user.map(str::to_string),
            ..Default::default()
        }
    }
}

/// Remote command execution against one host, following the active configuration's sudo settings.
pub struct Operations<'a> {
    executor: &'a dyn RemoteExecutor,
    host: Option<&'a str>,
    login_user: Option<String>,
    sudo_user: Option<String>,
    use_sudo: bool,
}

impl std::fmt::Debug for Operations<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operations")
            .field("host", &self.host)
            .field("login_user", &self.login_user)
            .field("sudo_user", &self.sudo_user)
            .field("use_sudo", &self.use_sudo)
            .finish()
    }
}

impl<'a> Operations<'a> {
    /// Reads `user`, `sudo_user` and `use_sudo` from `tree`.
    pub fn new(executor: &'a dyn RemoteExecutor, tree: &Table, host: Option<&'a str>) -> ResolverResult<Self> {
        Ok(Self {
            executor,
            host,
            login_user: config_resolver::resolve_str(tree, KEY_USER)?,
            sudo_user: config_resolver::resolve_str(tree, KEY_SUDO_USER)?,
            use_sudo: config_resolver::resolve_bool(tree, KEY_USE_SUDO, false)?,
        })
    }

    /// Runs `command` and fails on a non-zero exit code.
    pub fn run(&self, command: &str, options: &RunOptions) -> ExecResult<ExecOutput> {
        let output = self.run_quiet(command, options)?;
        if !output.success() {
            return Err(ExecutionError::NonZeroExit {
                command: command.to_string(),
                exit_code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    /// Runs `command`; a non-zero exit code is returned, not raised.
    ///
    /// With sudo (requested, implied by a user, or `use_sudo` in the
    /// configuration) the target user is first given the forwarded agent
    /// socket, then the command runs through sudo as that user.
    pub fn run_quiet(&self, command: &str, options: &RunOptions) -> ExecResult<ExecOutput> {
        let use_sudo = options.sudo || options.user.is_some() || self.use_sudo;
        if !use_sudo {
            return self.executor.execute(
                self.host,
                command,
                &ExecOptions {
                    sudo: false,
                    user: None,
                    pty: options.pty,
                    combine_stderr: options.combine_stderr,
                },
            );
        }

        let user = options
            .user
            .clone()
            .or_else(|| self.sudo_user.clone())
            .or_else(|| self.login_user.clone());

        if let Some(user) = &user {
            let grant = format!("chown -R {}: $(dirname $SSH_AUTH_SOCK)", user);
            let granted = self
                .executor
                .execute(self.host, &grant, &ExecOptions::sudo_as(Some("root")))?;
            if !granted.success() {
                log::debug!("Could not hand the agent socket to '{}': {}", user, granted.stderr.trim());
            }
        }

        // Sudo to the login user is a plain sudo.
        let user = user.filter(|u| Some(u) != self.login_user.as_ref());

        self.executor.execute(
            self.host,
            command,
            &ExecOptions {
                sudo: true,
                user,
                pty: options.pty,
                combine_stderr: options.combine_stderr,
            },
        )
    }

    /// Copies `local_dir` into `remote_dir` on the host.
    pub fn put_dir(&self, local_dir: &std::path::Path, remote_dir: &str, use_sudo: bool) -> ExecResult<()> {
        self.executor.put_dir(self.host, local_dir, remote_dir, use_sudo)
    }
}
