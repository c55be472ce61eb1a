// src/system/executor.rs

use crate::models::{ExecOptions, ExecOutput};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};
use thiserror::Error;
use walkdir::WalkDir;

/// Errors raised while running remote or local commands.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// A remote command was issued without a host.
    #[error("No host given for command '{0}'.")]
    NoHost(String),
    /// The command could not be quoted for the remote shell.
    #[error("Command could not be quoted: {0}")]
    CommandQuote(String),
    /// The process could not be spawned.
    #[error("Command '{0}' could not be executed: {1}")]
    CommandFailed(String, std::io::Error),
    /// A checked command exited with a non-zero code.
    #[error("Command '{command}' exited with code {exit_code}: {stderr}")]
    NonZeroExit {
        command: String,
        exit_code: i32,
        stderr: String,
    },
    /// The command wrote output that is not UTF-8.
    #[error("Command '{command}' produced output that was not valid UTF-8")]
    InvalidUtf8Output {
        command: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
    /// Copying a directory to the host failed.
    #[error("Upload of '{local}' to '{remote}' failed: {reason}")]
    UploadFailed {
        local: String,
        remote: String,
        reason: String,
    },
}

/// Result alias for command execution.
pub type ExecResult<T> = Result<T, ExecutionError>;

/// Runs shell commands on a host and copies directories to it.
///
/// `host` is `None` when the configuration names no hosts.
pub trait RemoteExecutor {
    fn execute(&self, host: Option<&str>, command: &str, options: &ExecOptions) -> ExecResult<ExecOutput>;

    /// Copies the contents of `local_dir` into the existing `remote_dir`.
    fn put_dir(&self, host: Option<&str>, local_dir: &Path, remote_dir: &str, use_sudo: bool) -> ExecResult<()>;
}

// --- Command wrapping ---

fn quote(text: &str) -> ExecResult<String> {
    shlex::try_quote(text)
        .map(|q| q.into_owned())
        .map_err(|_| ExecutionError::CommandQuote(text.to_string()))
}

/// Wraps `command` in a login shell, going through sudo when requested.
///
/// The agent socket is forwarded to the sudo user through `SSH_AUTH_SOCK`.
pub fn wrap_command(command: &str, options: &ExecOptions) -> ExecResult<String> {
    let shell = format!("/bin/bash -l -c {}", quote(command)?);
    if !options.sudo {
        return Ok(shell);
    }
    let user = match &options.user {
        Some(user) => format!("-u {} ", quote(user)?),
        None => String::new(),
    };
    Ok(format!(
        "sudo -S -E -H -p 'sudo password:' {}SSH_AUTH_SOCK=$SSH_AUTH_SOCK {}",
        user, shell
    ))
}

fn capture(command_line: &str, mut command: StdCommand) -> ExecResult<ExecOutput> {
    let output = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|e| ExecutionError::CommandFailed(command_line.to_string(), e))?;

    let stdout = String::from_utf8(output.stdout).map_err(|e| ExecutionError::InvalidUtf8Output {
        command: command_line.to_string(),
        source: e,
    })?;
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    Ok(ExecOutput {
        // Killed by a signal: report the conventional shell code.
        exit_code: output.status.code().unwrap_or(255),
        stdout,
        stderr,
    })
}

// MARK: SSH

/// Executes commands through the system `ssh` client.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor {
    /// Login user; `None` leaves it to the ssh configuration.
    pub user: Option<String>,
    /// SSH port; `None` leaves it to the ssh configuration.
    pub port: Option<u16>,
    /// Pass `-A` to forward the SSH agent.
    pub forward_agent: bool,
}

impl SshExecutor {
    /// Executor logging in as `user`, on the default port.
    pub fn new(user: Option<String>, forward_agent: bool) -> Self {
        Self {
            user,
            port: None,
            forward_agent,
        }
    }

    fn destination(&self, host: &str) -> String {
        // A host may carry its own `user@`.
        match &self.user {
            Some(user) if !host.contains('@') => format!("{}@{}", user, host),
            _ => host.to_string(),
        }
    }

    fn ssh(&self, host: &str, pty: bool) -> StdCommand {
        let mut command = StdCommand::new("ssh");
        if self.forward_agent {
            command.arg("-A");
        }
        if pty {
            command.arg("-tt");
        }
        if let Some(port) = self.port {
            command.arg("-p").arg(port.to_string());
        }
        command.arg(self.destination(host)).arg("--");
        command
    }
}

impl RemoteExecutor for SshExecutor {
    fn execute(&self, host: Option<&str>, command: &str, options: &ExecOptions) -> ExecResult<ExecOutput> {
        let host = host.ok_or_else(|| ExecutionError::NoHost(command.to_string()))?;
        let mut remote = wrap_command(command, options)?;
        if options.combine_stderr {
            remote.push_str(" 2>&1");
        }
        log::trace!("[{}] {}", host, remote);

        let mut ssh = self.ssh(host, options.pty);
        ssh.arg(&remote);
        capture(command, ssh)
    }

    fn put_dir(&self, host: Option<&str>, local_dir: &Path, remote_dir: &str, use_sudo: bool) -> ExecResult<()> {
        let host = host.ok_or_else(|| ExecutionError::NoHost(format!("put {}", remote_dir)))?;
        let upload_failed = |reason: String| ExecutionError::UploadFailed {
            local: local_dir.display().to_string(),
            remote: remote_dir.to_string(),
            reason,
        };

        // tar on both ends keeps dotfiles and directory structure intact.
        let mut tar = StdCommand::new("tar")
            .arg("-C")
            .arg(dunce::simplified(local_dir))
            .args(["-cf", "-", "."])
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| upload_failed(e.to_string()))?;
        let archive = tar
            .stdout
            .take()
            .ok_or_else(|| upload_failed("tar produced no output stream".to_string()))?;

        let extract = format!("tar -C {} -xf -", quote(remote_dir)?);
        let options = ExecOptions {
            sudo: use_sudo,
            ..Default::default()
        };
        let remote = wrap_command(&extract, &options)?;
        log::trace!("[{}] {}", host, remote);

        let status = self
            .ssh(host, false)
            .arg(&remote)
            .stdin(Stdio::from(archive))
            .stdout(Stdio::null())
            .status()
            .map_err(|e| upload_failed(e.to_string()))?;
        let tar_status = tar.wait().map_err(|e| upload_failed(e.to_string()))?;

        if !tar_status.success() {
            return Err(upload_failed(format!("local tar exited with {}", tar_status)));
        }
        if !status.success() {
            return Err(upload_failed(format!("remote tar exited with {}", status)));
        }
        Ok(())
    }
}

// MARK: Local

/// Executes commands on this machine with `sh -c`. Hosts are ignored.
#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl RemoteExecutor for LocalExecutor {
    fn execute(&self, _host: Option<&str>, command: &str, options: &ExecOptions) -> ExecResult<ExecOutput> {
        let mut line = command.to_string();
        if options.combine_stderr {
            line.push_str(" 2>&1");
        }

        let process = if options.sudo {
            let mut sudo = StdCommand::new("sudo");
            if let Some(user) = &options.user {
                sudo.arg("-u").arg(user);
            }
            sudo.args(["sh", "-c", &line]);
            sudo
        } else {
            let mut sh = StdCommand::new("sh");
            sh.args(["-c", &line]);
            sh
        };
        log::trace!("[local] {}", line);
        capture(command, process)
    }

    fn put_dir(&self, _host: Option<&str>, local_dir: &Path, remote_dir: &str, _use_sudo: bool) -> ExecResult<()> {
        let target = PathBuf::from(remote_dir);
        let upload_failed = |reason: String| ExecutionError::UploadFailed {
            local: local_dir.display().to_string(),
            remote: remote_dir.to_string(),
            reason,
        };

        for entry in WalkDir::new(local_dir).min_depth(1) {
            let entry = entry.map_err(|e| upload_failed(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(local_dir)
                .map_err(|e| upload_failed(e.to_string()))?;
            let destination = target.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&destination).map_err(|e| upload_failed(e.to_string()))?;
            } else {
                if let Some(parent) = destination.parent() {
                    fs::create_dir_all(parent).map_err(|e| upload_failed(e.to_string()))?;
                }
                fs::copy(entry.path(), &destination).map_err(|e| upload_failed(e.to_string()))?;
            }
        }
        Ok(())
    }
}
