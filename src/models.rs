// src/models.rs

use serde::Deserialize;
use toml::Table;

// --- Remote execution ---

/// How a single remote command is run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOptions {
    /// Run through `sudo`.
    pub sudo: bool,
    /// Target user for `sudo -u`. `None` keeps sudo's own default (root).
    pub user: Option<String>,
    /// Request a pseudo terminal.
    pub pty: bool,
    /// Fold stderr into stdout.
    pub combine_stderr: bool,
}

impl ExecOptions {
    /// Options for a sudo run as `user`.
    pub fn sudo_as(user: Option<&str>) -> Self {
        Self {
            sudo: true,
            user: user.map(str::to_string),
            ..Default::default()
        }
    }
}

/// Result of a remote command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecOutput {
    /// Process exit code, 255 when killed by a signal.
    pub exit_code: i32,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl ExecOutput {
    /// Whether the command exited with code 0.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// --- Dispatch results ---

/// One task invocation that completed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutedTask {
    /// `blueprint.task`
    pub task: String,
    /// Host the task ran on, `None` when no hosts are configured.
    pub host: Option<String>,
}

/// What a dispatch call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Completed task runs, in order.
    pub executed: Vec<ExecutedTask>,
    /// Warnings printed during the dispatch.
    pub warnings: Vec<String>,
}

impl DispatchReport {
    /// Names of the executed tasks, in execution order, one per host.
    pub fn executed_tasks(&self) -> Vec<&str> {
        self.executed.iter().map(|e| e.task.as_str()).collect()
    }

    /// Appends the runs and warnings of `other`.
    pub fn extend(&mut self, other: Self) {
        self.executed.extend(other.executed);
        self.warnings.extend(other.warnings);
    }
}

// --- Blueprint catalog (as declared in rigger.toml) ---

/// A `[catalog.<package>]` table.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
pub struct CatalogEntry {
    /// One-paragraph description shown by `help`.
    #[serde(default)]
    pub doc: String,
    /// Directory holding the blueprint's default templates.
    pub templates: Option<String>,
    /// Tasks in declaration order.
    #[serde(default)]
    pub tasks: Vec<TaskSpec>,
}

/// A `[[catalog.<package>.tasks]]` entry.
#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields)]
pub struct TaskSpec {
    /// Task name, unique within the package.
    pub name: String,
    /// Task description shown by `help` and `list`.
    #[serde(default)]
    pub doc: String,
    /// Steps run in order; the first failure aborts the task.
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A declarative task step.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Step {
    /// Render and sync templates.
    Upload { upload: UploadStep },
    /// Run a command through sudo, optionally as `user`.
    Sudo { sudo: String, user: Option<String> },
    /// Run a command as the login user.
    Run { run: String },
}

/// Arguments of an `upload` step.
#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct UploadStep {
    /// Template name or directory prefix, relative to the search path.
    pub template: String,
    /// Remote file, or directory when it ends in `/`.
    pub destination: String,
    /// Owner of the uploaded files, root by default.
    pub owner: Option<String>,
    /// Group of the uploaded files, the owner by default.
    pub group: Option<String>,
    /// Extra template variables.
    #[serde(default)]
    pub context: Table,
}
