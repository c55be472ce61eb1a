// src/core/task_context.rs

use crate::constants::{KEY_HOSTS, KEY_SETTINGS, KEY_SHELL_ENV, TEMPLATES_DIR};
use crate::core::blueprint_registry::BlueprintEntry;
use crate::core::config_resolver::{self, ResolverResult};
use crate::core::operations::{Operations, RunOptions};
use crate::core::template_sync::TemplateSync;
use crate::models::ExecOutput;
use crate::system::executor::RemoteExecutor;
use crate::system::prompt::ConflictPrompt;
use crate::system::renderer::TeraRenderer;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use toml::{Table, Value};

/// What a running task sees: the blueprint it belongs to, the active
/// configuration, the host it runs against, and the remote services.
pub struct TaskContext<'a> {
    /// Blueprint the task belongs to.
    pub blueprint: &'a BlueprintEntry,
    /// The active configuration.
    pub tree: &'a Table,
    /// Host the task runs against, `None` when no hosts are configured.
    pub host: Option<&'a str>,
    /// Active roles.
    pub roles: &'a [String],
    /// Directory holding `rigger.toml` and user templates.
    pub deploy_root: &'a Path,
    executor: &'a dyn RemoteExecutor,
    prompt: &'a dyn ConflictPrompt,
}

impl std::fmt::Debug for TaskContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("blueprint", &self.blueprint.name)
            .field("host", &self.host)
            .field("roles", &self.roles)
            .finish()
    }
}

impl<'a> TaskContext<'a> {
    /// Bundles what one task run needs.
    pub fn new(
        blueprint: &'a BlueprintEntry,
        tree: &'a Table,
        host: Option<&'a str>,
        roles: &'a [String],
        deploy_root: &'a Path,
        executor: &'a dyn RemoteExecutor,
        prompt: &'a dyn ConflictPrompt,
    ) -> Self {
        Self {
            blueprint,
            tree,
            host,
            roles,
            deploy_root,
            executor,
            prompt,
        }
    }

    // --- Configuration ---

    /// Resolves any path in the active configuration.
    pub fn resolve(&self, path: &str) -> ResolverResult<Option<Value>> {
        config_resolver::resolve(self.tree, path, None)
    }

    /// Looks up `settings.<blueprint>.<key>`, falling back to `settings.<key>` and `<key>`.
    pub fn setting(&self, key: &str) -> ResolverResult<Option<Value>> {
        self.resolve(&self.settings_path(key))
    }

    fn settings_path(&self, key: &str) -> String {
        let prefix = format!("{}.{}", KEY_SETTINGS, self.blueprint.name);
        config_resolver::prefixed(&prefix, key)
    }

    /// All settings of this blueprint, expanded.
    pub fn settings(&self) -> ResolverResult<Table> {
        let path = format!("{}.{}", KEY_SETTINGS, self.blueprint.name);
        // Only an exact hit counts; fallback would hand back unrelated tables.
        let exact = self
            .tree
            .get(KEY_SETTINGS)
            .and_then(|s| s.get(&self.blueprint.name))
            .is_some();
        if !exact {
            return Ok(Table::new());
        }
        Ok(match self.resolve(&path)? {
            Some(Value::Table(table)) => table,
            _ => Table::new(),
        })
    }

    // --- Remote commands ---

    /// Command execution against this task's host.
    pub fn operations(&self) -> ResolverResult<Operations<'a>> {
        Operations::new(self.executor, self.tree, self.host)
    }

    /// Runs `command` after `$(...)` substitution against the active configuration.
    pub fn run(&self, command: &str) -> Result<ExecOutput> {
        self.run_with(command, &RunOptions::default())
    }

    /// Runs `command` through sudo, as `user` or the configured sudo user.
    pub fn sudo(&self, command: &str, user: Option<&str>) -> Result<ExecOutput> {
        self.run_with(command, &RunOptions::sudo(user))
    }

    fn run_with(&self, command: &str, options: &RunOptions) -> Result<ExecOutput> {
        let command = config_resolver::substitute(self.tree, command)?;
        log::debug!("[{}] {}", self.host.unwrap_or("local"), command);
        let output = self
            .operations()?
            .run(&command, options)
            .with_context(|| format!("Task '{}' failed", self.blueprint.name))?;
        if !output.stdout.is_empty() {
            print!("{}", output.stdout);
        }
        Ok(output)
    }

    // --- Templates ---

    /// Template roots for this blueprint, most specific first:
    /// `<deploy>/templates/<role>/<blueprint>`, `<deploy>/templates/<blueprint>`,
    /// then the blueprint's own templates.
    pub fn template_search_path(&self) -> Vec<PathBuf> {
        let user_templates = self.deploy_root.join(TEMPLATES_DIR);
        let mut path = Vec::new();
        if let Some(role) = self.roles.first() {
            path.push(user_templates.join(role).join(&self.blueprint.name));
        }
        path.push(user_templates.join(&self.blueprint.name));
        if let Some(root) = &self.blueprint.descriptor.template_root {
            path.push(root.clone());
        }
        path
    }

    /// A renderer over [`template_search_path`](Self::template_search_path).
    pub fn renderer(&self) -> TeraRenderer {
        TeraRenderer::new(self.template_search_path())
    }

    /// Renders and uploads templates as root.
    ///
    /// The context gains `hosts`, `env` (the `shell_env` table) and `settings`
    /// (this blueprint's settings). Returns the updated files.
    pub fn upload(
        &self,
        template: &str,
        destination: &str,
        context: Option<Table>,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> Result<Vec<String>> {
        let mut context = context.unwrap_or_default();
        let hosts = config_resolver::resolve_list(self.tree, KEY_HOSTS)?;
        context.insert(
            "hosts".to_string(),
            Value::Array(hosts.into_iter().map(Value::String).collect()),
        );
        let shell_env = match config_resolver::resolve(self.tree, KEY_SHELL_ENV, None)? {
            Some(Value::Table(env)) => env,
            _ => Table::new(),
        };
        context.insert("env".to_string(), Value::Table(shell_env));
        context.insert("settings".to_string(), Value::Table(self.settings()?));

        let destination = config_resolver::substitute(self.tree, destination)?;
        let renderer = self.renderer();
        let ops = self.operations()?;
        let sync = TemplateSync::new(&ops, &renderer, self.prompt);
        sync.sync(template, &destination, &context, owner, group)
            .with_context(|| format!("Upload of '{}' to '{}' failed", template, destination))
    }
}
