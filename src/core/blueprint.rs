// src/core/blueprint.rs

use crate::core::task_context::TaskContext;
use crate::models::{CatalogEntry, Step};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// A task implemented in Rust.
pub type NativeTask = Arc<dyn Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync>;

/// How a task does its work.
#[derive(Clone)]
pub enum TaskAction {
    /// A Rust closure.
    Native(NativeTask),
    /// Declarative steps from the catalog.
    Steps(Vec<Step>),
}

impl fmt::Debug for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Native(_) => f.write_str("Native(..)"),
            Self::Steps(steps) => f.debug_tuple("Steps").field(steps).finish(),
        }
    }
}

/// A named task of a blueprint.
#[derive(Debug, Clone)]
pub struct TaskDescriptor {
    /// Name inside the blueprint.
    pub name: String,
    /// Description shown by `help` and `list`.
    pub doc: String,
    /// What the task runs.
    pub action: TaskAction,
}

impl TaskDescriptor {
    /// A task backed by a closure.
    pub fn native<F>(name: &str, doc: &str, action: F) -> Self
    where
        F: Fn(&TaskContext<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            doc: doc.to_string(),
            action: TaskAction::Native(Arc::new(action)),
        }
    }

    /// A task backed by declarative steps.
    pub fn steps(name: &str, doc: &str, steps: Vec<Step>) -> Self {
        Self {
            name: name.to_string(),
            doc: doc.to_string(),
            action: TaskAction::Steps(steps),
        }
    }
}

/// Static description of a blueprint package.
#[derive(Debug, Clone)]
pub struct BlueprintDescriptor {
    /// e.g. `web` or `blueprints.web`
    pub package: String,
    /// Description shown by `help`.
    pub doc: String,
    /// Directory with the blueprint's default templates.
    pub template_root: Option<PathBuf>,
    /// Tasks in declaration order.
    pub tasks: Vec<TaskDescriptor>,
}

impl BlueprintDescriptor {
    /// A descriptor with no doc, templates or tasks.
    pub fn new(package: &str) -> Self {
        Self {
            package: package.to_string(),
            doc: String::new(),
            template_root: None,
            tasks: Vec::new(),
        }
    }

    /// Sets the description.
    pub fn with_doc(mut self, doc: &str) -> Self {
        self.doc = doc.to_string();
        self
    }

    /// Adds a task.
    pub fn with_task(mut self, task: TaskDescriptor) -> Self {
        self.tasks.push(task);
        self
    }

    /// Builds a descriptor from a `[catalog.<package>]` table.
    /// Relative template roots are taken from `base_dir`.
    pub fn from_catalog(package: &str, entry: CatalogEntry, base_dir: Option<&std::path::Path>) -> Self {
        let template_root = entry.templates.map(|raw| {
            let expanded = shellexpand::tilde(&raw).into_owned();
            let path = PathBuf::from(expanded);
            match base_dir {
                Some(base) if path.is_relative() => base.join(path),
                _ => path,
            }
        });
        Self {
            package: package.to_string(),
            doc: entry.doc,
            template_root,
            tasks: entry
                .tasks
                .into_iter()
                .map(|spec| TaskDescriptor::steps(&spec.name, &spec.doc, spec.steps))
                .collect(),
        }
    }

    /// Last dot-separated segment of the package name.
    pub fn short_name(&self) -> &str {
        short_name(&self.package)
    }

    /// The task named `name`.
    pub fn task(&self, name: &str) -> Option<&TaskDescriptor> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// Last dotted segment of `package`.
pub fn short_name(package: &str) -> &str {
    package.rsplit('.').next().unwrap_or(package)
}

/// Blueprint packages known to the process, keyed by package name.
#[derive(Debug, Clone, Default)]
pub struct BlueprintCatalog {
    descriptors: Vec<Arc<BlueprintDescriptor>>,
}

impl BlueprintCatalog {
    /// An empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a descriptor, replacing any with the same package name.
    pub fn register(&mut self, descriptor: BlueprintDescriptor) {
        let descriptor = Arc::new(descriptor);
        match self
            .descriptors
            .iter_mut()
            .find(|d| d.package == descriptor.package)
        {
            Some(existing) => *existing = descriptor,
            None => self.descriptors.push(descriptor),
        }
    }

    /// The descriptor registered for `package`.
    pub fn get(&self, package: &str) -> Option<Arc<BlueprintDescriptor>> {
        self.descriptors.iter().find(|d| d.package == package).cloned()
    }

    /// Registered package names, in registration order.
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.descriptors.iter().map(|d| d.package.as_str())
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
