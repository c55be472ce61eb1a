// src/core/blueprint_registry.rs

use crate::core::blueprint::{BlueprintCatalog, BlueprintDescriptor, TaskDescriptor, short_name};
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while loading or looking up blueprints.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// The catalog has no such package.
    #[error("Unknown blueprint package '{0}'.")]
    UnknownPackage(String),
    /// No loaded blueprint has this name.
    #[error("Unknown blueprint \"{0}\", using correct role?")]
    UnknownBlueprint(String),
}

/// Result alias for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// A task as exposed by a loaded blueprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskRoute {
    /// Name inside the blueprint, e.g. `deploy`.
    pub name: String,
    /// Dispatch path, e.g. `web.deploy`.
    pub qualified: String,
}

/// A discovered blueprint.
#[derive(Debug, Clone)]
pub struct BlueprintEntry {
    /// Short name, the last segment of the package.
    pub name: String,
    /// Full package name.
    pub package: String,
    /// Tasks with their dispatch paths.
    pub tasks: Vec<TaskRoute>,
    /// The descriptor the entry was loaded from.
    pub descriptor: Arc<BlueprintDescriptor>,
}

impl BlueprintEntry {
    fn new(descriptor: Arc<BlueprintDescriptor>) -> Self {
        let name = descriptor.short_name().to_string();
        // Top-level packages get their tasks namespaced under their own name.
        let namespaced = !descriptor.package.contains('.');
        let tasks = descriptor
            .tasks
            .iter()
            .map(|task| TaskRoute {
                name: task.name.clone(),
                qualified: if namespaced {
                    format!("{}.{}", name, task.name)
                } else {
                    task.name.clone()
                },
            })
            .collect();
        Self {
            name,
            package: descriptor.package.clone(),
            tasks,
            descriptor,
        }
    }

    /// The task named `name`, by its bare name.
    pub fn task(&self, name: &str) -> Option<&TaskDescriptor> {
        self.descriptor.task(name)
    }
}

/// Blueprints added or reloaded by one discovery pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryUpdate {
    /// Newly loaded blueprints.
    pub added: Vec<String>,
    /// Blueprints reloaded in place.
    pub replaced: Vec<String>,
}

/// Loaded blueprints keyed by short name, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct BlueprintRegistry {
    entries: Vec<BlueprintEntry>,
}

impl BlueprintRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads each package from the catalog. Reloading a blueprint replaces
    /// its entry in place; entries are never removed.
    pub fn discover(&mut self, catalog: &BlueprintCatalog, packages: &[String]) -> RegistryResult<RegistryUpdate> {
        // Resolve everything first so an unknown package leaves the registry untouched.
        let descriptors = packages
            .iter()
            .map(|package| {
                catalog
                    .get(package)
                    .ok_or_else(|| RegistryError::UnknownPackage(package.clone()))
            })
            .collect::<RegistryResult<Vec<_>>>()?;

        let mut update = RegistryUpdate::default();
        for descriptor in descriptors {
            let entry = BlueprintEntry::new(descriptor);
            log::debug!(
                "Loaded blueprint '{}' with tasks {:?}",
                entry.name,
                entry.tasks.iter().map(|t| &t.qualified).collect::<Vec<_>>()
            );
            match self.entries.iter_mut().find(|e| e.name == entry.name) {
                Some(existing) => {
                    update.replaced.push(entry.name.clone());
                    *existing = entry;
                }
                None => {
                    update.added.push(entry.name.clone());
                    self.entries.push(entry);
                }
            }
        }
        Ok(update)
    }

    /// The blueprint with short name `name`.
    pub fn lookup(&self, name: &str) -> Option<&BlueprintEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Like [`lookup`](Self::lookup), for user-facing requests.
    pub fn require(&self, name: &str) -> RegistryResult<&BlueprintEntry> {
        self.lookup(name)
            .ok_or_else(|| RegistryError::UnknownBlueprint(name.to_string()))
    }

    /// Loaded blueprints, in discovery order.
    pub fn entries(&self) -> &[BlueprintEntry] {
        &self.entries
    }

    /// Finds a task by dispatch path, or by `blueprint.task`.
    ///
    /// When several blueprints expose the same dispatch path the most
    /// recently discovered one wins.
    pub fn resolve_task(&self, token: &str) -> Option<(&BlueprintEntry, &TaskDescriptor)> {
        let by_path = self.entries.iter().rev().find_map(|entry| {
            entry
                .tasks
                .iter()
                .find(|route| route.qualified == token)
                .and_then(|route| entry.task(&route.name))
                .map(|task| (entry, task))
        });
        if by_path.is_some() {
            return by_path;
        }

        let (blueprint, task) = token.rsplit_once('.')?;
        let entry = self.lookup(short_name(blueprint))?;
        entry.task(task).map(|t| (entry, t))
    }
}
