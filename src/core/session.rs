// src/core/session.rs

use crate::constants::KEY_BLUEPRINTS;
use crate::core::blueprint::BlueprintCatalog;
use crate::core::blueprint_registry::{BlueprintEntry, BlueprintRegistry, RegistryError, RegistryUpdate};
use crate::core::config_loader::LoadedConfig;
use crate::core::config_resolver::{self, ResolverError};
use crate::core::task_context::TaskContext;
use crate::state::{Environment, StateError};
use crate::system::executor::RemoteExecutor;
use crate::system::prompt::ConflictPrompt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::Table;

/// Errors raised by session state transitions.
#[derive(Error, Debug)]
pub enum SessionError {
    /// The environment or role change was rejected.
    #[error(transparent)]
    State(#[from] StateError),
    /// Blueprint discovery failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The blueprint list could not be resolved.
    #[error(transparent)]
    Resolver(#[from] ResolverError),
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

/// The capabilities tasks reach the outside world through.
pub struct Services {
    /// Runs commands on hosts.
    pub executor: Box<dyn RemoteExecutor>,
    /// Resolves template conflicts.
    pub prompt: Box<dyn ConflictPrompt>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Services { .. }")
    }
}

/// Everything a deployment run works on: the active environment/role
/// state, the blueprint catalog and registry, and the injected services.
#[derive(Debug)]
pub struct Session {
    environment: Environment,
    catalog: BlueprintCatalog,
    registry: BlueprintRegistry,
    /// Blueprint names from the latest discovery, in configuration order.
    active: Vec<String>,
    services: Services,
    deploy_root: PathBuf,
}

impl Session {
    /// A session on `tree` as loaded, before any environment switch.
    pub fn new(tree: Table, catalog: BlueprintCatalog, services: Services, deploy_root: PathBuf) -> Self {
        Self {
            environment: Environment::new(tree),
            catalog,
            registry: BlueprintRegistry::new(),
            active: Vec::new(),
            services,
            deploy_root,
        }
    }

    /// A session on a loaded configuration file.
    pub fn from_config(config: LoadedConfig, services: Services) -> Self {
        Self::new(config.tree, config.catalog, services, config.deploy_root)
    }

    /// The environment and role state.
    pub fn environment(&self) -> &Environment {
        &self.environment
    }

    /// The effective configuration tree.
    pub fn tree(&self) -> &Table {
        self.environment.tree()
    }

    /// Blueprints loaded so far.
    pub fn registry(&self) -> &BlueprintRegistry {
        &self.registry
    }

    /// Directory holding `rigger.toml` and user templates.
    pub fn deploy_root(&self) -> &Path {
        &self.deploy_root
    }

    // --- State transitions ---

    /// Switches environment and reloads blueprints for it.
    pub fn switch_environment(&mut self, name: &str) -> SessionResult<RegistryUpdate> {
        self.environment.switch_environment(name)?;
        self.refresh_blueprints()
    }

    /// Activates `roles` (applying their overlays) and reloads blueprints.
    pub fn set_roles(&mut self, roles: &[String]) -> SessionResult<RegistryUpdate> {
        self.environment.set_roles(roles)?;
        self.refresh_blueprints()
    }

    /// Discovers the packages named by `blueprints` in the active configuration.
    pub fn refresh_blueprints(&mut self) -> SessionResult<RegistryUpdate> {
        let packages = config_resolver::resolve_list(self.environment.tree(), KEY_BLUEPRINTS)?;
        let update = self.registry.discover(&self.catalog, &packages)?;
        self.active = packages
            .iter()
            .map(|p| crate::core::blueprint::short_name(p).to_string())
            .collect();
        self.active.dedup();
        Ok(update)
    }

    /// Blueprints enabled by the active configuration, in registry order.
    pub fn active_blueprints(&self) -> impl Iterator<Item = &BlueprintEntry> {
        self.registry
            .entries()
            .iter()
            .filter(|entry| self.active.contains(&entry.name))
    }

    /// Context for running a task of `blueprint` on `host`.
    pub fn task_context<'s>(&'s self, blueprint: &'s BlueprintEntry, host: Option<&'s str>) -> TaskContext<'s> {
        TaskContext::new(
            blueprint,
            self.environment.tree(),
            host,
            self.environment.roles(),
            &self.deploy_root,
            self.services.executor.as_ref(),
            self.services.prompt.as_ref(),
        )
    }
}
