//! # Config Loader
//!
//! Locates and parses `rigger.toml`. The file becomes the configuration tree;
//! its `catalog` table is split off and turned into blueprint descriptors.
use crate::constants::{
    CONFIG_DIR_NAME, CONFIG_FILENAME, DEFAULT_ENVIRONMENT, DEFAULT_SUDO_USER, KEY_CATALOG, KEY_FORWARD_AGENT,
    KEY_MERGE_STATES, KEY_SUDO_USER, KEY_USE_SUDO,
};
use crate::core::blueprint::{BlueprintCatalog, BlueprintDescriptor};
use crate::models::CatalogEntry;
use crate::state::{Environment, StateResult};
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::{Table, Value};

/// Errors raised while finding or parsing the configuration.
#[derive(Error, Debug)]
pub enum LoadError {
    /// No configuration file at any candidate path.
    #[error("No configuration found. Looked for {0}.")]
    NotFound(String),
    /// The file could not be read.
    #[error("Could not read '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML.
    #[error("Invalid configuration in '{path}': {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// `catalog` is not a table.
    #[error("'catalog' must be a table of blueprint packages.")]
    InvalidCatalog,
    /// A catalog package does not match the expected shape.
    #[error("Invalid catalog entry '{package}': {source}")]
    InvalidEntry {
        package: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Result alias for configuration loading.
pub type LoadResult<T> = Result<T, LoadError>;

/// A parsed configuration file.
#[derive(Debug)]
pub struct LoadedConfig {
    /// The configuration tree, without the catalog.
    pub tree: Table,
    /// Blueprint packages declared under `catalog`.
    pub catalog: BlueprintCatalog,
    /// Directory holding the configuration file; user templates live below it.
    pub deploy_root: PathBuf,
    /// File the configuration was read from, `None` for in-memory sources.
    pub path: Option<PathBuf>,
}

/// A target token the CLI accepts, as shown by `list`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetInfo {
    /// Token as typed on the command line, e.g. `web@prod`.
    pub name: String,
    /// What the target selects.
    pub doc: String,
}

/// Finds the configuration file.
///
/// An explicit path must exist. Otherwise `./rigger.toml` is tried, then
/// `<config dir>/rigger/rigger.toml`.
pub fn find_config(explicit: Option<&Path>) -> LoadResult<PathBuf> {
    if let Some(path) = explicit {
        let expanded = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
        return if expanded.is_file() {
            Ok(expanded)
        } else {
            Err(LoadError::NotFound(format!("'{}'", expanded.display())))
        };
    }

    let mut candidates = vec![PathBuf::from(CONFIG_FILENAME)];
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join(CONFIG_DIR_NAME).join(CONFIG_FILENAME));
    }
    log::debug!("Looking for configuration in {:?}", candidates);

    candidates.iter().find(|c| c.is_file()).cloned().ok_or_else(|| {
        let looked = candidates
            .iter()
            .map(|c| format!("'{}'", c.display()))
            .collect::<Vec<_>>()
            .join(", ");
        LoadError::NotFound(looked)
    })
}

/// Reads and parses the configuration at `path`.
pub fn load(path: &Path) -> LoadResult<LoadedConfig> {
    let source = std::fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.display().to_string(),
        source: e,
    })?;
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let base_dir = dunce::canonicalize(parent).map_err(|e| LoadError::Io {
        path: parent.display().to_string(),
        source: e,
    })?;

    let mut config = parse(&source, &base_dir).map_err(|e| match e {
        LoadError::Parse { source, .. } => LoadError::Parse {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })?;
    config.path = Some(path.to_path_buf());
    log::debug!("Loaded configuration from '{}'", path.display());
    Ok(config)
}

/// Parses configuration text; relative catalog paths are taken from `base_dir`.
pub fn parse(source: &str, base_dir: &Path) -> LoadResult<LoadedConfig> {
    let mut tree: Table = toml::from_str(source).map_err(|e| LoadError::Parse {
        path: "<string>".to_string(),
        source: e,
    })?;

    let catalog = match tree.remove(KEY_CATALOG) {
        None => BlueprintCatalog::new(),
        Some(Value::Table(entries)) => build_catalog(entries, base_dir)?,
        Some(_) => return Err(LoadError::InvalidCatalog),
    };
    apply_defaults(&mut tree);

    Ok(LoadedConfig {
        tree,
        catalog,
        deploy_root: base_dir.to_path_buf(),
        path: None,
    })
}

fn build_catalog(entries: Table, base_dir: &Path) -> LoadResult<BlueprintCatalog> {
    let mut catalog = BlueprintCatalog::new();
    for (package, value) in entries {
        let entry: CatalogEntry = value.try_into().map_err(|e| LoadError::InvalidEntry {
            package: package.clone(),
            source: e,
        })?;
        log::trace!("Catalog entry '{}' with {} task(s)", package, entry.tasks.len());
        catalog.register(BlueprintDescriptor::from_catalog(&package, entry, Some(base_dir)));
    }
    Ok(catalog)
}

/// Fills in well-known keys the file leaves out.
fn apply_defaults(tree: &mut Table) {
    let defaults = [
        (KEY_SUDO_USER, Value::String(DEFAULT_SUDO_USER.to_string())),
        (KEY_USE_SUDO, Value::Boolean(false)),
        (KEY_MERGE_STATES, Value::Boolean(true)),
        (KEY_FORWARD_AGENT, Value::Boolean(true)),
    ];
    for (key, value) in defaults {
        tree.entry(key.to_string()).or_insert(value);
    }
}

/// `@env` and `role@env` targets for every environment other than the default one.
pub fn targets(environment: &Environment) -> StateResult<Vec<TargetInfo>> {
    let mut targets = Vec::new();
    for name in environment.environment_names() {
        if name == DEFAULT_ENVIRONMENT {
            continue;
        }
        targets.push(TargetInfo {
            name: format!("@{}", name),
            doc: format!("Select the '{}' environment", name),
        });
        for role in environment.roles_of(&name)? {
            targets.push(TargetInfo {
                name: format!("{}@{}", role, name),
                doc: format!("Select role '{}' in the '{}' environment", role, name),
            });
        }
    }
    Ok(targets)
}
