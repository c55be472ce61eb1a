// src/state.rs

use crate::constants::{DEFAULT_ENVIRONMENT, KEY_ROLEDEFS, KEY_STATES, SNAPSHOT_NAME};
use crate::core::overlay::{self, OverlayMode};
use thiserror::Error;
use toml::{Table, Value};

/// Errors raised while switching environments or applying roles.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// No `states.<name>` table exists.
    #[error("Unknown environment '{0}'.")]
    UnknownEnvironment(String),
    /// The name is reserved for internal bookkeeping.
    #[error("'{0}' is a reserved name and cannot be used as an environment.")]
    ReservedName(String),
    /// `states.<name>` is not a table.
    #[error("Environment '{0}' must be a table.")]
    InvalidEnvironment(String),
    /// The role is not declared under `roledefs`.
    #[error("Unknown role '{0}'.")]
    UnknownRole(String),
    /// A role overlay is not a table.
    #[error("Roledefs must be tables, but role '{0}' is not.")]
    InvalidRoleDefinition(String),
    /// `roledefs` is not a table.
    #[error("'roledefs' must be a table.")]
    InvalidRoledefs,
}

/// Result alias for environment state changes.
pub type StateResult<T> = Result<T, StateError>;

/// The active tree, optionally paired with the snapshot taken before a role overlay.
#[derive(Debug, Clone)]
enum OverlayState {
    /// No overlay is applied.
    Clean(Table),
    /// A role overlay is applied on top of `snapshot`.
    Overlaid { snapshot: Table, current: Table },
}

/// Active environment and role state.
///
/// The loaded configuration is kept as `base`. Switching environments
/// rebuilds the active tree from it; applying roles overlays the active
/// tree after capturing a snapshot, and only one snapshot exists at a time.
#[derive(Debug, Clone)]
pub struct Environment {
    base: Table,
    name: String,
    roles: Vec<String>,
    state: OverlayState,
}

impl Environment {
    /// Starts in the default environment with no roles, on `base` as loaded.
    pub fn new(base: Table) -> Self {
        Self {
            state: OverlayState::Clean(base.clone()),
            base,
            name: DEFAULT_ENVIRONMENT.to_string(),
            roles: Vec::new(),
        }
    }

    /// The effective configuration tree.
    pub fn tree(&self) -> &Table {
        match &self.state {
            OverlayState::Clean(tree) => tree,
            OverlayState::Overlaid { current, .. } => current,
        }
    }

    fn tree_mut(&mut self) -> &mut Table {
        match &mut self.state {
            OverlayState::Clean(tree) => tree,
            OverlayState::Overlaid { current, .. } => current,
        }
    }

    /// The tree as it was before any pending overlay.
    fn pristine(&self) -> &Table {
        match &self.state {
            OverlayState::Clean(tree) => tree,
            OverlayState::Overlaid { snapshot, .. } => snapshot,
        }
    }

    /// Name of the active environment.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Active roles, in activation order.
    pub fn roles(&self) -> &[String] {
        &self.roles
    }

    /// Whether a role overlay is pending on top of the snapshot.
    pub fn is_overlaid(&self) -> bool {
        matches!(self.state, OverlayState::Overlaid { .. })
    }

    /// Names of the environments declared under `states`, in file order.
    pub fn environment_names(&self) -> Vec<String> {
        match self.base.get(KEY_STATES) {
            Some(Value::Table(states)) => states
                .keys()
                .filter(|name| name.as_str() != SNAPSHOT_NAME)
                .cloned()
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Role names declared in the active (pre-overlay) tree.
    pub fn role_names(&self) -> StateResult<Vec<String>> {
        Ok(roledefs(self.pristine())?
            .map(|defs| defs.keys().cloned().collect())
            .unwrap_or_default())
    }

    /// Roles declared for the named environment, without switching to it.
    pub fn roles_of(&self, name: &str) -> StateResult<Vec<String>> {
        let tree = self.environment_tree(name)?;
        Ok(roledefs(&tree)?
            .map(|defs| defs.keys().cloned().collect())
            .unwrap_or_default())
    }

    // --- Environment switching ---

    /// Activates `name`: the loaded tree updated (shallowly) with `states.<name>`.
    ///
    /// Any pending snapshot is discarded. If roles are active, the first one is
    /// re-applied on top of the new environment.
    pub fn switch_environment(&mut self, name: &str) -> StateResult<()> {
        let tree = self.environment_tree(name)?;
        log::debug!("Switching to environment '{}'", name);

        self.state = OverlayState::Clean(tree);
        self.name = name.to_string();

        if let Some(first) = self.roles.first().cloned() {
            self.overlay_roles(&[first])?;
        }
        Ok(())
    }

    fn environment_tree(&self, name: &str) -> StateResult<Table> {
        if name == SNAPSHOT_NAME {
            return Err(StateError::ReservedName(name.to_string()));
        }

        let mut tree = self.base.clone();
        let state = match self.base.get(KEY_STATES) {
            Some(Value::Table(states)) => states.get(name),
            _ => None,
        };
        match state {
            Some(Value::Table(state)) => overlay::replace(&mut tree, state),
            Some(_) => return Err(StateError::InvalidEnvironment(name.to_string())),
            None if name == DEFAULT_ENVIRONMENT => {}
            None => return Err(StateError::UnknownEnvironment(name.to_string())),
        }
        Ok(tree)
    }

    // --- Roles ---

    /// Makes `roles` the active roles and overlays them onto the tree.
    ///
    /// An empty list clears any pending overlay.
    pub fn set_roles(&mut self, roles: &[String]) -> StateResult<()> {
        if roles.is_empty() {
            self.restore_snapshot();
        } else {
            self.apply_roles(roles)?;
        }
        self.roles = roles.to_vec();
        Ok(())
    }

    /// Overlays each role's definition in the given order.
    ///
    /// A pending snapshot is restored first so overlays never stack across
    /// calls. Every role is validated before anything changes.
    pub fn apply_roles(&mut self, roles: &[String]) -> StateResult<()> {
        self.overlay_roles(roles)
    }

    fn overlay_roles(&mut self, roles: &[String]) -> StateResult<()> {
        let overlays = self.role_overlays(roles)?;

        self.restore_snapshot();
        self.capture_snapshot();

        let mode = OverlayMode::from_tree(self.tree());
        log::debug!("Applying roles {:?} ({:?})", roles, mode);
        let tree = self.tree_mut();
        for overlay in &overlays {
            overlay::apply(tree, overlay, mode);
        }
        Ok(())
    }

    fn role_overlays(&self, roles: &[String]) -> StateResult<Vec<Table>> {
        let defs = roledefs(self.pristine())?;
        roles
            .iter()
            .map(|role| match defs.and_then(|d| d.get(role)) {
                Some(Value::Table(overlay)) => Ok(overlay.clone()),
                Some(_) => Err(StateError::InvalidRoleDefinition(role.clone())),
                None => Err(StateError::UnknownRole(role.clone())),
            })
            .collect()
    }

    // --- Snapshot journaling ---

    /// Remembers the current tree so a later overlay can be undone.
    /// A pending snapshot is restored first.
    pub fn capture_snapshot(&mut self) {
        self.restore_snapshot();
        self.state = match std::mem::replace(&mut self.state, OverlayState::Clean(Table::new())) {
            OverlayState::Clean(tree) => OverlayState::Overlaid {
                snapshot: tree.clone(),
                current: tree,
            },
            overlaid => overlaid,
        };
    }

    /// Puts back the tree captured before the last overlay. Returns whether one was pending.
    pub fn restore_snapshot(&mut self) -> bool {
        let mut restored = false;
        self.state = match std::mem::replace(&mut self.state, OverlayState::Clean(Table::new())) {
            OverlayState::Overlaid { snapshot, .. } => {
                restored = true;
                OverlayState::Clean(snapshot)
            }
            clean => clean,
        };
        restored
    }
}

fn roledefs(tree: &Table) -> StateResult<Option<&Table>> {
    match tree.get(KEY_ROLEDEFS) {
        None => Ok(None),
        Some(Value::Table(defs)) => Ok(Some(defs)),
        Some(_) => Err(StateError::InvalidRoledefs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
user = "ubuntu"
hosts = ["base.example.org"]

[roledefs.web]
hosts = ["web1"]
[roledefs.web.settings]
workers = 4

[roledefs.db]
hosts = ["db1"]

[roledefs.broken]
value = 1

[states.live]
user = "deploy"
hosts = ["live.example.org"]

[states.live.roledefs.app]
hosts = ["app1", "app2"]

[states.odd]
roledefs = "nope"
"#;

    fn environment() -> Environment {
        Environment::new(toml::from_str(CONFIG).unwrap())
    }

    fn hosts(env: &Environment) -> Vec<String> {
        env.tree()["hosts"]
            .as_array()
            .unwrap()
            .iter()
            .map(|h| h.as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn test_switch_environment_updates_shallowly() {
        // --- Setup ---
        let mut env = environment();

        // --- Execute ---
        env.switch_environment("live").unwrap();

        // --- Assert ---
        assert_eq!(env.name(), "live");
        assert_eq!(env.tree()["user"].as_str(), Some("deploy"));
        assert_eq!(hosts(&env), vec!["live.example.org"]);
        // The state's roledefs replace the global ones.
        assert_eq!(env.role_names().unwrap(), vec!["app"]);
    }

    #[test]
    fn test_switch_to_missing_default_uses_base() {
        let mut env = environment();
        env.switch_environment("default").unwrap();
        assert_eq!(hosts(&env), vec!["base.example.org"]);
    }

    #[test]
    fn test_switch_to_unknown_environment_fails() {
        let mut env = environment();
        assert_eq!(
            env.switch_environment("staging"),
            Err(StateError::UnknownEnvironment("staging".into()))
        );
        assert_eq!(
            env.switch_environment("_current"),
            Err(StateError::ReservedName("_current".into()))
        );
    }

    #[test]
    fn test_apply_roles_merges_and_restores_exactly() {
        // --- Setup ---
        let mut env = environment();
        let before = env.tree().clone();

        // --- Execute ---
        env.apply_roles(&["web".to_string()]).unwrap();

        // --- Assert ---
        assert!(env.is_overlaid());
        assert_eq!(hosts(&env), vec!["base.example.org", "web1"]);
        assert!(env.restore_snapshot());
        assert_eq!(env.tree(), &before);
        assert!(!env.restore_snapshot());
    }

    #[test]
    fn test_role_overlays_do_not_stack() {
        let mut env = environment();
        env.apply_roles(&["web".to_string()]).unwrap();
        env.apply_roles(&["db".to_string()]).unwrap();
        assert_eq!(hosts(&env), vec!["base.example.org", "db1"]);
        assert!(env.tree().get("settings").is_none());
    }

    #[test]
    fn test_multiple_roles_apply_in_order() {
        let mut env = environment();
        env.apply_roles(&["db".to_string(), "web".to_string()]).unwrap();
        assert_eq!(hosts(&env), vec!["base.example.org", "db1", "web1"]);
    }

    #[test]
    fn test_replace_mode_overwrites() {
        let mut tree: Table = toml::from_str(CONFIG).unwrap();
        tree.insert("merge_states".into(), Value::Boolean(false));
        let mut env = Environment::new(tree);
        env.apply_roles(&["web".to_string()]).unwrap();
        assert_eq!(hosts(&env), vec!["web1"]);
    }

    #[test]
    fn test_unknown_role_fails_without_mutation() {
        // --- Setup ---
        let mut env = environment();
        env.apply_roles(&["web".to_string()]).unwrap();
        let overlaid = env.tree().clone();

        // --- Execute ---
        let result = env.apply_roles(&["db".to_string(), "ghost".to_string()]);

        // --- Assert ---
        assert_eq!(result, Err(StateError::UnknownRole("ghost".into())));
        assert_eq!(env.tree(), &overlaid);
    }

    #[test]
    fn test_non_table_roledefs_are_rejected() {
        let mut env = environment();
        env.switch_environment("odd").unwrap();
        assert_eq!(
            env.apply_roles(&["web".to_string()]),
            Err(StateError::InvalidRoledefs)
        );

        let mut tree: Table = toml::from_str(CONFIG).unwrap();
        tree.get_mut("roledefs")
            .and_then(Value::as_table_mut)
            .unwrap()
            .insert("flat".into(), Value::String("x".into()));
        let mut env = Environment::new(tree);
        assert_eq!(
            env.apply_roles(&["flat".to_string()]),
            Err(StateError::InvalidRoleDefinition("flat".into()))
        );
    }

    #[test]
    fn test_switch_reapplies_first_active_role() {
        // --- Setup ---
        let mut env = environment();
        env.switch_environment("live").unwrap();
        env.set_roles(&["app".to_string()]).unwrap();

        // --- Execute ---
        env.switch_environment("live").unwrap();

        // --- Assert ---
        assert!(env.is_overlaid());
        assert_eq!(hosts(&env), vec!["live.example.org", "app1", "app2"]);
    }

    #[test]
    fn test_set_empty_roles_clears_overlay() {
        let mut env = environment();
        env.set_roles(&["web".to_string()]).unwrap();
        env.set_roles(&[]).unwrap();
        assert!(!env.is_overlaid());
        assert!(env.roles().is_empty());
        assert_eq!(hosts(&env), vec!["base.example.org"]);
    }

    #[test]
    fn test_environment_listing() {
        let env = environment();
        assert_eq!(env.environment_names(), vec!["live", "odd"]);
        assert_eq!(env.roles_of("live").unwrap(), vec!["app"]);
        assert_eq!(env.roles_of("default").unwrap(), vec!["web", "db", "broken"]);
    }
}
