// src/cli/handlers/init.rs

use super::commons;
use crate::constants::{IGNORED_FILES, TEMPLATES_DIR};
use crate::core::session::Session;
use anyhow::{Context, Result};
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Files handled by one copy.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CopyOutcome {
    /// Files copied into the destination.
    pub created: Vec<PathBuf>,
    /// Already present in the destination and left alone.
    pub kept: Vec<PathBuf>,
}

/// `init:<blueprint>`: copies the blueprint's default templates into
/// `<deploy root>/templates/<blueprint>/` so they can be customised.
pub fn handle(name: Option<&str>, session: &Session) -> Result<()> {
    let entry = commons::require_blueprint(session, "init", "memcached", name)?;

    match &entry.descriptor.template_root {
        Some(root) if root.is_dir() => {
            let destination = session.deploy_root().join(TEMPLATES_DIR).join(&entry.name);
            let outcome = copy_templates(root, &destination)?;
            for path in &outcome.created {
                println!("    {} {}", "Created:".green(), path.display());
            }
            for path in &outcome.kept {
                println!("    {} {}", "Exists:".dimmed(), path.display());
            }
        }
        Some(root) => log::debug!("Template root '{}' does not exist", root.display()),
        None => log::debug!("Blueprint '{}' ships no templates", entry.name),
    }

    let doc = entry.descriptor.doc.trim();
    if !doc.is_empty() {
        println!("{}{}", "Help: ".green(), entry.name.yellow());
        println!("{}", doc);
    }
    Ok(())
}

/// Copies every file under `source` to the same relative path under
/// `destination`, never overwriting existing files.
pub fn copy_templates(source: &Path, destination: &Path) -> Result<CopyOutcome> {
    let mut outcome = CopyOutcome::default();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to read '{}'", source.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        if IGNORED_FILES.iter().any(|ignored| entry.file_name() == *ignored) {
            continue;
        }
        let relative = entry.path().strip_prefix(source)?;
        let target = destination.join(relative);
        if target.exists() {
            outcome.kept.push(target);
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create '{}'", parent.display()))?;
        }
        fs::copy(entry.path(), &target)
            .with_context(|| format!("Failed to copy '{}' to '{}'", entry.path().display(), target.display()))?;
        outcome.created.push(target);
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_copy_templates_keeps_existing_files() {
        // --- Setup ---
        let source = tempdir().unwrap();
        let destination = tempdir().unwrap();
        fs::create_dir_all(source.path().join("conf.d")).unwrap();
        fs::write(source.path().join("nginx.conf"), "default").unwrap();
        fs::write(source.path().join("conf.d/site.conf"), "site").unwrap();
        fs::write(source.path().join(".DS_Store"), "junk").unwrap();
        fs::write(destination.path().join("nginx.conf"), "customised").unwrap();

        // --- Execute ---
        let outcome = copy_templates(source.path(), destination.path()).unwrap();

        // --- Assert ---
        assert_eq!(outcome.created, vec![destination.path().join("conf.d/site.conf")]);
        assert_eq!(outcome.kept, vec![destination.path().join("nginx.conf")]);
        assert_eq!(fs::read_to_string(destination.path().join("nginx.conf")).unwrap(), "customised");
        assert_eq!(fs::read_to_string(destination.path().join("conf.d/site.conf")).unwrap(), "site");
        assert!(!destination.path().join(".DS_Store").exists());
    }
}
