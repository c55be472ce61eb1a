// src/core/template_sync.rs

use crate::constants::{CHECKSUM_EXTENSION, IGNORED_FILES, RAW_EXTENSION};
use crate::core::commons::{self, shell_quote};
use crate::core::operations::{Operations, RunOptions};
use crate::system::executor::ExecutionError;
use crate::system::prompt::{ConflictAnswer, ConflictPrompt, PromptError};
use crate::system::renderer::{RenderError, TemplateRenderer};
use std::fs;
use std::path::Path;
use thiserror::Error;
use toml::{Table, Value};

/// Errors that abort a template sync.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A template could not be rendered.
    #[error(transparent)]
    Render(#[from] RenderError),
    /// A remote command failed.
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    /// The conflict prompt failed.
    #[error(transparent)]
    Prompt(#[from] PromptError),
    /// The local staging area could not be written.
    #[error("Could not stage '{path}': {source}")]
    Staging {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// `mktemp -d` printed nothing.
    #[error("Remote 'mktemp -d' returned no directory.")]
    NoRemoteTempDir,
}

/// Result alias for template syncs.
pub type SyncResult<T> = Result<T, SyncError>;

/// A template picked for upload.
#[derive(Debug, Clone)]
struct Planned {
    template: String,
    /// Path relative to the staging root (and to a directory destination).
    relative: String,
    raw: bool,
    /// Remote path of the deployed file.
    remote: String,
}

/// Renders templates and syncs them to a remote destination, guarded by
/// `<file>.md5` checksums written after every upload.
pub struct TemplateSync<'a> {
    ops: &'a Operations<'a>,
    renderer: &'a dyn TemplateRenderer,
    prompt: &'a dyn ConflictPrompt,
    run_as: RunOptions,
}

impl std::fmt::Debug for TemplateSync<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateSync")
            .field("ops", self.ops)
            .field("run_as", &self.run_as)
            .finish()
    }
}

impl<'a> TemplateSync<'a> {
    /// Remote commands run through sudo as root.
    pub fn new(ops: &'a Operations<'a>, renderer: &'a dyn TemplateRenderer, prompt: &'a dyn ConflictPrompt) -> Self {
        Self {
            ops,
            renderer,
            prompt,
            run_as: RunOptions::sudo(Some("root")),
        }
    }

    /// Uploads every template whose name starts with `source`.
    ///
    /// A `destination` ending in `/` is a directory; otherwise the single
    /// template is deployed under that file name. Returns the updated paths,
    /// relative to a directory destination or as the destination's file name.
    pub fn sync(
        &self,
        source: &str,
        destination: &str,
        context: &Table,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> SyncResult<Vec<String>> {
        commons::info("Uploading templates: ", basename(source.trim_end_matches('/')));

        let source = source.strip_prefix("./").unwrap_or(source);
        let templates: Vec<String> = self
            .renderer
            .list_templates()?
            .into_iter()
            .filter(|t| t.starts_with(source) && !IGNORED_FILES.contains(&basename(t)))
            .collect();

        if templates.is_empty() {
            commons::note("No templates found");
            return Ok(Vec::new());
        }

        // More than one template always lands in a directory.
        let destination = if templates.len() > 1 && !destination.ends_with('/') {
            format!("{}/", destination)
        } else {
            destination.to_string()
        };
        // A lone template aimed at an existing remote directory lands inside it.
        let destination = if !destination.ends_with('/') && self.is_remote_dir(&destination)? {
            format!("{}/", destination)
        } else {
            destination
        };
        let directory_mode = destination.ends_with('/');

        let staging = tempfile::tempdir().map_err(|e| SyncError::Staging {
            path: "<tempdir>".to_string(),
            source: e,
        })?;

        let mut staged = Vec::new();
        for template in &templates {
            let planned = plan(template, source, &destination, directory_mode);

            let mut template_context = context.clone();
            template_context.insert("n".to_string(), Value::String(stem(template)));

            if !self.confirm_overwrite(&planned, &template_context)? {
                continue;
            }
            if self.stage(&planned, &template_context, staging.path())? {
                staged.push(planned);
            }
        }

        if staged.is_empty() {
            commons::note("(no changes found)");
            return Ok(Vec::new());
        }

        let updated = self.push(staging.path(), &staged, &destination, directory_mode, owner, group)?;

        if updated.is_empty() {
            commons::note("(no changes found)");
        }
        for (name, remote) in &updated {
            commons::info("    Uploaded: ", name);
            let remote = shell_quote(remote);
            self.ops.run(
                &format!("md5sum {} > {}{}", remote, remote, CHECKSUM_EXTENSION),
                &self.run_as,
            )?;
        }

        Ok(updated.into_iter().map(|(name, _)| name).collect())
    }

    fn is_remote_dir(&self, path: &str) -> SyncResult<bool> {
        let probe = format!("test -d {}", shell_quote(path));
        Ok(self.ops.run_quiet(&probe, &self.run_as)?.success())
    }

    /// Checks the remote checksum ledger and asks the operator on a mismatch.
    /// Returns `false` when the template should be skipped.
    fn confirm_overwrite(&self, planned: &Planned, context: &Table) -> SyncResult<bool> {
        let remote = shell_quote(&planned.remote);
        let check = format!(
            "md5sum -c --status {r}{ext} || test ! -e {r}{ext}",
            r = remote,
            ext = CHECKSUM_EXTENSION
        );
        if self.ops.run_quiet(&check, &self.run_as)?.success() {
            return Ok(true);
        }

        commons::warn(&format!(
            "Template \"{}\" checksum mismatch. File changed since last upload.",
            planned.template
        ));
        loop {
            match self.prompt.ask(&planned.template)? {
                ConflictAnswer::Overwrite => return Ok(true),
                ConflictAnswer::Skip => return Ok(false),
                ConflictAnswer::Diff if planned.raw => {
                    commons::warn("Cannot show diff, not implemented for raw files.");
                }
                ConflictAnswer::Diff => {
                    let new = match self.renderer.render(&planned.template, context) {
                        Ok(new) => new,
                        Err(RenderError::Encoding(_)) => {
                            commons::warn("Cannot show diff, template is not valid UTF-8.");
                            continue;
                        }
                        Err(e) => return Err(e.into()),
                    };
                    let current = self.ops.run_quiet(&format!("cat {}", remote), &self.run_as)?;
                    eprintln!("{}", unified_diff(&current.stdout, &new));
                }
            }
        }
    }

    /// Writes the rendered (or raw) template into the staging area.
    /// Returns `false` when the template could not be decoded.
    fn stage(&self, planned: &Planned, context: &Table, staging: &Path) -> SyncResult<bool> {
        let target = staging.join(&planned.relative);
        let staging_error = |e: std::io::Error| SyncError::Staging {
            path: target.display().to_string(),
            source: e,
        };
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(staging_error)?;
        }

        let contents = if planned.raw {
            self.renderer.source(&planned.template)?
        } else {
            match self.renderer.render(&planned.template, context) {
                Ok(mut text) => {
                    text.push('\n');
                    text.into_bytes()
                }
                Err(RenderError::Encoding(name)) => {
                    commons::warn(&format!("Failed to render template \"{}\"", name));
                    return Ok(false);
                }
                Err(e) => return Err(e.into()),
            }
        };
        fs::write(&target, contents).map_err(staging_error)?;
        Ok(true)
    }

    /// Ships the staging area to a remote temp dir and rsyncs it into place.
    /// Returns `(name, remote path)` for each file rsync changed.
    fn push(
        &self,
        staging: &Path,
        staged: &[Planned],
        destination: &str,
        directory_mode: bool,
        owner: Option<&str>,
        group: Option<&str>,
    ) -> SyncResult<Vec<(String, String)>> {
        let remote_tmp = self.ops.run("mktemp -d", &self.run_as)?.stdout.trim().to_string();
        if remote_tmp.is_empty() {
            return Err(SyncError::NoRemoteTempDir);
        }

        let _cleanup = scopeguard::guard((), |_| {
            let remove = format!("rm -rf {}", shell_quote(&remote_tmp));
            if let Err(e) = self.ops.run_quiet(&remove, &self.run_as) {
                log::warn!("Could not remove remote temp dir '{}': {}", remote_tmp, e);
            }
        });

        let tmp = shell_quote(&remote_tmp);
        self.ops.run(&format!("chmod -R 777 {}", tmp), &self.run_as)?;
        self.ops.put_dir(staging, &remote_tmp, true)?;

        let owner_name = owner.unwrap_or("root");
        let group_name = group.or(owner).unwrap_or("root");
        self.ops.run(
            &format!("chown -R {}:{} {}", owner_name, group_name, tmp),
            &self.run_as,
        )?;

        // Directory mode syncs the temp dir's contents; file mode syncs the lone file.
        let from = if directory_mode {
            format!("{}/", remote_tmp)
        } else {
            let single = staged.first().map(|p| p.relative.as_str()).unwrap_or_default();
            format!("{}/{}", remote_tmp, single)
        };
        let output = self.ops.run(
            &format!(
                "rsync -rcbiog --out-format=\"%n\" {} {}",
                shell_quote(&from),
                shell_quote(destination)
            ),
            &self.run_as,
        )?;

        let changed = output.stdout.lines().map(str::trim).filter(|l| !l.is_empty());
        let updated = if directory_mode {
            changed
                .filter(|line| staging.join(line).is_file())
                .map(|line| (line.to_string(), format!("{}{}", destination, line)))
                .collect()
        } else if changed.filter(|line| !line.ends_with('/')).count() > 0 {
            vec![(basename(destination).to_string(), destination.to_string())]
        } else {
            Vec::new()
        };
        Ok(updated)
    }
}

fn plan(template: &str, source: &str, destination: &str, directory_mode: bool) -> Planned {
    let raw = template.ends_with(RAW_EXTENSION);
    let deployed = template.strip_suffix(RAW_EXTENSION).unwrap_or(template);

    let relative = deployed
        .get(source.len()..)
        .unwrap_or_default()
        .trim_start_matches('/');
    let relative = if relative.contains('/') {
        relative.to_string()
    } else {
        basename(deployed).to_string()
    };

    let remote = if directory_mode {
        format!("{}{}", destination, relative)
    } else {
        destination.to_string()
    };

    Planned {
        template: template.to_string(),
        relative,
        raw,
        remote,
    }
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Template file name without its last extension, exposed to templates as `n`.
fn stem(template: &str) -> String {
    Path::new(basename(template))
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Unified diff from the remote copy (`current`) to the rendered one (`new`).
pub fn unified_diff(current: &str, new: &str) -> String {
    let current = current.replace('\r', "");
    similar::TextDiff::from_lines(current.as_str(), new)
        .unified_diff()
        .header("current", "new")
        .to_string()
}
