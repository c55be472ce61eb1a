// src/system/renderer.rs

use crate::constants::{IGNORED_FILES, RAW_EXTENSION};
use crate::core::socket;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::error::Error as _;
use std::fs;
use std::path::{Path, PathBuf};
use tera::Tera;
use thiserror::Error;
use toml::Table;
use walkdir::WalkDir;

/// Errors raised while listing or rendering templates.
#[derive(Error, Debug)]
pub enum RenderError {
    /// No root in the search path holds the template.
    #[error("Template not found: \"{0}\"")]
    NotFound(String),
    /// The template is not valid UTF-8.
    #[error("Template \"{0}\" is not valid UTF-8.")]
    Encoding(String),
    /// Tera failed to parse or render the template.
    #[error("Failed to render template \"{name}\": {message}")]
    Render { name: String, message: String },
    /// A template root could not be read.
    #[error("Could not read templates under '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result alias for rendering.
pub type RenderResult<T> = Result<T, RenderError>;

lazy_static! {
    static ref TAG_RE: Regex =
        Regex::new(r"\{%-?\s*(?:include|extends|import)\s+(.*?)-?%\}").expect("tag pattern is valid");
    static ref QUOTED_RE: Regex = Regex::new(r#""([^"]+)"|'([^']+)'"#).expect("quote pattern is valid");
}

/// Turns named templates into file contents.
///
/// Names are `/`-separated paths relative to the renderer's roots.
pub trait TemplateRenderer {
    /// All template names, sorted.
    fn list_templates(&self) -> RenderResult<Vec<String>>;

    /// Renders `name` with `context`.
    fn render(&self, name: &str, context: &Table) -> RenderResult<String>;

    /// The unrendered bytes of `name`.
    fn source(&self, name: &str) -> RenderResult<Vec<u8>>;
}

/// Tera-backed renderer over an ordered list of template roots.
///
/// Earlier roots shadow later ones. Files ending in `.__raw__` are listed but
/// never parsed.
#[derive(Debug, Clone, Default)]
pub struct TeraRenderer {
    search_path: Vec<PathBuf>,
}

impl TeraRenderer {
    /// Renderer over `search_path`, most specific root first.
    pub fn new(search_path: Vec<PathBuf>) -> Self {
        Self { search_path }
    }

    fn locate(&self, name: &str) -> Option<PathBuf> {
        self.search_path
            .iter()
            .map(|root| root.join(name))
            .find(|path| path.is_file())
    }

    /// Builds a Tera instance holding `wanted` and every template it
    /// includes, extends or imports, so one broken file elsewhere in the
    /// search path never blocks an unrelated render.
    fn engine(&self, wanted: &str) -> RenderResult<Tera> {
        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        tera.register_function("format_socket", format_socket_function);

        let mut sources = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = vec![wanted.to_string()];
        while let Some(name) = pending.pop() {
            if name.ends_with(RAW_EXTENSION) || !seen.insert(name.clone()) {
                continue;
            }
            // Missing references surface from Tera with its own message.
            let Some(path) = self.locate(&name) else { continue };
            let bytes = fs::read(&path).map_err(|e| RenderError::Io {
                path: path.display().to_string(),
                source: e,
            })?;
            match String::from_utf8(bytes) {
                Ok(text) => {
                    pending.extend(references(&text));
                    sources.push((name, text));
                }
                Err(_) if name == wanted => return Err(RenderError::Encoding(name)),
                Err(_) => log::debug!("Skipping undecodable template '{}'", name),
            }
        }

        tera.add_raw_templates(sources).map_err(|e| RenderError::Render {
            name: wanted.to_string(),
            message: error_chain(&e),
        })?;
        Ok(tera)
    }
}

impl TemplateRenderer for TeraRenderer {
    fn list_templates(&self) -> RenderResult<Vec<String>> {
        let mut names: Vec<String> = Vec::new();
        for root in self.search_path.iter().filter(|r| r.is_dir()) {
            for entry in WalkDir::new(root).min_depth(1) {
                let entry = entry.map_err(|e| RenderError::Io {
                    path: root.display().to_string(),
                    source: e.into(),
                })?;
                if !entry.file_type().is_file() {
                    continue;
                }
                if IGNORED_FILES.iter().any(|f| entry.file_name() == *f) {
                    continue;
                }
                if let Some(name) = template_name(root, entry.path())
                    && !names.contains(&name)
                {
                    names.push(name);
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn render(&self, name: &str, context: &Table) -> RenderResult<String> {
        if self.locate(name).is_none() {
            return Err(RenderError::NotFound(name.to_string()));
        }
        let tera = self.engine(name)?;
        let context = tera::Context::from_serialize(context).map_err(|e| RenderError::Render {
            name: name.to_string(),
            message: error_chain(&e),
        })?;
        tera.render(name, &context).map_err(|e| RenderError::Render {
            name: name.to_string(),
            message: error_chain(&e),
        })
    }

    fn source(&self, name: &str) -> RenderResult<Vec<u8>> {
        let path = self
            .locate(name)
            .ok_or_else(|| RenderError::NotFound(name.to_string()))?;
        fs::read(&path).map_err(|e| RenderError::Io {
            path: path.display().to_string(),
            source: e,
        })
    }
}

/// Template names a source pulls in through `include`, `extends` or `import`.
fn references(text: &str) -> Vec<String> {
    TAG_RE
        .captures_iter(text)
        .filter_map(|tag| tag.get(1))
        .flat_map(|args| QUOTED_RE.captures_iter(args.as_str()))
        .filter_map(|quoted| quoted.get(1).or_else(|| quoted.get(2)))
        .map(|name| name.as_str().to_string())
        .collect()
}

fn template_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

fn error_chain(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = inner.source();
    }
    message
}

/// `format_socket(socket=..., template=..., unix_template=..., defaults=...)` for templates.
fn format_socket_function(args: &HashMap<String, tera::Value>) -> tera::Result<tera::Value> {
    let text = |key: &str| args.get(key).and_then(tera::Value::as_str);

    let raw = text("socket").ok_or_else(|| tera::Error::msg("format_socket: missing `socket`"))?;
    let template = text("template").unwrap_or(socket::DEFAULT_TEMPLATE);
    let unix_template = text("unix_template");
    let defaults: HashMap<String, String> = args
        .get("defaults")
        .and_then(tera::Value::as_object)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let parsed: socket::Socket = raw
        .parse()
        .map_err(|e: socket::SocketError| tera::Error::msg(e.to_string()))?;
    let formatted = socket::format_socket(&parsed, template, unix_template, &defaults);
    Ok(tera::Value::String(formatted))
}
