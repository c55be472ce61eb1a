// src/core/config_resolver.rs

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use toml::{Table, Value};

/// Nesting limit for `$(...)` substitution chains.
pub const MAX_RECURSION_DEPTH: u32 = 32;

/// Upper bound on substitution passes over a single string.
const MAX_SUBSTITUTIONS: usize = 1024;

lazy_static! {
    static ref VAR_RE: Regex = Regex::new(r"\$\((.+?)\)").expect("variable pattern is valid");
}

/// Errors raised while resolving or substituting values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolverError {
    /// A value refers back to itself.
    #[error("Circular reference while resolving '{path}': {chain}")]
    CircularReference { path: String, chain: String },
    /// Substitutions nest deeper than the limit.
    #[error("Maximum recursion depth ({limit}) exceeded while resolving '{path}'.")]
    MaxRecursionDepth { path: String, limit: u32 },
    /// A string kept producing new variables.
    #[error("Too many substitutions in '{0}'.")]
    SubstitutionLimit(String),
}

/// Result alias for resolution.
pub type ResolverResult<T> = Result<T, ResolverError>;

/// Resolves dotted paths against a configuration tree.
///
/// Lookups fall back towards the root: when `a.b.c.edge` is missing the
/// resolver retries `a.b.edge`, then `a.edge`, then `edge`. String values have
/// their `$(inner.path)` variables expanded against the same tree.
#[derive(Debug, Clone)]
pub struct Resolver<'a> {
    tree: &'a Table,
    default: Option<&'a Value>,
    recursion_stack: Vec<String>,
    recursion_depth: u32,
}

impl<'a> Resolver<'a> {
    /// A resolver over `tree` with no default.
    pub fn new(tree: &'a Table) -> Self {
        Self {
            tree,
            default: None,
            recursion_stack: Vec::new(),
            recursion_depth: 0,
        }
    }

    /// Value used for misses, both for the requested path and for inner variables.
    pub fn with_default(mut self, default: Option<&'a Value>) -> Self {
        self.default = default;
        self
    }

    /// Resolves `path`, returning `None` on a miss without a default.
    pub fn resolve(&mut self, path: &str) -> ResolverResult<Option<Value>> {
        if self.recursion_depth >= MAX_RECURSION_DEPTH {
            return Err(ResolverError::MaxRecursionDepth {
                path: path.to_string(),
                limit: MAX_RECURSION_DEPTH,
            });
        }
        if self.recursion_stack.iter().any(|p| p == path) {
            let mut chain = self.recursion_stack.clone();
            chain.push(path.to_string());
            return Err(ResolverError::CircularReference {
                path: path.to_string(),
                chain: chain.join(" -> "),
            });
        }

        let Some(found) = lookup(self.tree, path).or(self.default) else {
            log::debug!("'{}' not found", path);
            return Ok(None);
        };

        self.recursion_stack.push(path.to_string());
        self.recursion_depth += 1;
        let expanded = self.expand_value(found);
        self.recursion_depth -= 1;
        self.recursion_stack.pop();

        expanded.map(Some)
    }

    /// Expands every `$(...)` variable in `text`. Non-empty results are trimmed.
    pub fn expand_string(&mut self, text: &str) -> ResolverResult<String> {
        let mut current = text.to_string();
        let mut passes = 0;

        while let Some(captures) = VAR_RE.captures(&current) {
            passes += 1;
            if passes > MAX_SUBSTITUTIONS {
                return Err(ResolverError::SubstitutionLimit(text.to_string()));
            }
            let (Some(full), Some(inner)) = (captures.get(0), captures.get(1)) else {
                break;
            };
            let range = full.range();
            let inner_path = inner.as_str().trim().to_string();

            let replacement = self
                .resolve(&inner_path)?
                .map(|v| value_to_string(&v))
                .unwrap_or_default();
            current.replace_range(range, &replacement);
        }

        if current.is_empty() {
            return Ok(current);
        }
        Ok(current.trim().to_string())
    }

    fn expand_value(&mut self, value: &Value) -> ResolverResult<Value> {
        match value {
            Value::String(s) => Ok(Value::String(self.expand_string(s)?)),
            Value::Array(items) => items
                .iter()
                .map(|item| self.expand_value(item))
                .collect::<ResolverResult<Vec<_>>>()
                .map(Value::Array),
            Value::Table(table) => {
                let mut out = Table::new();
                for (key, item) in table {
                    out.insert(key.clone(), self.expand_value(item)?);
                }
                Ok(Value::Table(out))
            }
            other => Ok(other.clone()),
        }
    }
}

// --- Convenience entry points ---

/// Resolves `path` in `tree`, falling back to `default` on a miss.
pub fn resolve(tree: &Table, path: &str, default: Option<&Value>) -> ResolverResult<Option<Value>> {
    Resolver::new(tree).with_default(default).resolve(path)
}

/// Resolves `path` and renders a scalar result as a string.
pub fn resolve_str(tree: &Table, path: &str) -> ResolverResult<Option<String>> {
    Ok(resolve(tree, path, None)?.map(|v| value_to_string(&v)))
}

/// Resolves `path` and reads the result as a boolean, using `default` for misses and non-booleans.
pub fn resolve_bool(tree: &Table, path: &str, default: bool) -> ResolverResult<bool> {
    Ok(resolve(tree, path, None)?
        .and_then(|v| v.as_bool())
        .unwrap_or(default))
}

/// Resolves `path` as a list of strings. A scalar becomes a one-element list.
pub fn resolve_list(tree: &Table, path: &str) -> ResolverResult<Vec<String>> {
    Ok(match resolve(tree, path, None)? {
        None => Vec::new(),
        Some(Value::Array(items)) => items.iter().map(value_to_string).collect(),
        Some(Value::String(s)) if s.is_empty() => Vec::new(),
        Some(other) => vec![value_to_string(&other)],
    })
}

/// Expands `$(...)` variables inside arbitrary text.
pub fn substitute(tree: &Table, text: &str) -> ResolverResult<String> {
    Resolver::new(tree).expand_string(text)
}

/// Joins a lookup prefix and a key, e.g. `settings.web` + `port`.
pub fn prefixed(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Renders a value the way it appears after substitution.
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Integer(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Datetime(d) => d.to_string(),
        Value::Array(items) => items
            .iter()
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        Value::Table(_) => value.to_string(),
    }
}

// --- Path traversal ---

/// Looks `path` up with parent-path fallback. Malformed paths and bad indices are misses.
fn lookup<'t>(tree: &'t Table, path: &str) -> Option<&'t Value> {
    let mut segments: Vec<&str> = path.split('.').collect();
    if path.is_empty() || segments.iter().any(|s| s.is_empty()) {
        return None;
    }

    loop {
        if let Some(value) = walk(tree, &segments) {
            return Some(value);
        }
        if segments.len() <= 1 {
            return None;
        }
        let parent = segments.len() - 2;
        segments.remove(parent);
    }
}

fn walk<'t>(tree: &'t Table, segments: &[&str]) -> Option<&'t Value> {
    let (first, rest) = segments.split_first()?;
    let mut current = tree.get(*first)?;
    for segment in rest {
        current = match current {
            Value::Table(table) => table.get(*segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
