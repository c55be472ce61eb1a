// src/core/overlay.rs

use crate::constants::KEY_MERGE_STATES;
use toml::{Table, Value};

/// How a role overlay is combined with the active tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlayMode {
    /// Deep-combine tables, union arrays.
    Merge,
    /// Overwrite top-level keys.
    Replace,
}

impl OverlayMode {
    /// Reads `merge_states` from the tree. Missing or non-boolean means merge.
    pub fn from_tree(tree: &Table) -> Self {
        match tree.get(KEY_MERGE_STATES).and_then(Value::as_bool) {
            Some(false) => Self::Replace,
            _ => Self::Merge,
        }
    }
}

/// Combines `overlay` into `base` according to `mode`.
pub fn apply(base: &mut Table, overlay: &Table, mode: OverlayMode) {
    match mode {
        OverlayMode::Merge => merge(base, overlay),
        OverlayMode::Replace => replace(base, overlay),
    }
}

/// Deep merge. Nested tables combine key by key, arrays become an
/// order-preserving union, anything else is overwritten by the overlay.
pub fn merge(base: &mut Table, overlay: &Table) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Table(inner)), Value::Table(incoming)) => {
                merge(inner, incoming);
                continue;
            }
            (Some(Value::Array(items)), Value::Array(incoming)) => {
                for item in incoming {
                    if !items.contains(item) {
                        items.push(item.clone());
                    }
                }
                continue;
            }
            _ => {}
        }
        base.insert(key.clone(), value.clone());
    }
}

/// Shallow update: each top-level overlay key replaces the base value.
pub fn replace(base: &mut Table, overlay: &Table) {
    for (key, value) in overlay {
        base.insert(key.clone(), value.clone());
    }
}
