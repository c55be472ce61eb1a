//! # System Interaction Layer
//!
//! Boundaries between the deployment core and the outside world.
//!
//! ## Modules
//!
//! - **`executor`**: the `RemoteExecutor` capability with its `ssh` and local adapters.
//! - **`renderer`**: the `TemplateRenderer` capability, backed by Tera over a template search path.
//! - **`prompt`**: conflict prompts shown when a remote file changed since the last upload.

/// Running commands on hosts.
pub mod executor;
/// Asking the operator about conflicts.
pub mod prompt;
/// Rendering templates.
pub mod renderer;
