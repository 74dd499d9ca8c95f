//! Tool installations and their registry.
//!
//! # Architecture
//!
//! - [`ToolInstallation`] - A named installation with a home directory
//! - [`ToolInstallations`] - Process-wide ordered registry of installations
//! - [`InstallationStore`] - Persistence boundary for the registry
//! - [`ToolInstaller`] - Trait implemented by installers that can fetch a
//!   distribution onto a node
//!
//! # Example
//!
//! ```ignore
//! use codeql_env_core::tools::{ToolInstallation, ToolInstallations};
//!
//! let registry = ToolInstallations::new(vec![ToolInstallation::new("codeql", "/opt/codeql/")]);
//! let installation = registry
//!     .resolve("codeql")?
//!     .for_node(&node)
//!     .for_environment(&env);
//! ```

mod installation;
mod installer;
mod registry;

pub use installation::{HOME_VARIABLE, InstallerSpec, PATH_ENTRY, ToolInstallation};
pub(crate) use installation::home_overlay;
pub use installer::{TOOL_TYPE_ID, ToolInstaller, preferred_location, sanitize};
pub use registry::{InstallationStore, TomlInstallationStore, ToolInstallations};
