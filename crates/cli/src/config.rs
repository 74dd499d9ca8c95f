//! CLI configuration file.
//!
//! ```toml
//! catalog = "/etc/codeql-env/codeql.json"
//! containers = ["docker", "kubernetes", "podman"]
//!
//! [node]
//! name = "ci-runner-1"
//! root = "/var/lib/codeql-env"
//! toolLocations = { "codeql-2.9" = "/opt/codeql-2.9" }
//!
//! [[installation]]
//! name = "codeql-2.9"
//! installer = { id = "2.9.0" }
//! ```
//!
//! The `[[installation]]` tables are read through
//! [`TomlInstallationStore`](codeql_env_core::tools::TomlInstallationStore).

use codeql_env_core::{ContainerDecorators, Node};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cli::{CONFIG_ENV, CliError};

/// Configuration file name under the user configuration directory.
pub const CONFIG_FILE: &str = "config.toml";

/// Settings read from the configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Installable catalog (JSON) used for automatic installation
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    /// Launcher decorator identities that denote container execution
    #[serde(default)]
    pub containers: Option<Vec<String>>,
    /// The machine this process runs on
    #[serde(default)]
    pub node: NodeConfig,
}

/// Local node settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Node display name
    #[serde(default)]
    pub name: Option<String>,
    /// Root directory tools are installed under
    #[serde(default)]
    pub root: Option<PathBuf>,
    /// Per-installation home overrides
    #[serde(default)]
    pub tool_locations: BTreeMap<String, String>,
}

impl Config {
    /// Default configuration file location.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("codeql-env").join(CONFIG_FILE))
    }

    /// Resolve the configuration file from an explicit path or the default location.
    ///
    /// # Errors
    ///
    /// Returns an error if no path is given and the platform has no configuration directory.
    pub fn resolve_path(explicit: Option<PathBuf>) -> Result<PathBuf, CliError> {
        explicit.or_else(Self::default_path).ok_or_else(|| {
            CliError::config_with_help(
                "No configuration directory available",
                format!("Pass --config or set {CONFIG_ENV}"),
            )
        })
    }

    /// Load the configuration; a missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, CliError> {
        if !path.exists() {
            tracing::debug!(path = ?path, "No configuration file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::config(format!("Failed to read {}: {e}", path.display())))?;
        Self::parse(&content)
            .map_err(|e| CliError::config(format!("Invalid configuration {}: {e}", path.display())))
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The local node described by this configuration.
    #[must_use]
    pub fn node(&self) -> Node {
        let root = self
            .node
            .root
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("codeql-env")))
            .unwrap_or_else(|| PathBuf::from(".codeql-env"));

        let mut node = Node::local(root);
        if let Some(name) = &self.node.name {
            node.name.clone_from(name);
        }
        node.tool_locations.clone_from(&self.node.tool_locations);
        node
    }

    /// Container identities, falling back to the built-in set.
    #[must_use]
    pub fn container_decorators(&self) -> ContainerDecorators {
        self.containers
            .as_ref()
            .map_or_else(ContainerDecorators::default, |ids| {
                ContainerDecorators::new(ids.iter().cloned())
            })
    }
}
