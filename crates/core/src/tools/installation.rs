//! Configured tool installations.

use serde::{Deserialize, Serialize};

use crate::environment::{Environment, EnvironmentOverlay};
use crate::node::Node;

/// Variable whose `+` form prepends the installation home to `PATH`.
pub const PATH_ENTRY: &str = "PATH+CODEQL";

/// Variable exposing the installation home to nested work.
pub const HOME_VARIABLE: &str = "CODEQL_CLI_HOME";

/// Reference to an installable distribution the installation can be
/// installed from automatically.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallerSpec {
    /// Installable id in the catalog (e.g. "2.9.0")
    pub id: String,
}

/// A named CodeQL installation.
///
/// Instances are immutable; [`ToolInstallation::for_node`] and
/// [`ToolInstallation::for_environment`] return specialized copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "InstallationRecord", into = "InstallationRecord")]
pub struct ToolInstallation {
    name: String,
    home: String,
    installer: Option<InstallerSpec>,
}

impl ToolInstallation {
    /// Create an installation. A single trailing `/` or `\` is stripped from `home`.
    #[must_use]
    pub fn new(name: impl Into<String>, home: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            home: launder_home(home.into()),
            installer: None,
        }
    }

    /// Install automatically from the given installable id.
    #[must_use]
    pub fn with_installer(mut self, id: impl Into<String>) -> Self {
        self.installer = Some(InstallerSpec { id: id.into() });
        self
    }

    /// Installation name, the registry lookup key.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Installation home directory.
    #[must_use]
    pub fn home(&self) -> &str {
        &self.home
    }

    /// Automatic installer configured for this installation.
    #[must_use]
    pub fn installer(&self) -> Option<&InstallerSpec> {
        self.installer.as_ref()
    }

    /// Copy of this installation with a different home.
    #[must_use]
    pub fn with_home(&self, home: impl Into<String>) -> Self {
        Self {
            name: self.name.clone(),
            home: launder_home(home.into()),
            installer: self.installer.clone(),
        }
    }

    /// Copy of this installation with its home translated for `node`.
    #[must_use]
    pub fn for_node(&self, node: &Node) -> Self {
        self.with_home(node.translate_tool_home(&self.name, &self.home))
    }

    /// Copy of this installation with variable references in its home expanded.
    #[must_use]
    pub fn for_environment(&self, environment: &Environment) -> Self {
        self.with_home(environment.expand(&self.home))
    }

    /// Bindings exposing this installation to nested work.
    #[must_use]
    pub fn build_env_vars(&self) -> EnvironmentOverlay {
        home_overlay(&self.home)
    }
}

/// Overlay binding both installation variables to `home`; an empty home
/// clears the home variable and leaves `PATH` alone.
pub(crate) fn home_overlay(home: &str) -> EnvironmentOverlay {
    EnvironmentOverlay::new()
        .with(PATH_ENTRY, home)
        .with(HOME_VARIABLE, home)
}

fn launder_home(mut home: String) -> String {
    if home.ends_with(['/', '\\']) {
        home.pop();
    }
    home
}

/// Persisted shape of an installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct InstallationRecord {
    name: String,
    #[serde(default)]
    home: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    installer: Option<InstallerSpec>,
}

impl From<InstallationRecord> for ToolInstallation {
    fn from(record: InstallationRecord) -> Self {
        Self {
            name: record.name,
            home: launder_home(record.home),
            installer: record.installer,
        }
    }
}

impl From<ToolInstallation> for InstallationRecord {
    fn from(installation: ToolInstallation) -> Self {
        Self {
            name: installation.name,
            home: installation.home,
            installer: installation.installer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_separator_is_stripped() {
        assert_eq!(ToolInstallation::new("a", "/opt/codeql/").home(), "/opt/codeql");
        assert_eq!(ToolInstallation::new("a", "C:\\codeql\\").home(), "C:\\codeql");
        assert_eq!(ToolInstallation::new("a", "/opt/codeql").home(), "/opt/codeql");
        assert_eq!(ToolInstallation::new("a", "").home(), "");
    }

    #[test]
    fn test_for_node_then_environment() {
        let installation = ToolInstallation::new("codeql-2.9", "${TOOLS}/codeql/");
        let node = Node::new("agent", "/srv/agent");
        let mut env = Environment::new();
        env.set("TOOLS", "/opt");

        let specialized = installation.for_node(&node).for_environment(&env);
        assert_eq!(specialized.home(), "/opt/codeql");
        assert_eq!(specialized.name(), "codeql-2.9");
        // The source installation is unchanged
        assert_eq!(installation.home(), "${TOOLS}/codeql");
    }

    #[test]
    fn test_end_to_end_node_translation() {
        let installation = ToolInstallation::new("codeql-2.9", "/opt/codeql/");
        let node = Node::new("agent", "/srv/agent").with_tool_location("codeql-2.9", "/mnt/agent/codeql-2.9");

        let specialized = installation
            .for_node(&node)
            .for_environment(&Environment::new());
        assert_eq!(specialized.home(), "/mnt/agent/codeql-2.9");
    }

    #[test]
    fn test_build_env_vars() {
        let overlay = ToolInstallation::new("codeql", "/opt/codeql/").build_env_vars();
        assert_eq!(overlay.len(), 2);
        assert_eq!(overlay.get(PATH_ENTRY), Some("/opt/codeql"));
        assert_eq!(overlay.get(HOME_VARIABLE), Some("/opt/codeql"));
    }

    #[test]
    fn test_deserialize_launders_home() {
        let installation: ToolInstallation =
            toml::from_str("name = \"codeql\"\nhome = \"/opt/codeql/\"\ninstaller = { id = \"2.9.0\" }\n")
                .unwrap();
        assert_eq!(installation.home(), "/opt/codeql");
        assert_eq!(installation.installer().map(|i| i.id.as_str()), Some("2.9.0"));
    }
}
