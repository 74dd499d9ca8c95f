//! Installer trait for automatic tool installation.

use async_trait::async_trait;
use std::path::PathBuf;

use super::installation::ToolInstallation;
use crate::Result;
use crate::node::Node;

/// Identifier of the CodeQL tool type, used in default install locations.
pub const TOOL_TYPE_ID: &str = "codeql";

/// Installs a tool distribution onto a node.
///
/// Implementations must be idempotent: installing an installation that is
/// already present and current on the node does no network work.
#[async_trait]
pub trait ToolInstaller: Send + Sync {
    /// Installer name (e.g., "github").
    fn name(&self) -> &'static str;

    /// Human-readable description for help text.
    fn description(&self) -> &'static str;

    /// Ensure `installation` is present on `node` and return its home directory.
    ///
    /// # Errors
    ///
    /// Returns an error if downloading or unpacking the distribution fails.
    async fn perform_installation(
        &self,
        installation: &ToolInstallation,
        node: &Node,
    ) -> Result<PathBuf>;
}

/// Directory an installer should install `installation` into on `node`.
///
/// Installations without a home go to `<root>/tools/codeql/<name>`; a
/// relative home is placed under `<root>/tools` and an absolute home is used
/// as is.
#[must_use]
pub fn preferred_location(installation: &ToolInstallation, node: &Node) -> PathBuf {
    let tools = node.root().join("tools");
    let home = installation.home().trim();
    if home.is_empty() {
        tools
            .join(sanitize(TOOL_TYPE_ID))
            .join(sanitize(installation.name()))
    } else {
        tools.join(home)
    }
}

/// Replace characters that are unsafe in a directory name with `_`.
#[must_use]
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
