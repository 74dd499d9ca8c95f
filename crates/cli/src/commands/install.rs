//! `codeql-env install <name>`

use codeql_env_core::tools::ToolInstaller;
use std::path::PathBuf;

use crate::cli::CliError;
use crate::commands::Workspace;

/// Install the named installation on the local node and return its home.
///
/// An installation without an installer is only translated for the node.
///
/// # Errors
///
/// Returns an error if the installation is unknown, an installer is needed
/// but no catalog is configured, or the installation fails.
pub async fn execute(workspace: &Workspace, name: &str) -> Result<PathBuf, CliError> {
    let installation = workspace.installations.resolve(name)?;
    let node = workspace.config.node();

    if installation.installer().is_none() {
        tracing::info!(installation = name, "No installer configured, using the configured home");
        return Ok(PathBuf::from(installation.for_node(&node).home()));
    }

    let installer = workspace.installer()?.ok_or_else(|| {
        CliError::config_with_help(
            format!("Installation '{name}' needs an installer but no catalog is configured"),
            "Set `catalog` in the configuration file to a CodeQL installable list",
        )
    })?;

    Ok(installer.perform_installation(&installation, &node).await?)
}
