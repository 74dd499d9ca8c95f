//! `codeql-env list`

use crate::commands::Workspace;

/// Render the configured installations, one per line.
#[must_use]
pub fn execute(workspace: &Workspace) -> String {
    workspace
        .installations
        .installations()
        .iter()
        .map(|installation| {
            let mut line = installation.name().to_string();
            if !installation.home().is_empty() {
                line.push('\t');
                line.push_str(installation.home());
            }
            if let Some(spec) = installation.installer() {
                line.push_str(&format!("\t(installs {})", spec.id));
            }
            line
        })
        .collect::<Vec<_>>()
        .join("\n")
}
