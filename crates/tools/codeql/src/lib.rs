//! CodeQL CLI installer for codeql-env
//!
//! Installs CodeQL CLI bundles from a catalog of installable releases:
//! - Platform-specific archive selection from the node's `os.name`
//! - Automatic archive extraction (zip, tar.gz)
//! - Idempotent installs tracked by an `.installedFrom` marker

mod catalog;
mod download;
mod extract;
mod platform;

pub use catalog::{Installable, InstallableCatalog, JsonCatalog};
pub use download::{Downloader, HttpDownloader};
pub use extract::{ArchiveFormat, INSTALLED_FROM, is_up_to_date, mark_executable, unpack};
pub use platform::{PlatformArchive, archive_suffix};

use async_trait::async_trait;
use codeql_env_core::tools::{ToolInstallation, ToolInstaller, preferred_location};
use codeql_env_core::{Error, Node, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

/// Installs CodeQL CLI releases listed in a catalog.
pub struct CodeQLInstaller {
    catalog: Arc<dyn InstallableCatalog>,
    downloader: Arc<dyn Downloader>,
}

impl CodeQLInstaller {
    /// Create an installer reading from `catalog` and fetching over HTTP.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(catalog: Arc<dyn InstallableCatalog>) -> Result<Self> {
        Ok(Self::with_downloader(catalog, Arc::new(HttpDownloader::new()?)))
    }

    /// Create an installer with a custom downloader.
    #[must_use]
    pub fn with_downloader(
        catalog: Arc<dyn InstallableCatalog>,
        downloader: Arc<dyn Downloader>,
    ) -> Self {
        Self {
            catalog,
            downloader,
        }
    }
}

impl std::fmt::Debug for CodeQLInstaller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodeQLInstaller").finish_non_exhaustive()
    }
}

#[async_trait]
impl ToolInstaller for CodeQLInstaller {
    fn name(&self) -> &'static str {
        "codeql"
    }

    fn description(&self) -> &'static str {
        "Install CodeQL CLI releases from GitHub"
    }

    async fn perform_installation(
        &self,
        installation: &ToolInstallation,
        node: &Node,
    ) -> Result<PathBuf> {
        let dir = preferred_location(installation, node);

        let id = installation.installer().map(|spec| spec.id.as_str()).unwrap_or_default();
        let Some(installable) = self.catalog.find(id)? else {
            info!(tool = installation.name(), "Invalid tool ID {id}");
            return Ok(dir);
        };
        let installable = installable.for_node(node);

        if is_up_to_date(&dir, &installable.url) {
            debug!(tool = installation.name(), ?dir, "Installation is up to date");
            return Ok(dir);
        }

        info!(
            tool = installation.name(),
            url = %installable.url,
            node = %node.name,
            "Unpacking {} to {}",
            installable.url,
            dir.display()
        );

        let data = self.downloader.download(&installable.url).await?;

        let target = dir.clone();
        let url = installable.url.clone();
        tokio::task::spawn_blocking(move || {
            unpack(&data, &url, &target)?;
            mark_executable(&target)
        })
        .await
        .map_err(|e| Error::unpack(&installable.url, format!("Unpack task failed: {e}")))??;

        info!(tool = installation.name(), ?dir, "Installed CodeQL {}", installable.id);
        Ok(dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_installer_name() {
        let installer = CodeQLInstaller::with_downloader(
            Arc::new(JsonCatalog::default()),
            Arc::new(HttpDownloader::with_client(reqwest::Client::new())),
        );
        assert_eq!(installer.name(), "codeql");
        assert!(!installer.description().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_returns_preferred_location() {
        let installer = CodeQLInstaller::with_downloader(
            Arc::new(JsonCatalog::default()),
            Arc::new(HttpDownloader::with_client(reqwest::Client::new())),
        );
        let node = Node::new("agent", "/srv/agent");
        let installation = ToolInstallation::new("codeql", "").with_installer("9.9.9");

        let dir = installer.perform_installation(&installation, &node).await.unwrap();
        assert_eq!(dir, PathBuf::from("/srv/agent/tools/codeql/codeql"));
    }
}
