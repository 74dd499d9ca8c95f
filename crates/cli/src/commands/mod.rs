//! Command implementations.

pub mod exec;
pub mod install;
pub mod list;

use async_trait::async_trait;
use codeql_env_core::tools::{ToolInstallation, ToolInstallations, ToolInstaller, TomlInstallationStore};
use codeql_env_core::Node;
use codeql_env_tools_codeql::{CodeQLInstaller, JsonCatalog};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::OnceCell;

use crate::cli::CliError;
use crate::config::Config;

/// Everything a command needs, loaded from the configuration file.
#[derive(Debug)]
pub struct Workspace {
    /// Configuration file the settings were read from
    pub config_path: PathBuf,
    /// Parsed settings
    pub config: Config,
    /// Configured installations
    pub installations: Arc<ToolInstallations>,
}

impl Workspace {
    /// Load the configuration and installation registry from `config_path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(config_path: &Path) -> Result<Self, CliError> {
        let config = Config::load(config_path)?;
        let store = Arc::new(TomlInstallationStore::new(config_path));
        let installations = Arc::new(ToolInstallations::load(store)?);
        tracing::debug!(
            path = ?config_path,
            installations = installations.len(),
            "Loaded configuration"
        );
        Ok(Self {
            config_path: config_path.to_path_buf(),
            config,
            installations,
        })
    }

    /// Installer backed by the configured catalog, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read or the HTTP client
    /// cannot be created.
    pub fn installer(&self) -> Result<Option<Arc<CodeQLInstaller>>, CliError> {
        let Some(catalog) = &self.config.catalog else {
            return Ok(None);
        };
        let catalog = self.resolve_relative(catalog);
        let catalog = Arc::new(JsonCatalog::from_path(&catalog)?);
        Ok(Some(Arc::new(CodeQLInstaller::new(catalog)?)))
    }

    /// Installer that reads the configured catalog only when an installation
    /// actually needs installing.
    #[must_use]
    pub fn deferred_installer(&self) -> Option<Arc<DeferredInstaller>> {
        let catalog = self.config.catalog.as_deref()?;
        Some(Arc::new(DeferredInstaller::new(self.resolve_relative(catalog))))
    }

    /// Resolve `path` relative to the configuration file's directory.
    fn resolve_relative(&self, path: &Path) -> PathBuf {
        match self.config_path.parent() {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

/// [`CodeQLInstaller`] built from a catalog file on first use.
///
/// A missing or malformed catalog only fails the installations that need it.
#[derive(Debug)]
pub struct DeferredInstaller {
    catalog: PathBuf,
    installer: OnceCell<CodeQLInstaller>,
}

impl DeferredInstaller {
    /// Create an installer that will read `catalog` when first needed.
    #[must_use]
    pub fn new(catalog: PathBuf) -> Self {
        Self {
            catalog,
            installer: OnceCell::new(),
        }
    }

    async fn installer(&self) -> codeql_env_core::Result<&CodeQLInstaller> {
        self.installer
            .get_or_try_init(|| async {
                tracing::debug!(catalog = ?self.catalog, "Loading installable catalog");
                let catalog = Arc::new(JsonCatalog::from_path(&self.catalog)?);
                CodeQLInstaller::new(catalog)
            })
            .await
    }
}

#[async_trait]
impl ToolInstaller for DeferredInstaller {
    fn name(&self) -> &'static str {
        "codeql"
    }

    fn description(&self) -> &'static str {
        "Install CodeQL CLI releases from a catalog file"
    }

    async fn perform_installation(
        &self,
        installation: &ToolInstallation,
        node: &Node,
    ) -> codeql_env_core::Result<PathBuf> {
        self.installer()
            .await?
            .perform_installation(installation, node)
            .await
    }
}
