//! Tool installation registry.
//!
//! This module provides the process-wide list of configured installations,
//! allowing installations to be looked up by name and the list to be
//! replaced and persisted through an [`InstallationStore`].

use parking_lot::RwLock;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::installation::ToolInstallation;
use crate::{Error, Result};

/// Persistence boundary for the installation list.
pub trait InstallationStore: Send + Sync {
    /// Load the persisted installations.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted list cannot be read or parsed.
    fn load(&self) -> Result<Vec<ToolInstallation>>;

    /// Persist the given installations, replacing the stored list.
    ///
    /// # Errors
    ///
    /// Returns an error if the list cannot be written.
    fn save(&self, installations: &[ToolInstallation]) -> Result<()>;
}

/// Key of the `[[installation]]` tables.
const INSTALLATION_KEY: &str = "installation";

/// On-disk shape of the installation list.
#[derive(Debug, Default, Deserialize)]
struct InstallationsFile {
    #[serde(default, rename = "installation")]
    installations: Vec<ToolInstallation>,
}

/// Stores installations as `[[installation]]` tables in a TOML file.
#[derive(Debug, Clone)]
pub struct TomlInstallationStore {
    path: PathBuf,
}

impl TomlInstallationStore {
    /// Create a store backed by the file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl InstallationStore for TomlInstallationStore {
    fn load(&self) -> Result<Vec<ToolInstallation>> {
        if !self.path.exists() {
            tracing::debug!(path = ?self.path, "No installation file, starting empty");
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| Error::io(e, &self.path, "read"))?;
        let file: InstallationsFile = toml::from_str(&content).map_err(|e| {
            Error::serialization(format!("{}: {e}", self.path.display()))
        })?;
        Ok(file.installations)
    }

    fn save(&self, installations: &[ToolInstallation]) -> Result<()> {
        // Other top-level settings sharing the file are preserved
        let mut document = if self.path.exists() {
            let content = std::fs::read_to_string(&self.path)
                .map_err(|e| Error::io(e, &self.path, "read"))?;
            toml::from_str::<toml::Table>(&content).map_err(|e| {
                Error::serialization(format!("{}: {e}", self.path.display()))
            })?
        } else {
            toml::Table::new()
        };
        if installations.is_empty() {
            document.remove(INSTALLATION_KEY);
        } else {
            let value = toml::Value::try_from(installations)
                .map_err(|e| Error::serialization(e.to_string()))?;
            document.insert(INSTALLATION_KEY.to_string(), value);
        }
        let content = toml::to_string_pretty(&document)
            .map_err(|e| Error::serialization(e.to_string()))?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| Error::io(e, parent, "create"))?;
        }
        std::fs::write(&self.path, content).map_err(|e| Error::io(e, &self.path, "write"))?;
        tracing::debug!(path = ?self.path, count = installations.len(), "Saved installations");
        Ok(())
    }
}

/// Ordered, named collection of configured installations.
///
/// Readers take a shared lock and work on copies; replacing the list is a
/// rare administrative operation.
#[derive(Default)]
pub struct ToolInstallations {
    installations: RwLock<Vec<ToolInstallation>>,
    store: Option<Arc<dyn InstallationStore>>,
}

impl ToolInstallations {
    /// Create an in-memory registry.
    #[must_use]
    pub fn new(installations: Vec<ToolInstallation>) -> Self {
        Self {
            installations: RwLock::new(installations),
            store: None,
        }
    }

    /// Load the registry once from `store`; later updates are saved back to it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn load(store: Arc<dyn InstallationStore>) -> Result<Self> {
        let installations = store.load()?;
        tracing::debug!(count = installations.len(), "Loaded tool installations");
        Ok(Self {
            installations: RwLock::new(installations),
            store: Some(store),
        })
    }

    /// Snapshot of the configured installations.
    #[must_use]
    pub fn installations(&self) -> Vec<ToolInstallation> {
        self.installations.read().clone()
    }

    /// Replace the configured installations and persist them.
    ///
    /// # Errors
    ///
    /// Returns an error if the store rejects the new list. The in-memory list
    /// is only replaced once the save succeeded.
    pub fn set_installations(&self, installations: Vec<ToolInstallation>) -> Result<()> {
        let mut guard = self.installations.write();
        if let Some(store) = &self.store {
            store.save(&installations)?;
        }
        *guard = installations;
        Ok(())
    }

    /// Find an installation by exact name. The first match wins.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<ToolInstallation> {
        self.installations
            .read()
            .iter()
            .find(|i| i.name() == name)
            .cloned()
    }

    /// Resolve an installation by exact name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InstallationNotFound`] if no installation has that name.
    pub fn resolve(&self, name: &str) -> Result<ToolInstallation> {
        let installation = self
            .find(name)
            .ok_or_else(|| Error::installation_not_found(name))?;
        tracing::debug!(
            name = installation.name(),
            home = installation.home(),
            "Found CodeQL installation"
        );
        Ok(installation)
    }

    /// Names of all configured installations, in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.installations
            .read()
            .iter()
            .map(|i| i.name().to_string())
            .collect()
    }

    /// Get the number of configured installations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.installations.read().len()
    }

    /// Check if no installations are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.installations.read().is_empty()
    }
}

impl std::fmt::Debug for ToolInstallations {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolInstallations")
            .field("installations", &self.names())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}
