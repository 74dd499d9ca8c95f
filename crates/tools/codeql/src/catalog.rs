//! Installable CodeQL distributions.
//!
//! The catalog uses the downloadable metadata format published for tool
//! installers:
//!
//! ```json
//! {"list": [{"id": "2.9.0", "name": "CodeQL 2.9.0",
//!            "url": "https://github.com/github/codeql-cli-binaries/releases/download/v2.9.0/"}]}
//! ```

use codeql_env_core::{Error, Node, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use crate::platform::PlatformArchive;

/// One installable distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installable {
    /// Catalog id (e.g. "2.9.0")
    pub id: String,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Download URL; for CodeQL releases the base URL the archive name is appended to
    pub url: String,
}

impl Installable {
    /// Specialize the download URL for `node`.
    ///
    /// Appends the archive matching the node's reported operating system. An
    /// offline node leaves the URL untouched; an unrecognized operating
    /// system appends nothing.
    #[must_use]
    pub fn for_node(&self, node: &Node) -> Self {
        let Some(os_name) = node.os_name() else {
            debug!(node = %node.name, "Node properties unavailable, leaving URL unsuffixed");
            return self.clone();
        };

        let archive = match PlatformArchive::select(os_name) {
            Some(archive) => archive.archive_name(),
            None => {
                warn!(node = %node.name, os = os_name, "No CodeQL archive for platform");
                String::new()
            }
        };

        Self {
            id: self.id.clone(),
            name: self.name.clone(),
            url: format!("{}{}", self.url, archive),
        }
    }
}

/// Source of installable records.
pub trait InstallableCatalog: Send + Sync {
    /// Find the installable with the given id.
    ///
    /// # Errors
    ///
    /// Returns an error if the catalog cannot be read.
    fn find(&self, id: &str) -> Result<Option<Installable>>;
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    list: Vec<Installable>,
}

/// Catalog held in memory, parsed from the JSON metadata format.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    installables: Vec<Installable>,
}

impl JsonCatalog {
    /// Catalog of the given installables.
    #[must_use]
    pub fn new(installables: Vec<Installable>) -> Self {
        Self { installables }
    }

    /// Parse catalog metadata.
    ///
    /// # Errors
    ///
    /// Returns an error if the metadata is not valid JSON of the expected shape.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(json)
            .map_err(|e| Error::serialization(format!("invalid installable metadata: {e}")))?;
        Ok(Self::new(file.list))
    }

    /// Read catalog metadata from a file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| Error::io(e, path, "read"))?;
        Self::from_json(&json)
    }

    /// All installables, in catalog order.
    #[must_use]
    pub fn installables(&self) -> &[Installable] {
        &self.installables
    }
}

impl InstallableCatalog for JsonCatalog {
    fn find(&self, id: &str) -> Result<Option<Installable>> {
        Ok(self.installables.iter().find(|i| i.id == id).cloned())
    }
}
