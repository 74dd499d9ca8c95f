//! Worker nodes that execute pipeline work
//!
//! A [`Node`] describes one worker machine as seen from the controller: its
//! name, the root directory tools are installed under, the system properties
//! it reported when it connected, and node-specific tool location overrides.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::environment::EnvConvention;

/// System property holding the operating system name (e.g. "Linux", "Mac OS X").
pub const OS_NAME_PROPERTY: &str = "os.name";

/// A worker machine capable of executing pipeline work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Display name of the node
    pub name: String,
    /// Root directory of the node's workspace; tools live under `<root>/tools`
    pub root: PathBuf,
    /// Properties reported by the node; `None` while the node is offline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_properties: Option<BTreeMap<String, String>>,
    /// Per-installation home overrides for this node, keyed by installation name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tool_locations: BTreeMap<String, String>,
}

impl Node {
    /// Create an offline node with no reported properties.
    #[must_use]
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            system_properties: None,
            tool_locations: BTreeMap::new(),
        }
    }

    /// Describe the machine this process runs on.
    #[must_use]
    pub fn local(root: impl Into<PathBuf>) -> Self {
        let mut properties = BTreeMap::new();
        properties.insert(OS_NAME_PROPERTY.to_string(), local_os_name().to_string());
        properties.insert("os.arch".to_string(), std::env::consts::ARCH.to_string());
        Self {
            name: "built-in".to_string(),
            root: root.into(),
            system_properties: Some(properties),
            tool_locations: BTreeMap::new(),
        }
    }

    /// Set the reported system properties.
    #[must_use]
    pub fn with_system_properties(mut self, properties: BTreeMap<String, String>) -> Self {
        self.system_properties = Some(properties);
        self
    }

    /// Set a single reported system property, marking the node online.
    #[must_use]
    pub fn with_system_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.system_properties
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Override where an installation lives on this node.
    #[must_use]
    pub fn with_tool_location(mut self, installation: impl Into<String>, home: impl Into<String>) -> Self {
        self.tool_locations.insert(installation.into(), home.into());
        self
    }

    /// Root directory of the node.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether the node has reported its system properties.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.system_properties.is_some()
    }

    /// The reported operating system name, if the node is online and reported one.
    #[must_use]
    pub fn os_name(&self) -> Option<&str> {
        self.system_properties
            .as_ref()
            .and_then(|props| props.get(OS_NAME_PROPERTY))
            .map(String::as_str)
    }

    /// Whether the node runs Windows. Unknown platforms are treated as Unix.
    #[must_use]
    pub fn is_windows(&self) -> bool {
        self.os_name()
            .is_some_and(|os| os.to_lowercase().contains("windows"))
    }

    /// Variable naming and path list rules on this node.
    #[must_use]
    pub fn env_convention(&self) -> EnvConvention {
        if self.is_windows() {
            EnvConvention::Windows
        } else {
            EnvConvention::Unix
        }
    }

    /// Separator between entries of PATH-like variables on this node.
    #[must_use]
    pub fn path_separator(&self) -> char {
        self.env_convention().path_separator()
    }

    /// Translate an installation home for execution on this node.
    ///
    /// Returns the node's override for `installation` when one is configured,
    /// otherwise `home` unchanged.
    #[must_use]
    pub fn translate_tool_home(&self, installation: &str, home: &str) -> String {
        self.tool_locations
            .get(installation)
            .cloned()
            .unwrap_or_else(|| home.to_string())
    }
}

/// Operating system name in the form nodes report it.
#[must_use]
pub fn local_os_name() -> &'static str {
    match std::env::consts::OS {
        "linux" => "Linux",
        "macos" => "Mac OS X",
        "windows" => "Windows",
        "freebsd" => "FreeBSD",
        "solaris" | "illumos" => "SunOS",
        other => other,
    }
}
