//! Error types for codeql-env core operations

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::Path;
use thiserror::Error;

/// Error type for tool installation and scoped execution
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// A named installation is not registered
    #[error("Could not find specified CodeQL installation '{name}'")]
    #[diagnostic(
        code(codeql_env::installation_not_found),
        help("Register the installation in the configuration file or pick one of the configured names")
    )]
    InstallationNotFound {
        /// The requested installation name
        name: String,
    },

    /// The node for the current execution could not be obtained
    #[error("Could not obtain the node for the current execution: {message}")]
    #[diagnostic(code(codeql_env::node_unavailable))]
    NodeUnavailable {
        /// Why the node is unavailable
        message: String,
    },

    /// Invalid or inconsistent configuration
    #[error("Configuration error: {message}")]
    #[diagnostic(code(codeql_env::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// I/O error with optional path context
    #[error("I/O {operation} failed{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(
        code(codeql_env::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
        /// Path that caused the error, if available
        path: Option<Box<Path>>,
        /// Operation that failed (e.g., "read", "unpack", "chmod")
        operation: String,
    },

    /// Downloading an archive failed
    #[error("Failed to download {url}: {message}")]
    #[diagnostic(code(codeql_env::download))]
    Download {
        /// The URL that was requested
        url: String,
        /// Error message
        message: String,
    },

    /// Unpacking a downloaded archive failed
    #[error("Failed to unpack {archive}: {message}")]
    #[diagnostic(code(codeql_env::unpack))]
    Unpack {
        /// Archive name or URL
        archive: String,
        /// Error message
        message: String,
    },

    /// Reading or writing persisted configuration failed
    #[error("Serialization error: {message}")]
    #[diagnostic(code(codeql_env::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },

    /// The nested unit of work was cancelled before it completed
    #[error("Execution was cancelled")]
    #[diagnostic(code(codeql_env::cancelled))]
    Cancelled,

    /// The nested unit of work panicked
    #[error("Nested execution panicked: {message}")]
    #[diagnostic(code(codeql_env::body_panicked))]
    BodyPanicked {
        /// Panic payload, when it was a string
        message: String,
    },
}

impl Error {
    /// Create an installation-not-found error
    #[must_use]
    pub fn installation_not_found(name: impl Into<String>) -> Self {
        Self::InstallationNotFound { name: name.into() }
    }

    /// Create a node-unavailable error
    #[must_use]
    pub fn node_unavailable(message: impl Into<String>) -> Self {
        Self::NodeUnavailable {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create an I/O error with path context
    #[must_use]
    pub fn io(
        source: std::io::Error,
        path: impl AsRef<Path>,
        operation: impl Into<String>,
    ) -> Self {
        Self::Io {
            source,
            path: Some(path.as_ref().into()),
            operation: operation.into(),
        }
    }

    /// Create an I/O error without path context
    #[must_use]
    pub fn io_no_path(source: std::io::Error, operation: impl Into<String>) -> Self {
        Self::Io {
            source,
            path: None,
            operation: operation.into(),
        }
    }

    /// Create a download error
    #[must_use]
    pub fn download(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Download {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an unpack error
    #[must_use]
    pub fn unpack(archive: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unpack {
            archive: archive.into(),
            message: message.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }

    /// Whether this error is a configuration fault that must stop the pipeline
    #[must_use]
    pub fn is_configuration_fault(&self) -> bool {
        matches!(
            self,
            Self::InstallationNotFound { .. } | Self::NodeUnavailable { .. } | Self::Configuration { .. }
        )
    }
}

/// Result type for codeql-env core operations
pub type Result<T> = std::result::Result<T, Error>;
