//! Core types for codeql-env
//!
//! This crate provides:
//! - [`tools`] - Configured CodeQL installations, their registry and the installer trait
//! - [`environment`] - Environments, overlays and expander chains
//! - [`node`] - Worker nodes and node-specific path translation
//! - [`context`] - The ambient state of one unit of pipeline work
//! - [`step`] - Scoped execution of nested work with an installation on `PATH`

pub mod context;
pub mod environment;
mod error;
pub mod node;
pub mod step;
pub mod tools;

pub use context::{
    BufferSink, ContainerDecorators, ExecutionContext, Launcher, LauncherDecorator, OutputSink,
    StderrSink,
};
pub use environment::{EnvConvention, Environment, EnvironmentExpander, EnvironmentOverlay};
pub use error::{Error, Result};
pub use node::Node;
pub use step::{BodyError, BodyExecution, Completion, SkipReason, ToolResolution, WithCodeQL};
