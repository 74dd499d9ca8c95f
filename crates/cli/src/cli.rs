use clap::{Parser, Subcommand};
use miette::{Diagnostic, Report};
use std::io::{self, Write};
use std::path::PathBuf;
use thiserror::Error;

use crate::tracing::{LogLevel, TracingFormat};

/// Exit codes for the CLI application
pub const EXIT_OK: i32 = 0;
/// CLI or configuration error exit code
pub const EXIT_CLI: i32 = 2;
/// Installation or execution error exit code
pub const EXIT_EXEC: i32 = 3;

/// Environment variable naming the configuration file
pub const CONFIG_ENV: &str = "CODEQL_ENV_CONFIG";

/// CLI-specific error types with proper exit code mapping
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// CLI or configuration error (exit code 2)
    #[error("CLI/configuration error: {message}")]
    #[diagnostic(code(codeql_env::cli::config))]
    Config {
        /// The error message
        message: String,
        /// Optional help text
        #[help]
        help: Option<String>,
    },
    /// Installing or running failed (exit code 3)
    #[error(transparent)]
    #[diagnostic(transparent)]
    Core(#[from] codeql_env_core::Error),
    /// Other unexpected error (exit code 3)
    #[error("Unexpected error: {message}")]
    #[diagnostic(code(codeql_env::cli::other))]
    Other {
        /// The error message
        message: String,
    },
}

impl CliError {
    /// Create a new configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a new configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create a new other error
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other {
            message: message.into(),
        }
    }
}

/// Exit code for an error
#[must_use]
pub fn exit_code_for(err: &CliError) -> i32 {
    match err {
        CliError::Config { .. } => EXIT_CLI,
        CliError::Core(e) if e.is_configuration_fault() => EXIT_CLI,
        CliError::Core(_) | CliError::Other { .. } => EXIT_EXEC,
    }
}

/// Render an error to stderr
#[allow(clippy::print_stderr)]
pub fn render_error(err: CliError) {
    let report = Report::new(err);
    eprintln!("{report:?}");
    let _ = io::stderr().flush();
}

/// Install CodeQL and run commands with it on `PATH`.
#[derive(Parser, Debug)]
#[command(name = "codeql-env")]
#[command(about = "Install CodeQL CLI releases and run commands with CodeQL on PATH")]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub log_level: LogLevel,

    /// Log output format.
    #[arg(long, global = true, help = "Log output format", default_value = "compact", value_enum)]
    pub log_format: TracingFormat,

    /// Configuration file.
    #[arg(
        short,
        long,
        global = true,
        env = CONFIG_ENV,
        help = "Path to the configuration file"
    )]
    pub config: Option<PathBuf>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// List configured CodeQL installations
    #[command(about = "List configured CodeQL installations")]
    List,
    /// Install a configured installation on this machine
    #[command(about = "Install a configured CodeQL installation and print its home")]
    Install {
        /// Installation name
        name: String,
    },
    /// Run a command with a CodeQL installation on PATH
    #[command(about = "Run a command with a CodeQL installation on PATH")]
    Exec {
        /// Installation to expose; when omitted the command runs with the inherited PATH
        #[arg(long)]
        codeql: Option<String>,
        /// Launcher decorator wrapping the command (e.g. docker)
        #[arg(long = "decorator", value_name = "ID")]
        decorators: Vec<String>,
        /// Command and arguments
        #[arg(trailing_var_arg = true, required = true, num_args = 1..)]
        command: Vec<String>,
    },
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}
