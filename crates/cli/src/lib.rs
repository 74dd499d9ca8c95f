//! codeql-env command-line interface
//!
//! Installs configured CodeQL CLI releases and runs commands with an
//! installation on `PATH`.

// CLI output goes to stdout/stderr by design
#![allow(clippy::print_stdout, clippy::print_stderr)]

/// CLI argument parsing and exit codes.
pub mod cli;
/// Command implementations.
pub mod commands;
/// Configuration file.
pub mod config;
/// Tracing and logging configuration.
pub mod tracing;

pub use cli::{CliError, Cli, Commands, EXIT_CLI, EXIT_EXEC, EXIT_OK, exit_code_for, render_error};
pub use commands::Workspace;
pub use config::Config;

use ::tracing::Instrument;
use commands::exec::ExecOptions;

/// Run a parsed command line and return the process exit code.
pub async fn run(cli: Cli) -> i32 {
    let span = tracing::session_span(command_name(&cli.command));
    match dispatch(cli).instrument(span).await {
        Ok(code) => code,
        Err(err) => {
            let code = exit_code_for(&err);
            render_error(err);
            code
        }
    }
}

fn command_name(command: &Commands) -> &'static str {
    match command {
        Commands::List => "list",
        Commands::Install { .. } => "install",
        Commands::Exec { .. } => "exec",
    }
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    let config_path = Config::resolve_path(cli.config)?;
    let workspace = Workspace::load(&config_path)?;

    match cli.command {
        Commands::List => {
            let listing = commands::list::execute(&workspace);
            if !listing.is_empty() {
                println!("{listing}");
            }
            Ok(EXIT_OK)
        }
        Commands::Install { name } => {
            let home = commands::install::execute(&workspace, &name).await?;
            println!("{}", home.display());
            Ok(EXIT_OK)
        }
        Commands::Exec {
            codeql,
            decorators,
            command,
        } => {
            commands::exec::execute(
                &workspace,
                ExecOptions {
                    codeql,
                    decorators,
                    command,
                },
            )
            .await
        }
    }
}
