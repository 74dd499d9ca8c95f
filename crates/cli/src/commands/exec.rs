//! `codeql-env exec [--codeql <name>] [--decorator <id>]... -- <command> [args]`
//!
//! Runs a command with the requested installation's home prepended to
//! `PATH` and `CODEQL_CLI_HOME` set, as nested pipeline work sees them.

use codeql_env_core::{
    BodyError, Environment, ExecutionContext, Launcher, LauncherDecorator, StderrSink, WithCodeQL,
};
use std::fmt;
use std::sync::Arc;
use tokio::process::Command;

use crate::cli::CliError;
use crate::commands::Workspace;

/// Exit code for SIGINT (128 + signal number 2)
pub const EXIT_SIGINT: i32 = 130;

/// A command that ran but did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandExit {
    /// Exit code the process should report
    pub code: i32,
}

impl fmt::Display for CommandExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command exited with code {}", self.code)
    }
}

impl std::error::Error for CommandExit {}

/// Options of one `exec` invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecOptions {
    /// Installation to expose
    pub codeql: Option<String>,
    /// Launcher decorators wrapping the command
    pub decorators: Vec<String>,
    /// Program followed by its arguments
    pub command: Vec<String>,
}

/// Run the command under the scoped environment and return its exit code.
///
/// # Errors
///
/// Returns an error if the installation cannot be resolved or the command
/// cannot be started.
pub async fn execute(workspace: &Workspace, options: ExecOptions) -> Result<i32, CliError> {
    let Some((program, args)) = options.command.split_first() else {
        return Err(CliError::config("No command given"));
    };
    let program = program.clone();
    let args = args.to_vec();

    let launcher = options
        .decorators
        .iter()
        .fold(Launcher::host(), |launcher, id| {
            launcher.with_decorator(LauncherDecorator::new(id.as_str()))
        });
    let ctx = ExecutionContext::new(Environment::from_process(), Arc::new(StderrSink))
        .with_node(Arc::new(workspace.config.node()))
        .with_launcher(launcher);

    let mut wrapper = WithCodeQL::new(workspace.installations.clone())
        .with_container_decorators(workspace.config.container_decorators());
    if let Some(installer) = workspace.deferred_installer() {
        wrapper = wrapper.with_installer(installer);
    }

    let mut execution = wrapper
        .start(options.codeql.as_deref(), &ctx, move |child| {
            run_command(child, program, args)
        })
        .await?;

    let finished = tokio::select! {
        completion = &mut execution => Some(completion),
        _ = tokio::signal::ctrl_c() => None,
    };
    let Some(completion) = finished else {
        tracing::info!("Interrupted, stopping command");
        execution.cancel();
        // Dropping the aborted body kills the child before the process exits
        let _ = execution.await;
        return Ok(EXIT_SIGINT);
    };

    match completion {
        Ok(()) => Ok(0),
        Err(e) => match e.downcast_ref::<CommandExit>() {
            Some(exit) => Ok(exit.code),
            None => Err(CliError::other(e.to_string())),
        },
    }
}

async fn run_command(ctx: ExecutionContext, program: String, args: Vec<String>) -> Result<(), BodyError> {
    let env = ctx.effective_environment();
    tracing::debug!(%program, ?args, "Running command");

    let status = Command::new(&program)
        .args(&args)
        .env_clear()
        .envs(env.iter())
        .kill_on_drop(true)
        .status()
        .await
        .map_err(|e| format!("Failed to run '{program}': {e}"))?;

    if status.success() {
        return Ok(());
    }
    Err(Box::new(CommandExit {
        code: exit_code(status),
    }))
}

fn exit_code(status: std::process::ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    1
}
