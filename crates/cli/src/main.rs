//! codeql-env CLI entry point

#![allow(clippy::print_stderr)]

use codeql_env_cli::tracing::{TracingConfig, init_tracing};
use codeql_env_cli::{EXIT_CLI, cli};

fn main() {
    // Tracing may be unusable during a panic
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.log_level.into(),
        ..Default::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("{e:?}");
        std::process::exit(EXIT_CLI);
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Fatal error: Failed to create tokio runtime: {e}");
            std::process::exit(1);
        }
    };

    let exit_code = rt.block_on(codeql_env_cli::run(cli));
    std::process::exit(exit_code);
}
