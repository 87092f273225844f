//! treecache CLI application
//!
//! One subcommand per invocation; see `treecache --help`.

// CLI binary needs to output to stdout/stderr - this is intentional
#![allow(clippy::print_stdout, clippy::print_stderr)]

use treecache::cli::{self, CliError, EXIT_OK, exit_code_for, render_error};
use treecache::commands;
use treecache::tracing::{TracingConfig, init_tracing};

fn main() {
    // NOTE: Using eprintln! in panic hook is intentional - tracing infrastructure
    // may be corrupted during a panic, so we use the most reliable output method.
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("Application panicked: {panic_info}");
        eprintln!("Internal error occurred. Run with RUST_LOG=debug for more information.");
    }));

    let cli = cli::parse();
    std::process::exit(run(cli));
}

fn run(cli: cli::Cli) -> i32 {
    let tracing_config = TracingConfig {
        format: cli.tracing_format(),
        level: cli.level.into(),
        ..Default::default()
    };
    if let Err(e) = init_tracing(tracing_config) {
        eprintln!("Warning: {e}");
    }

    // No subcommand: usage text, like `treecache help`
    let Some(command) = cli.command.clone() else {
        return match cli::print_help() {
            Ok(()) => EXIT_OK,
            Err(e) => {
                let err = CliError::failed(format!("Failed to print usage: {e}"));
                render_error(&err, cli.json);
                exit_code_for(&err)
            }
        };
    };

    let span = treecache::command_span!(command.name());
    let _entered = span.enter();

    let result = cli
        .cache_config()
        .and_then(|config| commands::execute(command, config, cli.json));
    match result {
        Ok(()) => EXIT_OK,
        Err(err) => {
            ::tracing::debug!(code = err.code(), "Command failed");
            render_error(&err, cli.json);
            exit_code_for(&err)
        }
    }
}
