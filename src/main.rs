use clap::Parser;
use std::process::ExitCode;

mod analysis;
mod cli;
mod commands;
mod config;
mod domain;
mod error;
mod infrastructure;
mod observability;
mod services;
mod ui;

use cli::{Cli, Commands};
use commands::check;
use services::LintOutcome;

/// Violations found
const EXIT_VIOLATIONS: u8 = 1;
/// The tool itself could not do its job
const EXIT_FAILURE: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // LOGGING=debug,info,warn,error or just LOGGING=debug
    let log_level = std::env::var("LOGGING")
        .or_else(|_| std::env::var("LOG_LEVEL"))
        .unwrap_or_else(|_| {
            if cli.verbose {
                "debug".to_string()
            } else {
                "info".to_string()
            }
        });

    // stdout carries the report, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(false)
        .init();

    let result = match cli.command {
        Commands::Check(args) => check::execute(args, cli.config, cli.verbose).await,
    };

    match result {
        Ok(LintOutcome::Clean) => ExitCode::SUCCESS,
        Ok(LintOutcome::Violations(_)) => ExitCode::from(EXIT_VIOLATIONS),
        Err(e) => {
            ui::print_error(&format!("{:#}", e));
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
