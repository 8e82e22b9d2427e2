use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;
use tracing::Level;

use strata_sdk::EngineError;

mod cli;
mod commands;
mod render;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    match commands::run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report(&err),
    }
}

/// Engine errors exit with their kind's code; anything else exits 1.
fn report(err: &anyhow::Error) -> ExitCode {
    match err.downcast_ref::<EngineError>() {
        Some(engine) => {
            let kind = engine.kind();
            eprintln!("{}: {engine}", format!("error[{}]", kind.as_str()).red().bold());
            if let Some(report) = engine.conflicts() {
                render::conflicts(report);
            }
            ExitCode::from(u8::try_from(kind.exit_code()).unwrap_or(1))
        }
        None => {
            eprintln!("{}: {err:#}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}
