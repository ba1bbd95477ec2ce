//! CLI entry point.
//!
//! Loads `.env`, installs logging, loads configuration and dispatches to
//! a handler. Errors are printed once and mapped to an exit code.

use std::process::ExitCode;

use clap::Parser;

use infergate_cli::{Cli, Commands, exit_code, handlers, load_config, logging};

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { host, port } => handlers::serve::execute(&config, host, port).await,
        Commands::CheckConfig => handlers::check_config::execute(&config),
        Commands::Models => handlers::models::execute(&config),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // .env first so credential indirections can resolve from it
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    if let Err(e) = logging::init(cli.log_level.as_deref(), cli.log_format) {
        eprintln!("Error: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}
