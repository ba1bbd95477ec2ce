//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// OpenAI-compatible gateway in front of prediction APIs and local
/// inference engines.
#[derive(Parser, Debug)]
#[command(name = "infergate")]
#[command(about = "Route OpenAI chat completions to prediction APIs and local engines")]
#[command(version)]
pub struct Cli {
    /// Path to the YAML config (defaults to $INFERGATE_CONFIG, then ./infergate.yaml)
    #[arg(short = 'c', long = "config", global = true)]
    pub config: Option<PathBuf>,

    /// Log filter such as "info" or "infergate_core=debug" (overrides RUST_LOG)
    #[arg(long = "log-level", global = true)]
    pub log_level: Option<String>,

    /// Log output format
    #[arg(long = "log-format", global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP gateway
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long, env = "INFERGATE_HOST")]
        host: Option<String>,
        /// Listen port (overrides server.port)
        #[arg(short, long, env = "INFERGATE_PORT")]
        port: Option<u16>,
    },

    /// Validate the configuration and print the registered models
    CheckConfig,

    /// List configured models with their provider and capabilities
    Models,
}
