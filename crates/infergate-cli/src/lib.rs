#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![deny(unused_crate_dependencies)]

// Silence unused dev-dependency warnings
#[cfg(test)]
use tokio_test as _;

// Used by the binary target only
use dotenvy as _;

pub mod bootstrap;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod parser;
pub mod presentation;

pub use bootstrap::{LoadedConfig, build_gateway, load_config};
pub use error::{CliError, exit_code};
pub use parser::{Cli, Commands, LogFormat};
