//! `check-config`: validate configuration and print what would be served.

use anyhow::Result;

use crate::bootstrap::LoadedConfig;
use crate::presentation::model_table;

/// Loading already validated everything; report the result.
pub fn execute(config: &LoadedConfig) -> Result<()> {
    match &config.path {
        Some(path) => println!("Configuration OK: {}", path.display()),
        None => println!("No configuration file found; defaults are valid"),
    }
    println!(
        "Server: {}:{} (max {} rate-limit buckets)",
        config.server.host, config.server.port, config.server.max_buckets
    );
    println!("{} model(s) registered", config.models.len());

    if !config.models.is_empty() {
        println!();
        print!("{}", model_table(&config.models));
    }
    Ok(())
}
