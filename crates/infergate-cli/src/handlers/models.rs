//! `models`: list configured models.

use anyhow::Result;

use crate::bootstrap::LoadedConfig;
use crate::presentation::model_table;

pub fn execute(config: &LoadedConfig) -> Result<()> {
    if config.models.is_empty() {
        println!("No models configured.");
        return Ok(());
    }
    print!("{}", model_table(&config.models));
    Ok(())
}
