//! CLI-specific error types and exit codes.

use infergate_core::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    /// Configuration failed to load or validate.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Listener could not be bound.
    #[error("Failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },
}

impl CliError {
    /// Exit codes follow sysexits.h where one fits.
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => 78,   // EX_CONFIG
            Self::Bind { .. } => 71, // EX_OSERR
        }
    }
}

/// Exit code for any error surfaced from a command.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<CliError>().map_or(1, CliError::exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_errors_use_ex_config() {
        let err = anyhow::Error::from(CliError::Config(ConfigError::Parse("bad yaml".into())));
        assert_eq!(exit_code(&err), 78);
    }

    #[test]
    fn test_other_errors_exit_one() {
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }
}
