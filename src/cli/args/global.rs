//! Global CLI options shared across all commands

use crate::cli::{Cli, OutputFormat};

/// Global CLI options passed to all command handlers.
///
/// Precedence is CLI flag, then environment variable, then config file,
/// then default. This struct captures the CLI/env layer; the config file is
/// consulted in `CommandContext`.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    /// Output format (table, json)
    pub format: OutputFormat,

    /// Custom config file path (defaults to ~/.passcache/config.yaml)
    pub config: Option<String>,

    /// Keyring database override
    pub keyring: Option<String>,
}

impl GlobalOptions {
    /// Create GlobalOptions from a parsed CLI struct.
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            format: cli.format,
            config: cli.config.clone(),
            keyring: cli.keyring.clone(),
        }
    }

    /// Get config path as `Option<&str>`.
    pub fn config_ref(&self) -> Option<&str> {
        self.config.as_deref()
    }

    /// Get keyring path override as `Option<&str>`.
    pub fn keyring_ref(&self) -> Option<&str> {
        self.keyring.as_deref()
    }
}
