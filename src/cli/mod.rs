//! CLI command definitions and handlers

use clap::{Args, Parser, Subcommand};

pub mod args;
pub mod context;
pub mod keyring;
pub mod ops;
pub mod session;
pub mod status;

pub use args::{GlobalOptions, OutputFormat};
pub use context::CommandContext;

/// passcache CLI - OpenPGP passphrase cache and keyring metadata tool
#[derive(Parser, Debug)]
#[command(name = "passcache")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Output format (table, json)
    #[arg(
        long,
        global = true,
        env = "PASSCACHE_FORMAT",
        default_value = "table",
        hide_env = true
    )]
    pub format: OutputFormat,

    /// Override config file location
    #[arg(long, global = true, env = "PASSCACHE_CONFIG", hide_env = true)]
    pub config: Option<String>,

    /// Override keyring database location
    #[arg(long, global = true, env = "PASSCACHE_KEYRING", hide_env = true)]
    pub keyring: Option<String>,

    /// Enable debug logging
    #[arg(long, global = true, env = "PASSCACHE_DEBUG", hide_env = true)]
    pub debug: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start an interactive shell that holds a passphrase cache
    Session,

    /// Show configuration and cache preferences
    Status,

    /// Display version information
    Version,

    /// Manage key metadata in the keyring database
    #[command(subcommand)]
    Keyring(KeyringCommands),

    /// Measure S2K hashing throughput
    Bench {
        /// Number of chunks to hash
        #[arg(long, default_value_t = 4096)]
        iterations: u32,
    },

    /// Split a file into OpenPGP armored blocks and plain text
    Parse {
        /// File to read ('-' for stdin)
        file: String,
    },
}

/// Keyring metadata subcommands
#[derive(Subcommand, Debug)]
pub enum KeyringCommands {
    /// Add or replace a keyring
    Add(KeyringAddArgs),

    /// List keyrings
    List,

    /// Remove a keyring
    Remove {
        /// Master key id (hex with 0x prefix, or decimal)
        key_id: String,
    },

    /// Print the keyring database path
    Path,
}

/// Arguments for `keyring add`
#[derive(Args, Debug, Clone)]
pub struct KeyringAddArgs {
    /// Master key id (hex with 0x prefix, or decimal)
    pub master_key_id: String,

    /// Primary user id, shown as the cache label
    #[arg(long)]
    pub user_id: Option<String>,

    /// How the master key's secret is stored
    #[arg(long, value_enum, default_value = "passphrase")]
    pub secret_type: crate::keyring::SecretKeyType,

    /// Extra subkey as ID[:TYPE[:FLAGS]], FLAGS drawn from c, s, e (default "e")
    #[arg(long = "subkey")]
    pub subkeys: Vec<String>,
}
