//! Command execution context
//!
//! Loads configuration once and builds the cache, keyring and dispatcher a
//! command needs.

use std::path::PathBuf;
use std::sync::Arc;

use crate::cache::{CacheHandle, CacheService, PresenceSignal};
use crate::cli::{GlobalOptions, OutputFormat};
use crate::config::{Config, Preferences};
use crate::error::Result;
use crate::keyring::SqliteKeyring;
use crate::operations::{Backends, Dispatcher, UnsupportedEngine, UnsupportedKeyServer};

/// Context for command execution containing config and runtime options.
pub struct CommandContext {
    /// Loaded and validated configuration (defaults when no file exists)
    pub config: Config,
    /// Resolved keyring database location
    pub keyring_path: PathBuf,
    /// Output format preference
    pub format: OutputFormat,
}

impl CommandContext {
    /// Load config and resolve the keyring path.
    ///
    /// A `--keyring` override beats the config file's `keyring_path`.
    pub fn new(opts: &GlobalOptions) -> Result<Self> {
        let config = Config::load_or_default(opts.config_ref())?;
        let keyring_path = match opts.keyring_ref() {
            Some(path) => PathBuf::from(path),
            None => config.keyring_path()?,
        };

        Ok(Self {
            config,
            keyring_path,
            format: opts.format,
        })
    }

    pub fn preferences(&self) -> &Preferences {
        &self.config.preferences
    }

    /// Open (creating if needed) the keyring database
    pub fn open_keyring(&self) -> Result<SqliteKeyring> {
        Ok(SqliteKeyring::open_at(&self.keyring_path)?)
    }

    /// Start a cache service backed by the keyring database.
    ///
    /// Must be called within a tokio runtime.
    pub fn spawn_cache(&self, presence: Arc<dyn PresenceSignal>) -> Result<CacheHandle> {
        let keyring = Arc::new(self.open_keyring()?);
        let prefs = Arc::new(self.preferences().clone());
        Ok(CacheService::spawn(keyring, prefs, presence)
            .with_get_timeout(self.preferences().get_timeout()))
    }

    /// Dispatcher sharing `cache`. No OpenPGP engine is linked into the CLI,
    /// so only locally implemented operations succeed.
    pub fn dispatcher(&self, cache: CacheHandle) -> Result<Dispatcher> {
        let backends = Backends {
            cache,
            keyring: Arc::new(self.open_keyring()?),
            engine: Arc::new(UnsupportedEngine),
            key_server: Arc::new(UnsupportedKeyServer),
        };
        Ok(Dispatcher::new(backends))
    }
}
