//! Configuration management for passcache

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{ConfigError, Result};

/// Selectable cache lifetimes.
pub struct CacheTtl;

impl CacheTtl {
    pub const DEFAULT: Duration = Duration::from_secs(5 * 60); // 5 min

    /// Presets offered to the user; 0 (never expire) is accepted separately
    pub const CHOICES: [Duration; 9] = [
        Duration::from_secs(60),           // 1 min
        Duration::from_secs(3 * 60),       // 3 min
        Duration::from_secs(5 * 60),       // 5 min
        Duration::from_secs(10 * 60),      // 10 min
        Duration::from_secs(15 * 60),      // 15 min
        Duration::from_secs(30 * 60),      // 30 min
        Duration::from_secs(60 * 60),      // 1 hr
        Duration::from_secs(3 * 60 * 60),  // 3 hr
        Duration::from_secs(24 * 60 * 60), // 24 hr
    ];

    /// Whether `seconds` is one of the presets or 0
    pub fn is_allowed(seconds: u64) -> bool {
        seconds == 0 || Self::CHOICES.iter().any(|c| c.as_secs() == seconds)
    }
}

/// Read-only preference inputs consumed by the cache and its resolver.
pub trait PreferenceSource: Send + Sync {
    /// Lifetime applied to newly cached passphrases; zero means no expiry
    fn cache_ttl(&self) -> Duration;

    /// Cache per subkey instead of per master key
    fn cache_by_subkey(&self) -> bool;

    /// Unlock hardware tokens with the factory default PIN
    fn use_default_hardware_pin(&self) -> bool;
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Keyring database location
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyring_path: Option<PathBuf>,

    /// Cache preferences
    #[serde(default)]
    pub preferences: Preferences,
}

/// Cache preferences
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Seconds a cached passphrase stays valid (0 = until cleared)
    #[serde(default = "default_cache_ttl_seconds")]
    pub cache_ttl_seconds: u64,

    /// Use the subkey id as cache key instead of the master key id
    #[serde(default)]
    pub cache_by_subkey: bool,

    /// Answer hardware PIN requests with the default PIN
    #[serde(default)]
    pub use_default_hardware_pin: bool,

    /// Bounded wait of synchronous cache lookups, in milliseconds
    #[serde(default = "default_get_timeout_ms")]
    pub get_timeout_ms: u64,
}

fn default_cache_ttl_seconds() -> u64 {
    CacheTtl::DEFAULT.as_secs()
}

fn default_get_timeout_ms() -> u64 {
    3000
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: default_cache_ttl_seconds(),
            cache_by_subkey: false,
            use_default_hardware_pin: false,
            get_timeout_ms: default_get_timeout_ms(),
        }
    }
}

impl Preferences {
    /// Bounded wait for cache lookups
    pub fn get_timeout(&self) -> Duration {
        Duration::from_millis(self.get_timeout_ms)
    }
}

impl PreferenceSource for Preferences {
    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }

    fn cache_by_subkey(&self) -> bool {
        self.cache_by_subkey
    }

    fn use_default_hardware_pin(&self) -> bool {
        self.use_default_hardware_pin
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or(ConfigError::Invalid(
            "Could not determine home directory".to_string(),
        ))?;

        Ok(home.join(".passcache").join("config.yaml"))
    }

    /// Resolve an optional override to a concrete config path
    pub fn resolve_path(path: Option<&str>) -> Result<PathBuf> {
        match path {
            Some(p) => Ok(PathBuf::from(p)),
            None => Self::default_path(),
        }
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub fn load_or_default(path: Option<&str>) -> Result<Self> {
        match Self::load_from(Self::resolve_path(path)?) {
            Err(crate::error::Error::Config(ConfigError::NotFound)) => {
                log::debug!("No config file, using defaults");
                Ok(Self::default())
            }
            other => other,
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound.into());
        }

        let contents = std::fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(ConfigError::from)?;
        config.validate()?;

        Ok(config)
    }

    /// Save configuration to a specific path
    pub fn save_to(&self, path: PathBuf) -> Result<()> {
        self.validate()?;

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents =
            serde_yaml::to_string(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;

        std::fs::write(&path, contents)?;

        // Set file permissions to 600 on Unix systems
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mut perms = std::fs::metadata(&path)?.permissions();
            perms.set_mode(0o600);
            std::fs::set_permissions(&path, perms)?;
        }

        Ok(())
    }

    /// Reject preference values the cache cannot honour
    pub fn validate(&self) -> Result<()> {
        let prefs = &self.preferences;
        if !CacheTtl::is_allowed(prefs.cache_ttl_seconds) {
            return Err(ConfigError::Invalid(format!(
                "cache_ttl_seconds must be 0 or one of {:?}",
                CacheTtl::CHOICES
                    .iter()
                    .map(|d| d.as_secs())
                    .collect::<Vec<_>>()
            ))
            .into());
        }
        if prefs.get_timeout_ms == 0 {
            return Err(ConfigError::Invalid("get_timeout_ms must be positive".to_string()).into());
        }
        Ok(())
    }

    /// Keyring database path, from config or the platform default
    pub fn keyring_path(&self) -> Result<PathBuf> {
        match &self.keyring_path {
            Some(p) => Ok(p.clone()),
            None => Ok(crate::keyring::SqliteKeyring::default_path()?),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.keyring_path.is_none());
        assert_eq!(config.preferences.cache_ttl_seconds, 300);
        assert!(!config.preferences.cache_by_subkey);
        assert!(!config.preferences.use_default_hardware_pin);
        assert_eq!(config.preferences.get_timeout(), Duration::from_millis(3000));
    }

    #[test]
    fn test_preference_source() {
        let prefs = Preferences {
            cache_ttl_seconds: 900,
            cache_by_subkey: true,
            ..Preferences::default()
        };
        assert_eq!(prefs.cache_ttl(), Duration::from_secs(900));
        assert!(prefs.cache_by_subkey());
        assert!(!prefs.use_default_hardware_pin());
    }

    #[test]
    fn test_ttl_presets() {
        assert!(CacheTtl::is_allowed(0));
        assert!(CacheTtl::is_allowed(180));
        assert!(CacheTtl::is_allowed(86400));
        assert!(!CacheTtl::is_allowed(42));
    }

    #[test]
    fn test_validate_rejects_odd_ttl() {
        let mut config = Config::default();
        config.preferences.cache_ttl_seconds = 42;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: Config =
            serde_yaml::from_str("preferences:\n  cache_by_subkey: true\n").unwrap();
        assert!(config.preferences.cache_by_subkey);
        assert_eq!(config.preferences.cache_ttl_seconds, 300);
        assert_eq!(config.preferences.get_timeout_ms, 3000);
    }

    #[test]
    fn test_save_and_load_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.preferences.cache_ttl_seconds = 900;
        config.keyring_path = Some(dir.path().join("keyring.db"));
        config.save_to(path.clone()).unwrap();

        let loaded = Config::load_from(path).unwrap();
        assert_eq!(loaded.preferences.cache_ttl_seconds, 900);
        assert_eq!(loaded.keyring_path, config.keyring_path);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.yaml");
        let config = Config::load_or_default(path.to_str()).unwrap();
        assert_eq!(config.preferences, Preferences::default());
    }

    #[cfg(unix)]
    #[test]
    fn test_saved_file_is_private() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        Config::default().save_to(path.clone()).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
