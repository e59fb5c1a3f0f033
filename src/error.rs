//! Error types for passcache

use std::time::Duration;
use thiserror::Error;

use crate::operations::RequiredInput;

/// Result type alias for passcache operations
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the application
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Keyring(#[from] KeyringError),

    #[error(transparent)]
    Operation(#[from] OperationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Interactive prompt error: {0}")]
    Dialoguer(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Operation failed: {0}")]
    Other(String),
}

impl From<dialoguer::Error> for Error {
    fn from(err: dialoguer::Error) -> Self {
        Error::Dialoguer(err.to_string())
    }
}

/// Passphrase cache errors.
///
/// A plain cache miss is not an error; lookups report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(
        "Invalid key pairing: master {master:#018x} and subkey {sub:#018x} mix symmetric and key-based ids"
    )]
    InvalidKeyPair { master: i64, sub: i64 },

    #[error("Key not found: {0:#018x}")]
    KeyNotFound(i64),

    #[error("Secret key material for {0:#018x} is not available on this device")]
    SecretUnavailable(i64),

    #[error("Secret key {0:#018x} is stripped and cannot be unlocked")]
    SecretStripped(i64),

    #[error("Passphrase cache did not answer within {0:?}")]
    Timeout(Duration),

    #[error("Passphrase cache service has stopped")]
    ServiceStopped,

    #[error(transparent)]
    Keyring(KeyringError),
}

impl CacheError {
    /// True for the "key not found" family: bad sentinel pairing or an unknown key.
    pub fn is_key_not_found(&self) -> bool {
        matches!(
            self,
            CacheError::InvalidKeyPair { .. }
                | CacheError::KeyNotFound(_)
                | CacheError::Keyring(KeyringError::NotFound(_))
        )
    }

    /// Fatal errors must not be retried; the user gets a final message.
    pub fn is_fatal(&self) -> bool {
        self.is_key_not_found()
            || matches!(
                self,
                CacheError::SecretUnavailable(_) | CacheError::SecretStripped(_)
            )
    }
}

impl From<KeyringError> for CacheError {
    fn from(err: KeyringError) -> Self {
        match err {
            KeyringError::NotFound(id) => CacheError::KeyNotFound(id),
            other => CacheError::Keyring(other),
        }
    }
}

/// Keyring metadata store errors
#[derive(Debug, Error)]
pub enum KeyringError {
    #[error("No keyring or subkey with id {0:#018x}")]
    NotFound(i64),

    #[error("Keyring storage error: {0}")]
    Storage(String),

    #[error("Keyring I/O error: {0}")]
    Io(String),

    #[error("Could not determine a data directory for the keyring database")]
    NoHome,

    #[error("Invalid keyring record: {0}")]
    InvalidRecord(String),
}

impl From<rusqlite::Error> for KeyringError {
    fn from(err: rusqlite::Error) -> Self {
        KeyringError::Storage(err.to_string())
    }
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found.")]
    NotFound,

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Failed to save configuration: {0}")]
    SaveError(String),
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}

/// Errors reported by the OpenPGP engine and key server collaborators
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Bad passphrase for key {0:#018x}")]
    BadPassphrase(i64),

    #[error("No suitable key for this operation")]
    NoSuitableKey,

    #[error("Malformed input: {0}")]
    Malformed(String),

    #[error("Key server error: {0}")]
    Network(String),

    #[error("{0}")]
    Failed(String),
}

/// Ways an operation can stop short of success.
///
/// The dispatcher maps each of these onto a terminal state, so none of them
/// ever reaches the submitter as an `Err`.
#[derive(Debug, Error)]
pub enum OperationError {
    #[error("User input required: {0}")]
    InputRequired(RequiredInput),

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Keyring(#[from] KeyringError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}
