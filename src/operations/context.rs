//! Execution context handed to each operation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use super::engine::{KeyServer, PgpEngine};
use super::progress::Progress;
use super::result::{LogLevel, OperationLog};
use super::{CryptoInput, RequiredInput};
use crate::cache::{CacheHandle, KEY_ID_SYMMETRIC, Passphrase, SecretKind};
use crate::error::{CacheError, EngineError, OperationError};
use crate::keyring::{KeyringStore, format_key_id};

type Result<T> = std::result::Result<T, OperationError>;

/// Collaborators shared by every operation
#[derive(Clone)]
pub struct Backends {
    pub cache: CacheHandle,
    pub keyring: Arc<dyn KeyringStore>,
    pub engine: Arc<dyn PgpEngine>,
    pub key_server: Arc<dyn KeyServer>,
}

/// Cooperative cancellation flag shared between a handle and its operation
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Where an unlock secret came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretSource {
    /// Supplied by the caller in `CryptoInput`
    Input,
    /// Fixed answer (empty passphrase, default hardware PIN)
    Immediate,
    Cache,
}

/// A key id together with the secret that unlocks it
#[derive(Debug, Clone)]
pub struct UnlockedKey {
    pub master_key_id: i64,
    pub sub_key_id: i64,
    pub passphrase: Passphrase,
    pub source: SecretSource,
}

pub struct OperationContext {
    input: CryptoInput,
    cancel: CancelFlag,
    progress: Arc<Progress>,
    log: Arc<Mutex<OperationLog>>,
    backends: Backends,
}

impl OperationContext {
    pub fn new(
        input: CryptoInput,
        cancel: CancelFlag,
        progress: Arc<Progress>,
        log: Arc<Mutex<OperationLog>>,
        backends: Backends,
    ) -> Self {
        Self {
            input,
            cancel,
            progress,
            log,
            backends,
        }
    }

    pub fn input(&self) -> &CryptoInput {
        &self.input
    }

    pub fn cache(&self) -> &CacheHandle {
        &self.backends.cache
    }

    pub fn keyring(&self) -> &dyn KeyringStore {
        self.backends.keyring.as_ref()
    }

    pub fn engine(&self) -> &dyn PgpEngine {
        self.backends.engine.as_ref()
    }

    pub fn key_server(&self) -> &dyn KeyServer {
        self.backends.key_server.as_ref()
    }

    /// Safe point: stop here if the caller asked to cancel
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            self.log(LogLevel::Warn, "Cancelled by caller");
            return Err(OperationError::Cancelled);
        }
        Ok(())
    }

    pub fn progress(&self, current: u64, total: u64, message: Option<&str>) {
        self.progress.report(current, total, message);
    }

    pub fn log(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        debug!("[{:?}] {}", level, message);
        let mut log = self.log.lock().unwrap_or_else(|e| e.into_inner());
        log.add(level, message);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.log(LogLevel::Warn, message);
    }

    /// Secret for a key, using the `CryptoInput` passphrase if present
    pub async fn unlock(&self, master_key_id: i64, sub_key_id: i64) -> Result<UnlockedKey> {
        self.unlock_with(master_key_id, sub_key_id, self.input.passphrase.as_ref())
            .await
    }

    /// Secret for a key: `supplied`, then a constant answer for empty
    /// passphrases and the default PIN, then the cache. Anything else ends
    /// the operation with [`OperationError::InputRequired`].
    pub async fn unlock_with(
        &self,
        master_key_id: i64,
        sub_key_id: i64,
        supplied: Option<&Passphrase>,
    ) -> Result<UnlockedKey> {
        let unlocked = |passphrase, source| UnlockedKey {
            master_key_id,
            sub_key_id,
            passphrase,
            source,
        };

        if let Some(passphrase) = supplied {
            return Ok(unlocked(passphrase.clone(), SecretSource::Input));
        }

        let cache = self.cache();
        let kind = cache.secret_kind(master_key_id, sub_key_id)?;
        if let Some(secret) = kind.immediate_secret() {
            return Ok(unlocked(secret, SecretSource::Immediate));
        }

        match cache.get_cached_passphrase(master_key_id, sub_key_id).await {
            Ok(Some(passphrase)) => {
                self.info(format!(
                    "Using cached passphrase for {}",
                    format_key_id(master_key_id)
                ));
                return Ok(unlocked(passphrase, SecretSource::Cache));
            }
            Ok(None) => {}
            Err(CacheError::Timeout(waited)) => {
                warn!("Passphrase cache unresponsive after {:?}", waited);
                self.warn("Passphrase cache did not answer; asking for input");
            }
            Err(e) => return Err(e.into()),
        }

        Err(OperationError::InputRequired(
            if master_key_id == KEY_ID_SYMMETRIC {
                RequiredInput::SymmetricPassphrase
            } else if kind == SecretKind::HardwarePinPrompt {
                RequiredInput::HardwarePin {
                    master_key_id,
                    sub_key_id,
                }
            } else {
                RequiredInput::Passphrase {
                    master_key_id,
                    sub_key_id,
                }
            },
        ))
    }

    /// Map an engine failure seen while using `key`.
    ///
    /// A cached passphrase the engine rejects is stale: it is forgotten and
    /// the caller is asked for a fresh one.
    pub async fn engine_failure(&self, key: &UnlockedKey, err: EngineError) -> OperationError {
        if let EngineError::BadPassphrase(_) = err
            && key.source == SecretSource::Cache
        {
            self.warn(format!(
                "Cached passphrase for {} was rejected",
                format_key_id(key.master_key_id)
            ));
            if let Err(e) = self
                .cache()
                .clear_cached_passphrase(key.master_key_id, key.sub_key_id)
                .await
            {
                warn!("Could not forget rejected passphrase: {}", e);
            }
            return OperationError::InputRequired(if key.master_key_id == KEY_ID_SYMMETRIC {
                RequiredInput::SymmetricPassphrase
            } else {
                RequiredInput::Passphrase {
                    master_key_id: key.master_key_id,
                    sub_key_id: key.sub_key_id,
                }
            });
        }
        err.into()
    }

    /// Master key id followed by the keyring's other subkey ids
    pub fn keyring_key_ids(&self, master_key_id: i64) -> Vec<i64> {
        let mut ids = vec![master_key_id];
        if let Ok(record) = self.keyring().keyring(master_key_id) {
            ids.extend(
                record
                    .subkeys
                    .iter()
                    .map(|s| s.key_id)
                    .filter(|id| *id != master_key_id),
            );
        }
        ids
    }

    /// Forget cached secrets of a keyring and all of its subkeys
    pub async fn forget_keyring(&self, master_key_id: i64) {
        let ids = self.keyring_key_ids(master_key_id);
        self.forget_keys(master_key_id, &ids).await;
    }

    /// Forget cached secrets of the given subkeys of a keyring
    pub async fn forget_keys(&self, master_key_id: i64, sub_key_ids: &[i64]) {
        for sub_key_id in sub_key_ids {
            if let Err(e) = self
                .cache()
                .clear_cached_passphrase(master_key_id, *sub_key_id)
                .await
            {
                warn!(
                    "Could not clear cached passphrase for {}: {}",
                    format_key_id(*sub_key_id),
                    e
                );
            }
        }
    }
}
