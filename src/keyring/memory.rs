//! In-memory keyring store
//!
//! Used when embedding the cache without a database, and throughout the tests.

use std::collections::BTreeMap;
use std::sync::RwLock;

use super::{KeyringRecord, KeyringStore, SecretKeyType};
use crate::error::KeyringError;

type Result<T> = std::result::Result<T, KeyringError>;

/// Keyring store backed by a map, ordered by master key id.
#[derive(Debug, Default)]
pub struct MemoryKeyring {
    keyrings: RwLock<BTreeMap<i64, KeyringRecord>>,
}

impl MemoryKeyring {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert for test setup
    pub fn with_keyring(self, record: KeyringRecord) -> Self {
        self.insert(record);
        self
    }

    /// Insert or replace a keyring
    pub fn insert(&self, record: KeyringRecord) {
        if let Ok(mut keyrings) = self.keyrings.write() {
            keyrings.insert(record.master_key_id, record);
        }
    }

    /// Remove a keyring, returning whether it existed
    pub fn remove(&self, master_key_id: i64) -> bool {
        self.keyrings
            .write()
            .map(|mut k| k.remove(&master_key_id).is_some())
            .unwrap_or(false)
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, BTreeMap<i64, KeyringRecord>>> {
        self.keyrings
            .read()
            .map_err(|_| KeyringError::Storage("keyring lock poisoned".to_string()))
    }
}

impl KeyringStore for MemoryKeyring {
    fn secret_key_type(&self, master_key_id: i64, sub_key_id: i64) -> Result<SecretKeyType> {
        let keyrings = self.read()?;
        let keyring = keyrings
            .get(&master_key_id)
            .ok_or(KeyringError::NotFound(master_key_id))?;
        keyring
            .subkey(sub_key_id)
            .map(|s| s.secret_type)
            .ok_or(KeyringError::NotFound(sub_key_id))
    }

    fn primary_user_id(&self, master_key_id: i64) -> Result<Option<String>> {
        let keyrings = self.read()?;
        keyrings
            .get(&master_key_id)
            .map(|k| k.user_id.clone())
            .ok_or(KeyringError::NotFound(master_key_id))
    }

    fn keyring(&self, master_key_id: i64) -> Result<KeyringRecord> {
        let keyrings = self.read()?;
        keyrings
            .get(&master_key_id)
            .cloned()
            .ok_or(KeyringError::NotFound(master_key_id))
    }

    fn list_keyrings(&self) -> Result<Vec<KeyringRecord>> {
        Ok(self.read()?.values().cloned().collect())
    }
}
