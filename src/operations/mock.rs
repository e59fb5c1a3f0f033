//! Mock OpenPGP engine and key server for testing
//!
//! Configure behaviour via builder methods, then hand them to
//! [`test_backends`] to get a full set of operation collaborators.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::context::{Backends, UnlockedKey};
use super::engine::{
    DecryptUnlock, DecryptVerifyResult, DecryptionKey, ImportSummary, KeyServer, PgpEngine,
};
use super::{KeyChanges, SignEncryptParams};
use crate::cache::{CacheService, NoopPresence, Passphrase};
use crate::config::Preferences;
use crate::error::EngineError;
use crate::keyring::{KeyringRecord, MemoryKeyring, SecretKeyType, SubkeyRecord};

type Result<T> = std::result::Result<T, EngineError>;

pub const ALICE: i64 = 42;
pub const ALICE_SIGN: i64 = 43;
pub const ALICE_ENCRYPT: i64 = 44;
pub const BOB_CARD: i64 = 7;
pub const CAROL_STRIPPED: i64 = 9;

fn subkey(key_id: i64, secret_type: SecretKeyType, sign: bool) -> SubkeyRecord {
    SubkeyRecord {
        key_id,
        secret_type,
        can_certify: false,
        can_sign: sign,
        can_encrypt: !sign,
    }
}

/// Alice: ordinary passphrase keys; Bob: smart card; Carol: stripped
pub fn test_keyring() -> MemoryKeyring {
    MemoryKeyring::new()
        .with_keyring(KeyringRecord {
            master_key_id: ALICE,
            user_id: Some("Alice <alice@example.org>".to_string()),
            subkeys: vec![
                SubkeyRecord {
                    can_certify: true,
                    ..subkey(ALICE, SecretKeyType::Passphrase, false)
                },
                subkey(ALICE_SIGN, SecretKeyType::Passphrase, true),
                subkey(ALICE_ENCRYPT, SecretKeyType::Passphrase, false),
            ],
        })
        .with_keyring(KeyringRecord {
            master_key_id: BOB_CARD,
            user_id: Some("Bob <bob@example.org>".to_string()),
            subkeys: vec![subkey(BOB_CARD, SecretKeyType::DivertToCard, true)],
        })
        .with_keyring(KeyringRecord {
            master_key_id: CAROL_STRIPPED,
            user_id: None,
            subkeys: vec![subkey(CAROL_STRIPPED, SecretKeyType::GnuDummy, false)],
        })
}

/// Collaborators backed by the mocks and a fresh cache
pub fn test_backends(
    engine: Arc<MockEngine>,
    key_server: Arc<MockKeyServer>,
    prefs: Preferences,
) -> Backends {
    let keyring = Arc::new(test_keyring());
    let cache = CacheService::spawn(keyring.clone(), Arc::new(prefs), Arc::new(NoopPresence));
    Backends {
        cache,
        keyring,
        engine,
        key_server,
    }
}

/// Mock engine. Every key is unlocked by one passphrase.
pub struct MockEngine {
    passphrase: Vec<u8>,
    decryption_key: DecryptionKey,
    /// Error to return, consumed on first use
    error: Mutex<Option<EngineError>>,
    panic: bool,
    /// Recorded call names
    calls: Mutex<Vec<String>>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            passphrase: b"hunter2".to_vec(),
            decryption_key: DecryptionKey::Key {
                master_key_id: ALICE,
                sub_key_id: ALICE_ENCRYPT,
            },
            error: Mutex::new(None),
            panic: false,
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = passphrase.as_bytes().to_vec();
        self
    }

    pub fn with_decryption_key(mut self, key: DecryptionKey) -> Self {
        self.decryption_key = key;
        self
    }

    pub fn with_error(self, error: EngineError) -> Self {
        Self {
            error: Mutex::new(Some(error)),
            ..self
        }
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }

    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    async fn record(&self, call: &str) -> Result<()> {
        self.calls.lock().await.push(call.to_string());
        if self.panic {
            panic!("engine blew up in {}", call);
        }
        match self.error.lock().await.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn check(&self, key_id: i64, passphrase: &Passphrase) -> Result<()> {
        if passphrase.as_bytes() == self.passphrase.as_slice() || passphrase.is_empty() {
            Ok(())
        } else {
            Err(EngineError::BadPassphrase(key_id))
        }
    }

    fn check_key(&self, key: &UnlockedKey) -> Result<()> {
        self.check(key.master_key_id, &key.passphrase)
    }
}

#[async_trait]
impl PgpEngine for MockEngine {
    async fn sign_encrypt(
        &self,
        params: &SignEncryptParams,
        signer: Option<&UnlockedKey>,
        symmetric: Option<&Passphrase>,
        _signature_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<u8>> {
        self.record("sign_encrypt").await?;
        if let Some(key) = signer {
            self.check_key(key)?;
        }
        let mut out = b"ENCRYPTED:".to_vec();
        out.extend_from_slice(&params.data);
        if symmetric.is_some() {
            out.extend_from_slice(b":SYM");
        }
        Ok(out)
    }

    async fn decryption_key(&self, _data: &[u8], _allowed: Option<&[i64]>) -> Result<DecryptionKey> {
        self.record("decryption_key").await?;
        Ok(self.decryption_key)
    }

    async fn decrypt_verify(
        &self,
        data: &[u8],
        unlock: DecryptUnlock<'_>,
    ) -> Result<DecryptVerifyResult> {
        self.record("decrypt_verify").await?;
        match unlock {
            DecryptUnlock::Key(key) => self.check_key(key)?,
            DecryptUnlock::Symmetric(passphrase) => self.check(-1, passphrase)?,
            DecryptUnlock::SessionKey(_) => {}
        }
        let plain = data
            .strip_prefix(b"ENCRYPTED:")
            .ok_or_else(|| EngineError::Malformed("not an encrypted message".to_string()))?;
        Ok(DecryptVerifyResult {
            data: plain.to_vec(),
            signer_key_id: Some(ALICE),
            signature_valid: true,
        })
    }

    async fn edit_key(&self, key: &UnlockedKey, _changes: &KeyChanges) -> Result<()> {
        self.record("edit_key").await?;
        self.check_key(key)
    }

    async fn change_unlock(&self, key: &UnlockedKey, _new_passphrase: &Passphrase) -> Result<()> {
        self.record("change_unlock").await?;
        self.check_key(key)
    }

    async fn revoke(&self, key: &UnlockedKey) -> Result<Vec<u8>> {
        self.record("revoke").await?;
        self.check_key(key)?;
        Ok(b"REVOCATION".to_vec())
    }

    async fn certify(
        &self,
        certifier: &UnlockedKey,
        _target_master_key_id: i64,
        _signature_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.record("certify").await?;
        self.check_key(certifier)
    }

    async fn delete(&self, _master_key_id: i64, _secret: bool) -> Result<()> {
        self.record("delete").await
    }

    async fn promote(
        &self,
        _master_key_id: i64,
        _sub_key_ids: Option<&[i64]>,
        _card_serial: Option<&str>,
    ) -> Result<()> {
        self.record("promote").await
    }

    async fn import(&self, key_data: &[u8]) -> Result<ImportSummary> {
        self.record("import").await?;
        Ok(ImportSummary {
            imported: usize::from(!key_data.is_empty()),
            updated: 0,
            unchanged: 0,
        })
    }

    async fn export(
        &self,
        master_key_ids: &[i64],
        include_secret: bool,
        _backup_code: Option<&Passphrase>,
    ) -> Result<Vec<u8>> {
        self.record("export").await?;
        let kind = if include_secret { "SECRET" } else { "PUBLIC" };
        Ok(format!("{}:{:?}", kind, master_key_ids).into_bytes())
    }
}

/// Mock key server serving a fixed set of keys
#[derive(Default)]
pub struct MockKeyServer {
    keys: HashMap<i64, Vec<u8>>,
    uploads: Mutex<Vec<Vec<u8>>>,
}

impl MockKeyServer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, master_key_id: i64, data: &[u8]) -> Self {
        self.keys.insert(master_key_id, data.to_vec());
        self
    }

    pub async fn uploads(&self) -> Vec<Vec<u8>> {
        self.uploads.lock().await.clone()
    }
}

#[async_trait]
impl KeyServer for MockKeyServer {
    async fn upload(&self, key_data: &[u8]) -> Result<()> {
        self.uploads.lock().await.push(key_data.to_vec());
        Ok(())
    }

    async fn fetch(&self, master_key_id: i64) -> Result<Vec<u8>> {
        self.keys
            .get(&master_key_id)
            .cloned()
            .ok_or_else(|| EngineError::Network(format!("key {} not on server", master_key_id)))
    }

    async fn verify_proof(&self, _master_key_id: i64, proof: &str) -> Result<bool> {
        Ok(proof.contains("valid") && !proof.contains("invalid"))
    }
}
