//! OpenPGP engine and key server interfaces
//!
//! Packet handling and network access live outside this crate. Operations
//! reach them only through these traits.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::context::UnlockedKey;
use super::{KeyChanges, SessionKey, SignEncryptParams};
use crate::cache::Passphrase;
use crate::error::EngineError;

type Result<T> = std::result::Result<T, EngineError>;

/// Key a message must be decrypted with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecryptionKey {
    Symmetric,
    Key { master_key_id: i64, sub_key_id: i64 },
}

/// How to open an encrypted message
#[derive(Debug)]
pub enum DecryptUnlock<'a> {
    Key(&'a UnlockedKey),
    Symmetric(&'a Passphrase),
    SessionKey(&'a SessionKey),
}

#[derive(Debug, Clone, Default)]
pub struct DecryptVerifyResult {
    pub data: Vec<u8>,
    /// Master key id of a valid signature, if the message was signed
    pub signer_key_id: Option<i64>,
    pub signature_valid: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub imported: usize,
    pub updated: usize,
    pub unchanged: usize,
}

impl ImportSummary {
    pub fn merge(&mut self, other: ImportSummary) {
        self.imported += other.imported;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
    }
}

/// OpenPGP packet work on behalf of operations
#[async_trait]
pub trait PgpEngine: Send + Sync {
    async fn sign_encrypt(
        &self,
        params: &SignEncryptParams,
        signer: Option<&UnlockedKey>,
        symmetric: Option<&Passphrase>,
        signature_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<u8>>;

    /// Which of our keys (or a symmetric passphrase) opens `data`
    async fn decryption_key(&self, data: &[u8], allowed: Option<&[i64]>) -> Result<DecryptionKey>;

    async fn decrypt_verify(&self, data: &[u8], unlock: DecryptUnlock<'_>)
    -> Result<DecryptVerifyResult>;

    async fn edit_key(&self, key: &UnlockedKey, changes: &KeyChanges) -> Result<()>;

    async fn change_unlock(&self, key: &UnlockedKey, new_passphrase: &Passphrase) -> Result<()>;

    /// Revoke a keyring; returns the revocation certificate
    async fn revoke(&self, key: &UnlockedKey) -> Result<Vec<u8>>;

    async fn certify(
        &self,
        certifier: &UnlockedKey,
        target_master_key_id: i64,
        signature_time: Option<DateTime<Utc>>,
    ) -> Result<()>;

    async fn delete(&self, master_key_id: i64, secret: bool) -> Result<()>;

    async fn promote(
        &self,
        master_key_id: i64,
        sub_key_ids: Option<&[i64]>,
        card_serial: Option<&str>,
    ) -> Result<()>;

    async fn import(&self, key_data: &[u8]) -> Result<ImportSummary>;

    /// Export keyrings; secret keys are encrypted with `backup_code`
    async fn export(
        &self,
        master_key_ids: &[i64],
        include_secret: bool,
        backup_code: Option<&Passphrase>,
    ) -> Result<Vec<u8>>;
}

/// Key server access
#[async_trait]
pub trait KeyServer: Send + Sync {
    async fn upload(&self, key_data: &[u8]) -> Result<()>;

    async fn fetch(&self, master_key_id: i64) -> Result<Vec<u8>>;

    /// Check a linked identity proof for a key
    async fn verify_proof(&self, master_key_id: i64, proof: &str) -> Result<bool>;
}

fn unsupported<T>() -> Result<T> {
    Err(EngineError::Failed(
        "no OpenPGP engine is configured".to_string(),
    ))
}

/// Engine for hosts without OpenPGP support; every call fails
#[derive(Debug, Default)]
pub struct UnsupportedEngine;

#[async_trait]
impl PgpEngine for UnsupportedEngine {
    async fn sign_encrypt(
        &self,
        _params: &SignEncryptParams,
        _signer: Option<&UnlockedKey>,
        _symmetric: Option<&Passphrase>,
        _signature_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<u8>> {
        unsupported()
    }

    async fn decryption_key(&self, _data: &[u8], _allowed: Option<&[i64]>) -> Result<DecryptionKey> {
        unsupported()
    }

    async fn decrypt_verify(
        &self,
        _data: &[u8],
        _unlock: DecryptUnlock<'_>,
    ) -> Result<DecryptVerifyResult> {
        unsupported()
    }

    async fn edit_key(&self, _key: &UnlockedKey, _changes: &KeyChanges) -> Result<()> {
        unsupported()
    }

    async fn change_unlock(&self, _key: &UnlockedKey, _new_passphrase: &Passphrase) -> Result<()> {
        unsupported()
    }

    async fn revoke(&self, _key: &UnlockedKey) -> Result<Vec<u8>> {
        unsupported()
    }

    async fn certify(
        &self,
        _certifier: &UnlockedKey,
        _target_master_key_id: i64,
        _signature_time: Option<DateTime<Utc>>,
    ) -> Result<()> {
        unsupported()
    }

    async fn delete(&self, _master_key_id: i64, _secret: bool) -> Result<()> {
        unsupported()
    }

    async fn promote(
        &self,
        _master_key_id: i64,
        _sub_key_ids: Option<&[i64]>,
        _card_serial: Option<&str>,
    ) -> Result<()> {
        unsupported()
    }

    async fn import(&self, _key_data: &[u8]) -> Result<ImportSummary> {
        unsupported()
    }

    async fn export(
        &self,
        _master_key_ids: &[i64],
        _include_secret: bool,
        _backup_code: Option<&Passphrase>,
    ) -> Result<Vec<u8>> {
        unsupported()
    }
}

/// Key server for offline hosts; every call fails
#[derive(Debug, Default)]
pub struct UnsupportedKeyServer;

#[async_trait]
impl KeyServer for UnsupportedKeyServer {
    async fn upload(&self, _key_data: &[u8]) -> Result<()> {
        Err(EngineError::Network("no key server is configured".to_string()))
    }

    async fn fetch(&self, _master_key_id: i64) -> Result<Vec<u8>> {
        Err(EngineError::Network("no key server is configured".to_string()))
    }

    async fn verify_proof(&self, _master_key_id: i64, _proof: &str) -> Result<bool> {
        Err(EngineError::Network("no key server is configured".to_string()))
    }
}
