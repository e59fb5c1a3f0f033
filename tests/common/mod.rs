//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use passcache::cache::{CacheHandle, CacheService, Passphrase, PresenceSignal};
use passcache::config::Preferences;
use passcache::error::EngineError;
use passcache::keyring::{KeyringRecord, MemoryKeyring, SecretKeyType, SubkeyRecord};
use passcache::operations::{
    Backends, DecryptUnlock, DecryptVerifyResult, DecryptionKey, Dispatcher, ImportSummary,
    KeyChanges, KeyServer, PgpEngine, ProgressSink, ProgressUpdate, SignEncryptParams,
    UnlockedKey,
};

pub const ALICE: i64 = 42;
pub const ALICE_SUB: i64 = 99;
pub const BOB_CARD: i64 = 7;
pub const CAROL: i64 = 9;
pub const CAROL_STRIPPED_SUB: i64 = 10;
pub const DAVE_EMPTY: i64 = 5;

pub const PASSPHRASE: &str = "hunter2";

fn subkey(key_id: i64, secret_type: SecretKeyType, can_sign: bool) -> SubkeyRecord {
    SubkeyRecord {
        key_id,
        secret_type,
        can_certify: false,
        can_sign,
        can_encrypt: !can_sign,
    }
}

/// Alice signs with subkey 99; Bob's key is on a card; Carol's subkey is
/// stripped; Dave has an empty passphrase
pub fn keyring() -> Arc<MemoryKeyring> {
    Arc::new(
        MemoryKeyring::new()
            .with_keyring(KeyringRecord {
                master_key_id: ALICE,
                user_id: Some("Alice <alice@example.org>".to_string()),
                subkeys: vec![
                    subkey(ALICE, SecretKeyType::Passphrase, false),
                    subkey(ALICE_SUB, SecretKeyType::Passphrase, true),
                ],
            })
            .with_keyring(KeyringRecord {
                master_key_id: BOB_CARD,
                user_id: Some("Bob <bob@example.org>".to_string()),
                subkeys: vec![subkey(BOB_CARD, SecretKeyType::DivertToCard, true)],
            })
            .with_keyring(KeyringRecord {
                master_key_id: CAROL,
                user_id: None,
                subkeys: vec![
                    subkey(CAROL, SecretKeyType::Passphrase, false),
                    subkey(CAROL_STRIPPED_SUB, SecretKeyType::GnuDummy, true),
                ],
            })
            .with_keyring(KeyringRecord {
                master_key_id: DAVE_EMPTY,
                user_id: Some("Dave".to_string()),
                subkeys: vec![subkey(DAVE_EMPTY, SecretKeyType::PassphraseEmpty, true)],
            }),
    )
}

pub fn prefs(cache_by_subkey: bool) -> Arc<Preferences> {
    Arc::new(Preferences {
        cache_by_subkey,
        ..Preferences::default()
    })
}

/// What a presence signal was told
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PresenceEvent {
    Active(usize, Vec<String>),
    Inactive,
}

#[derive(Default)]
pub struct RecordingPresence {
    events: Mutex<Vec<PresenceEvent>>,
}

impl RecordingPresence {
    pub fn events(&self) -> Vec<PresenceEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl PresenceSignal for RecordingPresence {
    fn activate(&self, count: usize, labels: &[String]) {
        self.events
            .lock()
            .unwrap()
            .push(PresenceEvent::Active(count, labels.to_vec()));
    }

    fn deactivate(&self) {
        self.events.lock().unwrap().push(PresenceEvent::Inactive);
    }
}

/// Cache over the fixture keyring, recording presence changes
pub fn spawn_cache(cache_by_subkey: bool) -> (CacheHandle, Arc<RecordingPresence>) {
    let presence = Arc::new(RecordingPresence::default());
    let cache = CacheService::spawn(keyring(), prefs(cache_by_subkey), presence.clone());
    (cache, presence)
}

pub fn secs(n: u64) -> Duration {
    Duration::from_secs(n)
}

/// Engine accepting only `PASSPHRASE`; encryption prefixes the data
#[derive(Default)]
pub struct FakeEngine {
    pub panic_on_sign: bool,
}

impl FakeEngine {
    fn check(&self, key: &UnlockedKey) -> Result<(), EngineError> {
        if key.passphrase.as_bytes() == PASSPHRASE.as_bytes() || key.passphrase.is_empty() {
            Ok(())
        } else {
            Err(EngineError::BadPassphrase(key.master_key_id))
        }
    }
}

#[async_trait]
impl PgpEngine for FakeEngine {
    async fn sign_encrypt(
        &self,
        params: &SignEncryptParams,
        signer: Option<&UnlockedKey>,
        _symmetric: Option<&Passphrase>,
        _signature_time: Option<DateTime<Utc>>,
    ) -> Result<Vec<u8>, EngineError> {
        if self.panic_on_sign {
            panic!("signing exploded");
        }
        if let Some(key) = signer {
            self.check(key)?;
        }
        Ok([b"PGP:".as_slice(), params.data.as_slice()].concat())
    }

    async fn decryption_key(
        &self,
        _data: &[u8],
        _allowed: Option<&[i64]>,
    ) -> Result<DecryptionKey, EngineError> {
        Ok(DecryptionKey::Key {
            master_key_id: ALICE,
            sub_key_id: ALICE_SUB,
        })
    }

    async fn decrypt_verify(
        &self,
        data: &[u8],
        _unlock: DecryptUnlock<'_>,
    ) -> Result<DecryptVerifyResult, EngineError> {
        Ok(DecryptVerifyResult {
            data: data.strip_prefix(b"PGP:").unwrap_or(data).to_vec(),
            signer_key_id: None,
            signature_valid: false,
        })
    }

    async fn edit_key(&self, key: &UnlockedKey, _changes: &KeyChanges) -> Result<(), EngineError> {
        self.check(key)
    }

    async fn change_unlock(
        &self,
        key: &UnlockedKey,
        _new_passphrase: &Passphrase,
    ) -> Result<(), EngineError> {
        self.check(key)
    }

    async fn revoke(&self, key: &UnlockedKey) -> Result<Vec<u8>, EngineError> {
        self.check(key)?;
        Ok(b"REVOKED".to_vec())
    }

    async fn certify(
        &self,
        certifier: &UnlockedKey,
        _target_master_key_id: i64,
        _signature_time: Option<DateTime<Utc>>,
    ) -> Result<(), EngineError> {
        self.check(certifier)
    }

    async fn delete(&self, _master_key_id: i64, _secret: bool) -> Result<(), EngineError> {
        Ok(())
    }

    async fn promote(
        &self,
        _master_key_id: i64,
        _sub_key_ids: Option<&[i64]>,
        _card_serial: Option<&str>,
    ) -> Result<(), EngineError> {
        Ok(())
    }

    async fn import(&self, _key_data: &[u8]) -> Result<ImportSummary, EngineError> {
        Ok(ImportSummary {
            imported: 1,
            ..ImportSummary::default()
        })
    }

    async fn export(
        &self,
        master_key_ids: &[i64],
        _include_secret: bool,
        _backup_code: Option<&Passphrase>,
    ) -> Result<Vec<u8>, EngineError> {
        Ok(format!("{:?}", master_key_ids).into_bytes())
    }
}

/// Key server without any keys
pub struct FakeKeyServer;

#[async_trait]
impl KeyServer for FakeKeyServer {
    async fn upload(&self, _key_data: &[u8]) -> Result<(), EngineError> {
        Ok(())
    }

    async fn fetch(&self, master_key_id: i64) -> Result<Vec<u8>, EngineError> {
        Err(EngineError::Network(format!("{} not found", master_key_id)))
    }

    async fn verify_proof(&self, _master_key_id: i64, _proof: &str) -> Result<bool, EngineError> {
        Ok(false)
    }
}

/// Dispatcher over the fakes with its own cache
pub fn dispatcher(engine: FakeEngine, workers: usize) -> Dispatcher {
    let keyring = keyring();
    let cache = CacheService::spawn(
        keyring.clone(),
        prefs(false),
        Arc::new(RecordingPresence::default()),
    );
    Dispatcher::with_workers(
        Backends {
            cache,
            keyring,
            engine: Arc::new(engine),
            key_server: Arc::new(FakeKeyServer),
        },
        workers,
    )
}

/// Progress sink remembering every update
#[derive(Default)]
pub struct RecordingProgress {
    updates: Mutex<Vec<ProgressUpdate>>,
}

impl RecordingProgress {
    pub fn updates(&self) -> Vec<ProgressUpdate> {
        self.updates.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_progress(&self, update: ProgressUpdate) {
        self.updates.lock().unwrap().push(update);
    }
}
