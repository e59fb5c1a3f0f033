//! Crypto operations and their dispatcher
//!
//! Every operation kind is one variant of [`OperationRequest`]. The
//! [`Dispatcher`] picks the implementation with an exhaustive match, runs it
//! on a bounded pool and reports exactly one terminal [`OperationResult`].
//! Operations never prompt: a missing secret ends the run in
//! [`OperationState::PendingInput`] naming what the caller has to supply.

use chrono::{DateTime, Utc};
use serde::Serialize;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::cache::Passphrase;
use crate::keyring::format_key_id;

pub mod benchmark;
pub mod context;
pub mod crypto;
pub mod dispatcher;
pub mod engine;
pub mod keys;
pub mod parse;
pub mod progress;
pub mod result;
pub mod transfer;

#[cfg(test)]
pub mod mock;

pub use benchmark::BenchmarkReport;
pub use context::{Backends, CancelFlag, OperationContext, SecretSource, UnlockedKey};
pub use dispatcher::{DEFAULT_WORKERS, Dispatcher, OperationHandle};
pub use engine::{
    DecryptUnlock, DecryptionKey, DecryptVerifyResult, ImportSummary, KeyServer, PgpEngine,
    UnsupportedEngine, UnsupportedKeyServer,
};
pub use parse::{BlockKind, InputBlock};
pub use progress::{Progress, ProgressSink, ProgressUpdate};
pub use result::{
    LogEntry, LogLevel, OperationLog, OperationOutput, OperationResult, OperationState,
};
pub use transfer::KeySyncReport;

/// Pre-decrypted symmetric session key of a message
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SessionKey {
    /// OpenPGP symmetric algorithm id
    pub algorithm: u8,
    key: Vec<u8>,
}

impl SessionKey {
    pub fn new(algorithm: u8, key: impl Into<Vec<u8>>) -> Self {
        Self {
            algorithm,
            key: key.into(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }
}

impl std::fmt::Debug for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey")
            .field("algorithm", &self.algorithm)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Inputs the caller already resolved, sparing the operation a prompt
#[derive(Debug, Clone, Default)]
pub struct CryptoInput {
    pub passphrase: Option<Passphrase>,
    pub session_key: Option<SessionKey>,
    /// Creation time for signatures made by this request
    pub signature_time: Option<DateTime<Utc>>,
}

impl CryptoInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_passphrase(mut self, passphrase: impl Into<Passphrase>) -> Self {
        self.passphrase = Some(passphrase.into());
        self
    }

    pub fn with_session_key(mut self, session_key: SessionKey) -> Self {
        self.session_key = Some(session_key);
        self
    }

    pub fn with_signature_time(mut self, time: DateTime<Utc>) -> Self {
        self.signature_time = Some(time);
        self
    }
}

/// Input an operation needs before it can finish
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequiredInput {
    Passphrase { master_key_id: i64, sub_key_id: i64 },
    HardwarePin { master_key_id: i64, sub_key_id: i64 },
    SymmetricPassphrase,
    BackupCode,
}

impl std::fmt::Display for RequiredInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequiredInput::Passphrase {
                master_key_id,
                sub_key_id,
            } => write!(
                f,
                "passphrase for key {} (subkey {})",
                format_key_id(*master_key_id),
                format_key_id(*sub_key_id)
            ),
            RequiredInput::HardwarePin {
                master_key_id,
                sub_key_id,
            } => write!(
                f,
                "hardware token PIN for key {} (subkey {})",
                format_key_id(*master_key_id),
                format_key_id(*sub_key_id)
            ),
            RequiredInput::SymmetricPassphrase => f.write_str("symmetric passphrase"),
            RequiredInput::BackupCode => f.write_str("backup code"),
        }
    }
}

// ============================================================================
// Request parameters
// ============================================================================

/// Sign and/or encrypt a payload
#[derive(Debug, Clone, Default)]
pub struct SignEncryptParams {
    /// Keyring to sign with; `None` for an unsigned message
    pub signature_master_key_id: Option<i64>,
    /// Recipients' master key ids
    pub encryption_key_ids: Vec<i64>,
    /// Also encrypt to a symmetric passphrase
    pub symmetric: bool,
    /// Symmetric passphrase chosen by the user, if already known
    pub symmetric_passphrase: Option<Passphrase>,
    pub armor: bool,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Default)]
pub struct DecryptVerifyParams {
    pub data: Vec<u8>,
    /// Restrict decryption to these master keys
    pub allowed_key_ids: Option<Vec<i64>>,
}

/// Changes applied to a keyring by [`EditKeyParams`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyChanges {
    pub add_user_ids: Vec<String>,
    pub revoke_user_ids: Vec<String>,
    pub primary_user_id: Option<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl KeyChanges {
    pub fn is_empty(&self) -> bool {
        self.add_user_ids.is_empty()
            && self.revoke_user_ids.is_empty()
            && self.primary_user_id.is_none()
            && self.expiry.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct EditKeyParams {
    pub master_key_id: i64,
    pub changes: KeyChanges,
}

/// Replace the passphrase protecting a keyring
#[derive(Debug, Clone)]
pub struct ChangeUnlockParams {
    pub master_key_id: i64,
    pub new_passphrase: Passphrase,
}

#[derive(Debug, Clone)]
pub struct RevokeParams {
    pub master_key_id: i64,
    /// Publish the revoked key afterwards
    pub upload: bool,
}

#[derive(Debug, Clone)]
pub struct CertifyParams {
    pub certifier_master_key_id: i64,
    pub target_key_ids: Vec<i64>,
    pub upload: bool,
}

#[derive(Debug, Clone)]
pub struct DeleteParams {
    pub master_key_ids: Vec<i64>,
    /// Delete secret keys too, not only public keys
    pub secret: bool,
}

/// Turn a public key into a secret key whose material lives on a token
#[derive(Debug, Clone)]
pub struct PromoteParams {
    pub master_key_id: i64,
    /// Subkeys to promote; all of them when `None`
    pub sub_key_ids: Option<Vec<i64>>,
    pub card_serial: Option<String>,
}

#[derive(Debug, Clone)]
pub enum ImportSource {
    Data(Vec<u8>),
    KeyServer(Vec<i64>),
}

#[derive(Debug, Clone)]
pub struct ImportParams {
    pub source: ImportSource,
}

#[derive(Debug, Clone)]
pub struct BackupParams {
    pub master_key_ids: Vec<i64>,
    /// Include secret keys; they are encrypted with a backup code
    pub include_secret: bool,
}

#[derive(Debug, Clone)]
pub struct UploadParams {
    pub master_key_id: i64,
}

/// Check a linked identity proof published for a key
#[derive(Debug, Clone)]
pub struct VerifyProofParams {
    pub master_key_id: i64,
    pub proof: String,
}

/// Split user input into ASCII-armored OpenPGP blocks and plain text
#[derive(Debug, Clone)]
pub struct ParseInputParams {
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct BenchmarkParams {
    /// Rounds of hashing `chunk_size` bytes
    pub iterations: u32,
    pub chunk_size: usize,
}

impl Default for BenchmarkParams {
    fn default() -> Self {
        Self {
            iterations: 256,
            chunk_size: 64 * 1024,
        }
    }
}

/// Refresh keys from the key server
#[derive(Debug, Clone)]
pub struct KeySyncParams {
    pub master_key_ids: Vec<i64>,
}

/// A crypto-operation request. Immutable once submitted.
#[derive(Debug, Clone)]
pub enum OperationRequest {
    SignEncrypt(SignEncryptParams),
    DecryptVerify(DecryptVerifyParams),
    EditKey(EditKeyParams),
    ChangeUnlock(ChangeUnlockParams),
    Revoke(RevokeParams),
    Certify(CertifyParams),
    Delete(DeleteParams),
    Promote(PromoteParams),
    Import(ImportParams),
    Backup(BackupParams),
    Upload(UploadParams),
    VerifyProof(VerifyProofParams),
    ParseInput(ParseInputParams),
    Benchmark(BenchmarkParams),
    KeySync(KeySyncParams),
}

impl OperationRequest {
    /// Short name used in logs and output
    pub fn name(&self) -> &'static str {
        match self {
            OperationRequest::SignEncrypt(_) => "sign-encrypt",
            OperationRequest::DecryptVerify(_) => "decrypt-verify",
            OperationRequest::EditKey(_) => "edit-key",
            OperationRequest::ChangeUnlock(_) => "change-unlock",
            OperationRequest::Revoke(_) => "revoke",
            OperationRequest::Certify(_) => "certify",
            OperationRequest::Delete(_) => "delete",
            OperationRequest::Promote(_) => "promote",
            OperationRequest::Import(_) => "import",
            OperationRequest::Backup(_) => "backup",
            OperationRequest::Upload(_) => "upload",
            OperationRequest::VerifyProof(_) => "verify-proof",
            OperationRequest::ParseInput(_) => "parse-input",
            OperationRequest::Benchmark(_) => "benchmark",
            OperationRequest::KeySync(_) => "key-sync",
        }
    }
}

/// One runnable operation
#[async_trait::async_trait]
pub trait Operation: Send + Sync {
    async fn execute(
        &self,
        ctx: &OperationContext,
    ) -> std::result::Result<OperationOutput, crate::error::OperationError>;
}

/// Select the implementation for a request
pub fn operation_for(request: OperationRequest) -> Box<dyn Operation> {
    match request {
        OperationRequest::SignEncrypt(p) => Box::new(crypto::SignEncrypt(p)),
        OperationRequest::DecryptVerify(p) => Box::new(crypto::DecryptVerify(p)),
        OperationRequest::EditKey(p) => Box::new(keys::EditKey(p)),
        OperationRequest::ChangeUnlock(p) => Box::new(keys::ChangeUnlock(p)),
        OperationRequest::Revoke(p) => Box::new(keys::Revoke(p)),
        OperationRequest::Certify(p) => Box::new(keys::Certify(p)),
        OperationRequest::Delete(p) => Box::new(keys::Delete(p)),
        OperationRequest::Promote(p) => Box::new(keys::Promote(p)),
        OperationRequest::Import(p) => Box::new(transfer::Import(p)),
        OperationRequest::Backup(p) => Box::new(transfer::Backup(p)),
        OperationRequest::Upload(p) => Box::new(transfer::Upload(p)),
        OperationRequest::VerifyProof(p) => Box::new(transfer::VerifyProof(p)),
        OperationRequest::ParseInput(p) => Box::new(parse::ParseInput(p)),
        OperationRequest::Benchmark(p) => Box::new(benchmark::Benchmark(p)),
        OperationRequest::KeySync(p) => Box::new(transfer::KeySync(p)),
    }
}
