//! Key-type resolution
//!
//! Decides what kind of secret a (master, subkey) request needs before the
//! cache store is consulted. Some kinds never reach the store at all.

use std::sync::Arc;

use log::debug;

use super::key::{KEY_ID_NONE, KEY_ID_SYMMETRIC, check_key_pair};
use super::secret::Passphrase;
use crate::config::PreferenceSource;
use crate::error::CacheError;
use crate::keyring::{KeyringStore, SecretKeyType, format_key_id};

/// Factory PIN of OpenPGP smart cards
pub const DEFAULT_HARDWARE_PIN: &str = "123456";

/// What a request has to supply to unlock its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    /// Ordinary passphrase: look in the cache, then prompt
    Ordinary,
    /// Empty passphrase: answered immediately
    Empty,
    /// Hardware token with the default-PIN preference on: answered immediately
    HardwarePinDefault,
    /// Hardware token PIN: look in the cache, then prompt
    HardwarePinPrompt,
}

impl SecretKind {
    /// Whether the answer comes from the cache (or a prompt) rather than a constant
    pub fn needs_lookup(&self) -> bool {
        matches!(self, SecretKind::Ordinary | SecretKind::HardwarePinPrompt)
    }

    /// Constant answer for kinds that need no lookup
    pub fn immediate_secret(&self) -> Option<Passphrase> {
        match self {
            SecretKind::Empty => Some(Passphrase::empty()),
            SecretKind::HardwarePinDefault => Some(Passphrase::from(DEFAULT_HARDWARE_PIN)),
            _ => None,
        }
    }
}

/// Resolves secret kinds against the keyring and the user's preferences
#[derive(Clone)]
pub struct KeyTypeResolver {
    keyring: Arc<dyn KeyringStore>,
    prefs: Arc<dyn PreferenceSource>,
}

impl KeyTypeResolver {
    pub fn new(keyring: Arc<dyn KeyringStore>, prefs: Arc<dyn PreferenceSource>) -> Self {
        Self { keyring, prefs }
    }

    /// Kind of secret needed to unlock `sub_key_id` of `master_key_id`.
    ///
    /// Unavailable and stripped secrets are errors; nothing is cached for them.
    pub fn resolve_secret_kind(
        &self,
        master_key_id: i64,
        sub_key_id: i64,
    ) -> Result<SecretKind, CacheError> {
        check_key_pair(master_key_id, sub_key_id)?;

        if master_key_id == KEY_ID_SYMMETRIC || master_key_id == KEY_ID_NONE {
            return Ok(SecretKind::Ordinary);
        }

        let secret_type = self.keyring.secret_key_type(master_key_id, sub_key_id)?;
        debug!(
            "Subkey {} of {} has secret type {}",
            format_key_id(sub_key_id),
            format_key_id(master_key_id),
            secret_type
        );

        match secret_type {
            SecretKeyType::Passphrase => Ok(SecretKind::Ordinary),
            SecretKeyType::PassphraseEmpty => Ok(SecretKind::Empty),
            SecretKeyType::DivertToCard if self.prefs.use_default_hardware_pin() => {
                Ok(SecretKind::HardwarePinDefault)
            }
            SecretKeyType::DivertToCard => Ok(SecretKind::HardwarePinPrompt),
            SecretKeyType::Unavailable => Err(CacheError::SecretUnavailable(sub_key_id)),
            SecretKeyType::GnuDummy => Err(CacheError::SecretStripped(sub_key_id)),
        }
    }

    /// Label for a new cache entry: the primary user id, or a fixed name for
    /// the symmetric slot
    pub fn display_label(&self, master_key_id: i64) -> Result<String, CacheError> {
        if master_key_id == KEY_ID_SYMMETRIC {
            return Ok("Symmetric".to_string());
        }
        Ok(self
            .keyring
            .primary_user_id(master_key_id)?
            .unwrap_or_else(|| format_key_id(master_key_id)))
    }

    pub fn preferences(&self) -> &dyn PreferenceSource {
        self.prefs.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Preferences;
    use crate::keyring::{KeyringRecord, MemoryKeyring, SubkeyRecord};

    fn keyring() -> Arc<MemoryKeyring> {
        let sub = |key_id, secret_type| SubkeyRecord {
            key_id,
            secret_type,
            can_certify: false,
            can_sign: true,
            can_encrypt: false,
        };
        Arc::new(MemoryKeyring::new().with_keyring(KeyringRecord {
            master_key_id: 42,
            user_id: Some("Alice <alice@example.org>".to_string()),
            subkeys: vec![
                sub(42, SecretKeyType::Passphrase),
                sub(43, SecretKeyType::PassphraseEmpty),
                sub(44, SecretKeyType::DivertToCard),
                sub(45, SecretKeyType::Unavailable),
                sub(46, SecretKeyType::GnuDummy),
            ],
        }))
    }

    fn resolver(default_pin: bool) -> KeyTypeResolver {
        let prefs = Preferences {
            use_default_hardware_pin: default_pin,
            ..Preferences::default()
        };
        KeyTypeResolver::new(keyring(), Arc::new(prefs))
    }

    #[test]
    fn test_ordinary_and_empty() {
        let r = resolver(false);
        assert_eq!(r.resolve_secret_kind(42, 42).unwrap(), SecretKind::Ordinary);
        assert_eq!(r.resolve_secret_kind(42, 43).unwrap(), SecretKind::Empty);
        assert!(
            SecretKind::Empty
                .immediate_secret()
                .unwrap()
                .is_empty()
        );
    }

    #[test]
    fn test_hardware_pin_follows_preference() {
        assert_eq!(
            resolver(false).resolve_secret_kind(42, 44).unwrap(),
            SecretKind::HardwarePinPrompt
        );

        let kind = resolver(true).resolve_secret_kind(42, 44).unwrap();
        assert_eq!(kind, SecretKind::HardwarePinDefault);
        assert!(!kind.needs_lookup());
        assert_eq!(kind.immediate_secret().unwrap().as_bytes(), b"123456");
    }

    #[test]
    fn test_unavailable_and_stripped_are_errors() {
        let r = resolver(false);
        assert!(matches!(
            r.resolve_secret_kind(42, 45),
            Err(CacheError::SecretUnavailable(45))
        ));
        assert!(matches!(
            r.resolve_secret_kind(42, 46),
            Err(CacheError::SecretStripped(46))
        ));
    }

    #[test]
    fn test_unknown_key_is_key_not_found() {
        let err = resolver(false).resolve_secret_kind(7, 7).unwrap_err();
        assert!(err.is_key_not_found());
    }

    #[test]
    fn test_symmetric_skips_keyring() {
        let r = resolver(false);
        assert_eq!(
            r.resolve_secret_kind(KEY_ID_SYMMETRIC, KEY_ID_SYMMETRIC)
                .unwrap(),
            SecretKind::Ordinary
        );
        assert_eq!(r.display_label(KEY_ID_SYMMETRIC).unwrap(), "Symmetric");
    }

    #[test]
    fn test_display_label_uses_primary_user_id() {
        assert_eq!(
            resolver(false).display_label(42).unwrap(),
            "Alice <alice@example.org>"
        );
    }
}
