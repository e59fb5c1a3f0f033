//! Keyring metadata store
//!
//! The passphrase cache never sees key material. It only asks the keyring
//! what kind of secret a subkey has and how to label a master key.

use serde::{Deserialize, Serialize};

use crate::error::KeyringError;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryKeyring;
pub use sqlite::SqliteKeyring;

type Result<T> = std::result::Result<T, KeyringError>;

/// How the secret part of a subkey is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SecretKeyType {
    /// Protected by a passphrase
    Passphrase,
    /// Protected by an empty passphrase
    PassphraseEmpty,
    /// Private material lives on a hardware token
    DivertToCard,
    /// No secret material on this device
    Unavailable,
    /// GNU dummy packet: the secret was stripped on export
    GnuDummy,
}

impl SecretKeyType {
    /// Stable storage name
    pub fn as_str(&self) -> &'static str {
        match self {
            SecretKeyType::Passphrase => "passphrase",
            SecretKeyType::PassphraseEmpty => "passphrase_empty",
            SecretKeyType::DivertToCard => "divert_to_card",
            SecretKeyType::Unavailable => "unavailable",
            SecretKeyType::GnuDummy => "gnu_dummy",
        }
    }

    /// Parse the storage name back
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "passphrase" => Some(SecretKeyType::Passphrase),
            "passphrase_empty" => Some(SecretKeyType::PassphraseEmpty),
            "divert_to_card" => Some(SecretKeyType::DivertToCard),
            "unavailable" => Some(SecretKeyType::Unavailable),
            "gnu_dummy" => Some(SecretKeyType::GnuDummy),
            _ => None,
        }
    }

    /// Whether this device can produce a usable secret for the subkey
    pub fn is_usable(&self) -> bool {
        !matches!(self, SecretKeyType::Unavailable | SecretKeyType::GnuDummy)
    }
}

impl std::fmt::Display for SecretKeyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single subkey of a keyring. The master key appears as its own subkey.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubkeyRecord {
    pub key_id: i64,
    pub secret_type: SecretKeyType,
    #[serde(default)]
    pub can_certify: bool,
    #[serde(default)]
    pub can_sign: bool,
    #[serde(default)]
    pub can_encrypt: bool,
}

/// A keyring: master key id, primary user id and its subkeys in rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyringRecord {
    pub master_key_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub subkeys: Vec<SubkeyRecord>,
}

impl KeyringRecord {
    /// Find one of this keyring's subkeys
    pub fn subkey(&self, key_id: i64) -> Option<&SubkeyRecord> {
        self.subkeys.iter().find(|s| s.key_id == key_id)
    }

    /// Check the record is self-consistent before storing it
    pub fn validate(&self) -> Result<()> {
        if self.subkeys.is_empty() {
            return Err(KeyringError::InvalidRecord(format!(
                "keyring {} has no subkeys",
                format_key_id(self.master_key_id)
            )));
        }
        if self.subkey(self.master_key_id).is_none() {
            return Err(KeyringError::InvalidRecord(format!(
                "keyring {} does not list its master key",
                format_key_id(self.master_key_id)
            )));
        }
        Ok(())
    }
}

/// Read access to keyring metadata.
pub trait KeyringStore: Send + Sync {
    /// Secret type recorded for `sub_key_id` within keyring `master_key_id`
    fn secret_key_type(&self, master_key_id: i64, sub_key_id: i64) -> Result<SecretKeyType>;

    /// Primary user id of a keyring, used as the cache display label
    fn primary_user_id(&self, master_key_id: i64) -> Result<Option<String>>;

    /// Full record of a keyring
    fn keyring(&self, master_key_id: i64) -> Result<KeyringRecord>;

    /// All keyrings, ordered by master key id
    fn list_keyrings(&self) -> Result<Vec<KeyringRecord>>;
}

/// Pick the subkey used for signing with `master_key_id`.
///
/// The first signing-capable subkey whose secret is usable wins.
pub fn signing_subkey(store: &dyn KeyringStore, master_key_id: i64) -> Result<i64> {
    let keyring = store.keyring(master_key_id)?;
    keyring
        .subkeys
        .iter()
        .find(|s| s.can_sign && s.secret_type.is_usable())
        .map(|s| s.key_id)
        .ok_or(KeyringError::NotFound(master_key_id))
}

/// Format a key id as `0x` followed by 16 hex digits
pub fn format_key_id(key_id: i64) -> String {
    format!("{:#018x}", key_id)
}

/// Parse a key id from hex (`0x` prefix optional) or signed decimal.
///
/// A bare string of 16 hex digits is read as hex; anything shorter without a
/// prefix is read as decimal.
pub fn parse_key_id(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Some(hex) = value
        .strip_prefix("0x")
        .or_else(|| value.strip_prefix("0X"))
    {
        return u64::from_str_radix(hex, 16).ok().map(|v| v as i64);
    }
    if value.len() == 16 && value.chars().all(|c| c.is_ascii_hexdigit()) {
        return u64::from_str_radix(value, 16).ok().map(|v| v as i64);
    }
    value.parse::<i64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subkey(key_id: i64, secret_type: SecretKeyType, can_sign: bool) -> SubkeyRecord {
        SubkeyRecord {
            key_id,
            secret_type,
            can_certify: false,
            can_sign,
            can_encrypt: !can_sign,
        }
    }

    #[test]
    fn test_secret_key_type_roundtrip_names() {
        for kind in [
            SecretKeyType::Passphrase,
            SecretKeyType::PassphraseEmpty,
            SecretKeyType::DivertToCard,
            SecretKeyType::Unavailable,
            SecretKeyType::GnuDummy,
        ] {
            assert_eq!(SecretKeyType::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(SecretKeyType::parse("bogus"), None);
    }

    #[test]
    fn test_usable_secret_types() {
        assert!(SecretKeyType::Passphrase.is_usable());
        assert!(SecretKeyType::DivertToCard.is_usable());
        assert!(!SecretKeyType::Unavailable.is_usable());
        assert!(!SecretKeyType::GnuDummy.is_usable());
    }

    #[test]
    fn test_format_key_id() {
        assert_eq!(format_key_id(42), "0x000000000000002a");
        assert_eq!(format_key_id(-1), "0xffffffffffffffff");
    }

    #[test]
    fn test_parse_key_id() {
        assert_eq!(parse_key_id("0x2a"), Some(42));
        assert_eq!(parse_key_id("42"), Some(42));
        assert_eq!(parse_key_id("-1"), Some(-1));
        assert_eq!(parse_key_id("ffffffffffffffff"), Some(-1));
        assert_eq!(parse_key_id("0xFFFFFFFFFFFFFFFF"), Some(-1));
        assert_eq!(parse_key_id("not-a-key"), None);
    }

    #[test]
    fn test_validate_requires_master_subkey() {
        let record = KeyringRecord {
            master_key_id: 1,
            user_id: None,
            subkeys: vec![subkey(2, SecretKeyType::Passphrase, true)],
        };
        assert!(record.validate().is_err());

        let empty = KeyringRecord {
            master_key_id: 1,
            user_id: None,
            subkeys: vec![],
        };
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_signing_subkey_skips_stripped() {
        let store = MemoryKeyring::new().with_keyring(KeyringRecord {
            master_key_id: 10,
            user_id: Some("Alice <alice@example.org>".to_string()),
            subkeys: vec![
                subkey(10, SecretKeyType::GnuDummy, true),
                subkey(11, SecretKeyType::Passphrase, false),
                subkey(12, SecretKeyType::Passphrase, true),
            ],
        });

        assert_eq!(signing_subkey(&store, 10).unwrap(), 12);
    }

    #[test]
    fn test_signing_subkey_none_available() {
        let store = MemoryKeyring::new().with_keyring(KeyringRecord {
            master_key_id: 10,
            user_id: None,
            subkeys: vec![subkey(10, SecretKeyType::Unavailable, true)],
        });

        assert!(matches!(
            signing_subkey(&store, 10),
            Err(KeyringError::NotFound(10))
        ));
    }
}
