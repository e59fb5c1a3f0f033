//! Secret values and cache entries
//!
//! Every byte buffer holding a passphrase is zeroed in place before its
//! memory is released. Cache entries are additionally wiped explicitly when
//! they leave the store, so the plaintext is gone even while another handle
//! still points at the allocation.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use zeroize::{Zeroize, ZeroizeOnDrop};

/// A passphrase, PIN or symmetric password handed to or from the cache.
///
/// Cloning copies the bytes; each copy zeroes itself when dropped.
#[derive(Clone, Default, Zeroize, ZeroizeOnDrop)]
pub struct Passphrase {
    bytes: Vec<u8>,
}

impl Passphrase {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            bytes: bytes.into(),
        }
    }

    /// The zero-length passphrase used by keys with an empty passphrase
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<&str> for Passphrase {
    fn from(value: &str) -> Self {
        Self::new(value.as_bytes())
    }
}

impl From<String> for Passphrase {
    fn from(value: String) -> Self {
        Self::new(value.into_bytes())
    }
}

// Manual Debug implementation to avoid exposing secrets
impl std::fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passphrase")
            .field("bytes", &"[REDACTED]")
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Heap cell owning the cached copy of a secret.
struct SecretCell {
    bytes: Mutex<Vec<u8>>,
}

impl SecretCell {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Mutex::new(bytes),
        }
    }

    fn wipe(&self) {
        let mut bytes = self.bytes.lock().unwrap_or_else(|e| e.into_inner());
        bytes.as_mut_slice().zeroize();
    }

    fn is_wiped(&self) -> bool {
        let bytes = self.bytes.lock().unwrap_or_else(|e| e.into_inner());
        bytes.iter().all(|b| *b == 0)
    }

    fn copy_out(&self) -> Passphrase {
        let bytes = self.bytes.lock().unwrap_or_else(|e| e.into_inner());
        Passphrase::new(bytes.as_slice())
    }
}

impl Drop for SecretCell {
    fn drop(&mut self) {
        let bytes = self.bytes.get_mut().unwrap_or_else(|e| e.into_inner());
        bytes.zeroize();
    }
}

/// One cached secret plus the metadata shown in cache inspection.
pub struct SecretEntry {
    secret: Arc<SecretCell>,
    label: String,
    ttl: Duration,
}

impl SecretEntry {
    /// Take ownership of `secret`. The caller's buffer is moved, not copied.
    pub fn new(mut secret: Passphrase, label: impl Into<String>, ttl: Duration) -> Self {
        let bytes = std::mem::take(&mut secret.bytes);
        Self {
            secret: Arc::new(SecretCell::new(bytes)),
            label: label.into(),
            ttl,
        }
    }

    /// Display label, e.g. the key's primary user id. Not a security property.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Lifetime this entry was inserted with; zero means no automatic expiry
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Copy the secret out for a caller
    pub fn passphrase(&self) -> Passphrase {
        self.secret.copy_out()
    }

    /// Overwrite the secret bytes with zeros in place
    pub fn wipe(&self) {
        self.secret.wipe();
    }

    /// Observer that reports whether this entry's storage has been wiped.
    ///
    /// It grants no access to the secret itself.
    pub fn watch(&self) -> WipeWatch {
        WipeWatch {
            secret: Arc::clone(&self.secret),
        }
    }
}

impl std::fmt::Debug for SecretEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretEntry")
            .field("secret", &"[REDACTED]")
            .field("label", &self.label)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// See [`SecretEntry::watch`].
#[derive(Clone)]
pub struct WipeWatch {
    secret: Arc<SecretCell>,
}

impl WipeWatch {
    /// True once every byte of the watched secret is zero
    pub fn is_wiped(&self) -> bool {
        self.secret.is_wiped()
    }
}

impl std::fmt::Debug for WipeWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WipeWatch")
            .field("wiped", &self.is_wiped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passphrase_debug_is_redacted() {
        let pass = Passphrase::from("hunter2");
        let debug = format!("{:?}", pass);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_entry_copies_out_secret() {
        let entry = SecretEntry::new("hunter2".into(), "Alice", Duration::from_secs(15));
        assert_eq!(entry.passphrase().as_bytes(), b"hunter2");
        assert_eq!(entry.label(), "Alice");
        assert_eq!(entry.ttl(), Duration::from_secs(15));
    }

    #[test]
    fn test_wipe_zeroes_in_place() {
        let entry = SecretEntry::new("hunter2".into(), "Alice", Duration::from_secs(15));
        let watch = entry.watch();
        assert!(!watch.is_wiped());

        entry.wipe();

        assert!(watch.is_wiped());
        assert_eq!(entry.passphrase().as_bytes(), &[0u8; 7]);
    }

    #[test]
    fn test_copies_survive_wipe() {
        let entry = SecretEntry::new("hunter2".into(), "Alice", Duration::from_secs(15));
        let copy = entry.passphrase();
        entry.wipe();
        assert_eq!(copy.as_bytes(), b"hunter2");
    }

    #[test]
    fn test_entry_debug_is_redacted() {
        let entry = SecretEntry::new("hunter2".into(), "Alice", Duration::from_secs(15));
        let debug = format!("{:?}", entry);
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("Alice"));
    }

    #[test]
    fn test_empty_passphrase() {
        let pass = Passphrase::empty();
        assert!(pass.is_empty());
        assert_eq!(pass.len(), 0);
    }
}
