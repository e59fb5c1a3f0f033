//! In-memory passphrase cache
//!
//! Secrets are held only in process memory, expire on per-entry timers and
//! are zeroed on every path out of the store.

pub mod expiry;
pub mod key;
pub mod presence;
pub mod resolver;
pub mod secret;
pub mod service;
pub mod store;

// Re-export main types
pub use key::{CacheSlot, KEY_ID_NONE, KEY_ID_SYMMETRIC, resolve_cache_key};
pub use presence::{LogPresence, NoopPresence, PresenceSignal};
pub use resolver::{DEFAULT_HARDWARE_PIN, KeyTypeResolver, SecretKind};
pub use secret::{Passphrase, SecretEntry, WipeWatch};
pub use service::{CacheHandle, CacheService, CacheSnapshot, CachedEntryInfo, DEFAULT_GET_TIMEOUT};
