//! In-memory cache store
//!
//! Maps effective cache keys to secret entries and keeps one expiry timer per
//! entry. The store is owned by a single task; it is not shared directly.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;

use super::expiry::{Expired, ExpiryScheduler};
use super::secret::SecretEntry;
use crate::keyring::format_key_id;

/// Entries keyed by effective cache key.
pub struct CacheStore {
    entries: HashMap<i64, SecretEntry>,
    expiry: ExpiryScheduler,
}

impl CacheStore {
    pub fn new(expiry: ExpiryScheduler) -> Self {
        Self {
            entries: HashMap::new(),
            expiry,
        }
    }

    /// Insert or replace the entry for `key` and (re)arm its timer.
    ///
    /// A replaced entry is wiped immediately.
    pub fn put(&mut self, key: i64, entry: SecretEntry) {
        let ttl = entry.ttl();
        if let Some(old) = self.entries.insert(key, entry) {
            debug!("Replacing cached entry for {}", format_key_id(key));
            old.wipe();
        }
        self.expiry.arm(key, ttl);
    }

    /// Pure lookup; does not touch the timer
    pub fn get(&self, key: i64) -> Option<&SecretEntry> {
        self.entries.get(&key)
    }

    /// Restart the timer of an existing entry with the entry's own TTL
    pub fn refresh(&mut self, key: i64) -> bool {
        match self.entries.get(&key) {
            Some(entry) => {
                self.expiry.arm(key, entry.ttl());
                true
            }
            None => false,
        }
    }

    /// Remove and return the entry for `key`. The caller wipes it.
    pub fn remove(&mut self, key: i64) -> Option<SecretEntry> {
        self.expiry.cancel(key);
        self.entries.remove(&key)
    }

    /// Handle a timer report: remove the entry if the report is current
    pub fn expire(&mut self, fired: &Expired) -> Option<SecretEntry> {
        if !self.expiry.accept(fired) {
            return None;
        }
        debug!("Cached entry for {} expired", format_key_id(fired.key));
        self.entries.remove(&fired.key)
    }

    /// Remove the entry for `key` if its TTL has run out but the timer
    /// report has not been handled yet
    pub fn take_if_due(&mut self, key: i64) -> Option<SecretEntry> {
        if !self.expiry.is_due(key) {
            return None;
        }
        debug!("Cached entry for {} expired on lookup", format_key_id(key));
        self.remove(key)
    }

    /// Wipe and drop every entry and cancel every timer
    pub fn clear(&mut self) -> usize {
        self.expiry.cancel_all();
        let count = self.entries.len();
        for (_, entry) in self.entries.drain() {
            entry.wipe();
        }
        count
    }

    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Time left before `key` expires; `None` if it never expires or is absent
    pub fn expires_in(&self, key: i64) -> Option<Duration> {
        self.expiry.remaining(key)
    }

    /// All entries, in no particular order
    pub fn iter(&self) -> impl Iterator<Item = (i64, &SecretEntry)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        self.clear();
    }
}
