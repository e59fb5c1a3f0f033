//! Process-presence signal
//!
//! Keeps the hosting process visibly alive only while secrets are cached.

use log::info;

/// Told about cache occupancy changes.
///
/// `activate` is called whenever the set of cached entries changes while at
/// least one entry is present; `deactivate` once the cache becomes empty.
/// Implementations must not call back into the cache.
pub trait PresenceSignal: Send + Sync {
    fn activate(&self, count: usize, labels: &[String]);
    fn deactivate(&self);
}

/// Reports presence changes through the log
#[derive(Debug, Default)]
pub struct LogPresence;

impl PresenceSignal for LogPresence {
    fn activate(&self, count: usize, labels: &[String]) {
        info!("Passphrase cache holds {} entries: {}", count, labels.join(", "));
    }

    fn deactivate(&self) {
        info!("Passphrase cache is empty");
    }
}

/// Ignores presence changes
#[derive(Debug, Default)]
pub struct NoopPresence;

impl PresenceSignal for NoopPresence {
    fn activate(&self, _count: usize, _labels: &[String]) {}

    fn deactivate(&self) {}
}
