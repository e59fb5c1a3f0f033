//! Per-entry expiry timers
//!
//! Each armed key owns one sleeping tokio task. When it wakes it reports
//! `(key, generation)` on a channel; the owner of the store decides whether
//! that report is still current. Re-arming a key bumps its generation, so a
//! timer that fires concurrently with a newer `put` is recognised as stale.

use std::collections::HashMap;
use std::time::Duration;

use log::debug;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::keyring::format_key_id;

/// Report sent by a timer when its TTL elapsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Expired {
    pub key: i64,
    pub generation: u64,
}

struct Timer {
    generation: u64,
    deadline: Instant,
    task: JoinHandle<()>,
}

/// One-shot, cancellable, re-armable timers keyed by cache key.
///
/// Must be used from within a tokio runtime.
pub struct ExpiryScheduler {
    timers: HashMap<i64, Timer>,
    next_generation: u64,
    fired: UnboundedSender<Expired>,
}

impl ExpiryScheduler {
    /// Timers report on `fired` when they elapse
    pub fn new(fired: UnboundedSender<Expired>) -> Self {
        Self {
            timers: HashMap::new(),
            next_generation: 0,
            fired,
        }
    }

    /// Schedule expiry of `key` after `ttl`, replacing any earlier schedule.
    ///
    /// A zero TTL only cancels: the entry then lives until removed.
    pub fn arm(&mut self, key: i64, ttl: Duration) {
        self.cancel(key);
        if ttl.is_zero() {
            return;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let deadline = Instant::now() + ttl;
        let fired = self.fired.clone();

        let task = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // Receiver gone means the cache shut down; nothing left to expire.
            let _ = fired.send(Expired { key, generation });
        });

        debug!(
            "Armed expiry for {} in {}s (generation {})",
            format_key_id(key),
            ttl.as_secs(),
            generation
        );
        self.timers.insert(
            key,
            Timer {
                generation,
                deadline,
                task,
            },
        );
    }

    /// Cancel the pending timer for `key`, if any
    pub fn cancel(&mut self, key: i64) -> bool {
        match self.timers.remove(&key) {
            Some(timer) => {
                timer.task.abort();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer
    pub fn cancel_all(&mut self) {
        for (_, timer) in self.timers.drain() {
            timer.task.abort();
        }
    }

    /// Accept a fired report if it belongs to the key's current schedule.
    ///
    /// Stale reports (the key was re-armed or cancelled after this timer
    /// was started) return false and leave the current schedule untouched.
    pub fn accept(&mut self, expired: &Expired) -> bool {
        match self.timers.get(&expired.key) {
            Some(timer) if timer.generation == expired.generation => {
                self.timers.remove(&expired.key);
                true
            }
            _ => {
                debug!(
                    "Ignoring stale expiry for {} (generation {})",
                    format_key_id(expired.key),
                    expired.generation
                );
                false
            }
        }
    }

    /// Whether `key` has a pending timer
    pub fn is_armed(&self, key: i64) -> bool {
        self.timers.contains_key(&key)
    }

    /// Whether the deadline of `key` has passed, reported or not
    pub fn is_due(&self, key: i64) -> bool {
        self.timers
            .get(&key)
            .is_some_and(|t| t.deadline <= Instant::now())
    }

    /// Time left before `key` expires
    pub fn remaining(&self, key: i64) -> Option<Duration> {
        self.timers
            .get(&key)
            .map(|t| t.deadline.saturating_duration_since(Instant::now()))
    }
}

impl Drop for ExpiryScheduler {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
