//! Passphrase cache service
//!
//! One task owns the [`CacheStore`]; everything else talks to it through a
//! cloneable [`CacheHandle`]. Commands and timer reports arrive on separate
//! channels, so expiry is serialized with `put`/`get`/`remove` without locks.
//!
//! Key selection and keyring lookups happen on the caller's side of the
//! channel. The owning task never blocks on anything but its own store.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use super::expiry::{Expired, ExpiryScheduler};
use super::key::{CacheSlot, resolve_cache_key};
use super::presence::PresenceSignal;
use super::resolver::{KeyTypeResolver, SecretKind};
use super::secret::{Passphrase, SecretEntry, WipeWatch};
use super::store::CacheStore;
use crate::config::PreferenceSource;
use crate::error::CacheError;
use crate::keyring::{KeyringStore, format_key_id};

/// Bounded wait of cache lookups unless configured otherwise
pub const DEFAULT_GET_TIMEOUT: Duration = Duration::from_millis(3000);

const COMMAND_BUFFER: usize = 64;

/// One cache entry as shown to users; never carries the secret
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachedEntryInfo {
    pub key_id: i64,
    pub label: String,
    pub ttl_seconds: u64,
    /// Seconds until automatic expiry; absent for entries that never expire
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_seconds: Option<u64>,
}

/// Point-in-time view of the cache, ordered by key id
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheSnapshot {
    pub entries: Vec<CachedEntryInfo>,
}

impl CacheSnapshot {
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn labels(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.label.clone()).collect()
    }
}

enum Command {
    Put {
        key: i64,
        entry: SecretEntry,
        reply: oneshot::Sender<()>,
    },
    Get {
        key: i64,
        reply: oneshot::Sender<Option<Passphrase>>,
    },
    Remove {
        key: i64,
        reply: oneshot::Sender<bool>,
    },
    Clear {
        reply: oneshot::Sender<usize>,
    },
    Snapshot {
        reply: oneshot::Sender<CacheSnapshot>,
    },
    Watch {
        key: i64,
        reply: oneshot::Sender<Option<WipeWatch>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Owner of the cache store
pub struct CacheService {
    store: CacheStore,
    presence: Arc<dyn PresenceSignal>,
}

impl CacheService {
    /// Start the cache task on the current tokio runtime and return a handle.
    ///
    /// The task stops on [`CacheHandle::shutdown`] or once every handle has
    /// been dropped; either way all cached secrets are wiped.
    pub fn spawn(
        keyring: Arc<dyn KeyringStore>,
        prefs: Arc<dyn PreferenceSource>,
        presence: Arc<dyn PresenceSignal>,
    ) -> CacheHandle {
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let (expired_tx, expired_rx) = mpsc::unbounded_channel();

        let service = CacheService {
            store: CacheStore::new(ExpiryScheduler::new(expired_tx)),
            presence,
        };
        tokio::spawn(service.run(commands_rx, expired_rx));
        debug!("Passphrase cache service started");

        CacheHandle {
            commands: commands_tx,
            resolver: KeyTypeResolver::new(keyring, prefs),
            runtime: Handle::current(),
            get_timeout: DEFAULT_GET_TIMEOUT,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut expired: mpsc::UnboundedReceiver<Expired>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => {
                        if !self.handle(command) {
                            break;
                        }
                    }
                    None => break,
                },
                Some(fired) = expired.recv() => self.on_expired(fired),
            }
        }
        self.teardown();
        debug!("Passphrase cache service stopped");
    }

    /// Apply one command; false once the service should stop
    fn handle(&mut self, command: Command) -> bool {
        match command {
            Command::Put { key, entry, reply } => {
                debug!(
                    "Caching passphrase for {} ({}s)",
                    format_key_id(key),
                    entry.ttl().as_secs()
                );
                self.store.put(key, entry);
                let _ = reply.send(());
                self.notify_presence();
            }
            Command::Get { key, reply } => {
                if let Some(entry) = self.store.take_if_due(key) {
                    entry.wipe();
                    let _ = reply.send(None);
                    self.notify_presence();
                    return true;
                }
                let found = self.store.get(key).map(SecretEntry::passphrase);
                if found.is_some() {
                    self.store.refresh(key);
                }
                let _ = reply.send(found);
            }
            Command::Remove { key, reply } => {
                let removed = self.store.remove(key);
                let existed = removed.is_some();
                if let Some(entry) = removed {
                    entry.wipe();
                }
                let _ = reply.send(existed);
                if existed {
                    self.notify_presence();
                }
            }
            Command::Clear { reply } => {
                let cleared = self.store.clear();
                let _ = reply.send(cleared);
                if cleared > 0 {
                    self.notify_presence();
                }
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::Watch { key, reply } => {
                let _ = reply.send(self.store.get(key).map(SecretEntry::watch));
            }
            Command::Shutdown { reply } => {
                self.teardown();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn on_expired(&mut self, fired: Expired) {
        if let Some(entry) = self.store.expire(&fired) {
            entry.wipe();
            self.notify_presence();
        }
    }

    fn snapshot(&self) -> CacheSnapshot {
        let mut entries: Vec<CachedEntryInfo> = self
            .store
            .iter()
            .map(|(key, entry)| CachedEntryInfo {
                key_id: key,
                label: entry.label().to_string(),
                ttl_seconds: entry.ttl().as_secs(),
                expires_in_seconds: self.store.expires_in(key).map(|d| d.as_secs()),
            })
            .collect();
        entries.sort_by_key(|e| e.key_id);
        CacheSnapshot { entries }
    }

    fn notify_presence(&self) {
        if self.store.is_empty() {
            self.presence.deactivate();
        } else {
            let snapshot = self.snapshot();
            self.presence.activate(snapshot.count(), &snapshot.labels());
        }
    }

    fn teardown(&mut self) {
        if self.store.clear() > 0 {
            self.presence.deactivate();
        }
    }
}

/// Cloneable entry point to a running cache service
#[derive(Clone)]
pub struct CacheHandle {
    commands: mpsc::Sender<Command>,
    resolver: KeyTypeResolver,
    runtime: Handle,
    get_timeout: Duration,
}

impl CacheHandle {
    /// Override the bounded wait of lookups
    pub fn with_get_timeout(mut self, timeout: Duration) -> Self {
        self.get_timeout = timeout;
        self
    }

    pub fn get_timeout(&self) -> Duration {
        self.get_timeout
    }

    pub fn preferences(&self) -> &dyn PreferenceSource {
        self.resolver.preferences()
    }

    /// Kind of secret needed for a request
    pub fn secret_kind(&self, master_key_id: i64, sub_key_id: i64) -> Result<SecretKind, CacheError> {
        self.resolver.resolve_secret_kind(master_key_id, sub_key_id)
    }

    /// Cache `passphrase` with the configured TTL.
    ///
    /// `label` defaults to the keyring's primary user id.
    pub async fn add_cached_passphrase(
        &self,
        master_key_id: i64,
        sub_key_id: i64,
        passphrase: Passphrase,
        label: Option<String>,
    ) -> Result<(), CacheError> {
        let ttl = self.resolver.preferences().cache_ttl();
        self.add_entry(master_key_id, sub_key_id, passphrase, label, ttl)
            .await
    }

    /// Cache `passphrase` with an explicit TTL; zero means no expiry.
    ///
    /// Replaces and re-arms any entry already in the same slot.
    pub async fn add_entry(
        &self,
        master_key_id: i64,
        sub_key_id: i64,
        passphrase: Passphrase,
        label: Option<String>,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let key = match self.slot(master_key_id, sub_key_id)? {
            CacheSlot::Uncached => return Ok(()),
            CacheSlot::Key(key) => key,
        };
        let label = match label {
            Some(label) => label,
            None => self.resolver.display_label(master_key_id)?,
        };

        let entry = SecretEntry::new(passphrase, label, ttl);
        self.request(|reply| Command::Put { key, entry, reply })
            .await
    }

    /// Look up the secret for a request.
    ///
    /// `Ok(None)` means confirmed not cached. Empty passphrases and the
    /// default hardware PIN are answered without touching the store. A hit
    /// restarts the entry's TTL. No answer within the configured wait is
    /// [`CacheError::Timeout`], which is distinct from a miss.
    pub async fn get_cached_passphrase(
        &self,
        master_key_id: i64,
        sub_key_id: i64,
    ) -> Result<Option<Passphrase>, CacheError> {
        let key = match self.slot(master_key_id, sub_key_id)? {
            CacheSlot::Uncached => return Ok(None),
            CacheSlot::Key(key) => key,
        };

        let kind = self.resolver.resolve_secret_kind(master_key_id, sub_key_id)?;
        if let Some(secret) = kind.immediate_secret() {
            debug!("{:?} secret for {} needs no lookup", kind, format_key_id(sub_key_id));
            return Ok(Some(secret));
        }

        match tokio::time::timeout(
            self.get_timeout,
            self.request(|reply| Command::Get { key, reply }),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Cache lookup for {} timed out after {:?}",
                    format_key_id(key),
                    self.get_timeout
                );
                Err(CacheError::Timeout(self.get_timeout))
            }
        }
    }

    /// Blocking variant of [`get_cached_passphrase`](Self::get_cached_passphrase)
    /// for synchronous callers.
    ///
    /// Must be called from outside the async context, e.g. from
    /// `spawn_blocking` or a plain thread, on a multi-threaded runtime.
    pub fn blocking_get_cached_passphrase(
        &self,
        master_key_id: i64,
        sub_key_id: i64,
    ) -> Result<Option<Passphrase>, CacheError> {
        self.runtime
            .block_on(self.get_cached_passphrase(master_key_id, sub_key_id))
    }

    /// Forget the secret for a request, using the same key selection as lookup
    pub async fn clear_cached_passphrase(
        &self,
        master_key_id: i64,
        sub_key_id: i64,
    ) -> Result<bool, CacheError> {
        match self.slot(master_key_id, sub_key_id)? {
            CacheSlot::Uncached => Ok(false),
            CacheSlot::Key(key) => self.request(|reply| Command::Remove { key, reply }).await,
        }
    }

    /// Forget every cached secret; returns how many were removed
    pub async fn clear_all(&self) -> Result<usize, CacheError> {
        self.request(|reply| Command::Clear { reply }).await
    }

    /// Count and labels of cached entries
    pub async fn snapshot(&self) -> Result<CacheSnapshot, CacheError> {
        self.request(|reply| Command::Snapshot { reply }).await
    }

    /// Observer reporting whether the entry currently cached for a request
    /// has been wiped
    pub async fn watch(
        &self,
        master_key_id: i64,
        sub_key_id: i64,
    ) -> Result<Option<WipeWatch>, CacheError> {
        match self.slot(master_key_id, sub_key_id)? {
            CacheSlot::Uncached => Ok(None),
            CacheSlot::Key(key) => self.request(|reply| Command::Watch { key, reply }).await,
        }
    }

    /// Stop the service, wiping every cached secret
    pub async fn shutdown(&self) -> Result<(), CacheError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    fn slot(&self, master_key_id: i64, sub_key_id: i64) -> Result<CacheSlot, CacheError> {
        resolve_cache_key(
            master_key_id,
            sub_key_id,
            self.resolver.preferences().cache_by_subkey(),
        )
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, CacheError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(command(reply_tx))
            .await
            .map_err(|_| CacheError::ServiceStopped)?;
        reply_rx.await.map_err(|_| CacheError::ServiceStopped)
    }
}
