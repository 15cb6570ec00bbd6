//! Per-domain client state
//!
//! A [`DomainStore`] owns one domain's data object together with its
//! [`ClientSyncState`]. Every mutation is written through to the local
//! cache so the version and last-sync timestamp survive restarts.
//!
//! Snapshots are encoded under the state lock and written after it is
//! released. Each snapshot carries a revision; a write that loses the race
//! to a newer revision is skipped.

use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::cache::{CachedDomain, LocalCache};
use crate::domain::{Domain, DomainState};
use crate::error::{SyncError, SyncResult};
use crate::protocol::{PullResponse, PushRequest};

/// Last sync attempt outcome for one domain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::Idle => "idle",
            SyncStatus::Syncing => "syncing",
            SyncStatus::Success => "success",
            SyncStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Client view of a domain's sync position
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSyncState {
    /// Last server version this client observed
    pub local_version: u64,
    /// When this client last completed a sync
    pub last_sync_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
}

struct Inner<T> {
    data: T,
    local_version: u64,
    last_sync_at: Option<DateTime<Utc>>,
    revision: u64,
}

/// Encoded snapshot waiting to be written to the cache
struct PendingWrite {
    revision: u64,
    bytes: Vec<u8>,
}

/// One domain's state and sync bookkeeping
pub struct DomainStore<T: DomainState> {
    inner: RwLock<Inner<T>>,
    cache: Option<LocalCache>,
    /// Revision of the snapshot last written to the cache
    written: Mutex<u64>,
    status: watch::Sender<SyncStatus>,
}

impl<T: DomainState> DomainStore<T> {
    /// Create an in-memory store with no cache file
    pub fn new(data: T) -> Self {
        Self::build(data, 0, None, None)
    }

    /// Open a store backed by a cache file
    ///
    /// A missing file starts from defaults at version 0.
    pub fn open(cache: LocalCache) -> Result<Self> {
        let cached = cache
            .load::<T>()
            .with_context(|| format!("Failed to load cached {}", T::DOMAIN))?;

        let store = match cached {
            Some(cached) => {
                debug!(
                    domain = %T::DOMAIN,
                    version = cached.version,
                    "Loaded cached state"
                );
                Self::build(cached.data, cached.version, cached.last_sync_at, Some(cache))
            }
            None => Self::build(T::default(), 0, None, Some(cache)),
        };
        Ok(store)
    }

    fn build(
        data: T,
        local_version: u64,
        last_sync_at: Option<DateTime<Utc>>,
        cache: Option<LocalCache>,
    ) -> Self {
        let (status, _) = watch::channel(SyncStatus::Idle);
        Self {
            inner: RwLock::new(Inner {
                data,
                local_version,
                last_sync_at,
                revision: 0,
            }),
            cache,
            written: Mutex::new(0),
            status,
        }
    }

    pub fn domain(&self) -> Domain {
        T::DOMAIN
    }

    /// Read the current data
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.read().data)
    }

    /// Clone the current data
    pub fn snapshot(&self) -> T {
        self.inner.read().data.clone()
    }

    /// Mutate the data and write it through to the cache
    ///
    /// Does not touch the version; only the server assigns versions.
    pub fn mutate<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut inner = self.inner.write();
        let result = f(&mut inner.data);
        let pending = self.encode(&mut inner);
        drop(inner);
        self.write_through(pending);
        result
    }

    pub fn sync_state(&self) -> ClientSyncState {
        let inner = self.inner.read();
        ClientSyncState {
            local_version: inner.local_version,
            last_sync_at: inner.last_sync_at,
            status: self.status(),
        }
    }

    pub fn local_version(&self) -> u64 {
        self.inner.read().local_version
    }

    pub fn last_sync_at(&self) -> Option<DateTime<Utc>> {
        self.inner.read().last_sync_at
    }

    pub fn status(&self) -> SyncStatus {
        *self.status.borrow()
    }

    pub fn set_status(&self, status: SyncStatus) {
        self.status.send_replace(status);
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.subscribe()
    }

    /// Build a push request from the latest data and observed version
    pub fn push_request(&self, force_overwrite: bool) -> SyncResult<PushRequest> {
        let inner = self.inner.read();
        let payload = serde_json::to_value(&inner.data).map_err(|source| SyncError::Payload {
            domain: T::DOMAIN,
            source,
        })?;

        Ok(PushRequest {
            payload,
            client_version: inner.local_version,
            force_overwrite,
        })
    }

    /// Record the version the server assigned to an accepted push
    ///
    /// The server's number always wins, even when it is lower than the local
    /// one (server record lost, or a cache left over from another server).
    pub fn record_push(&self, version: u64, last_sync_at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        inner.local_version = version;
        inner.last_sync_at = Some(last_sync_at);
        let pending = self.encode(&mut inner);
        drop(inner);
        self.write_through(pending);
    }

    /// Replace local data with a pulled server record
    ///
    /// An empty server record leaves local data untouched. Otherwise the
    /// local version becomes the server's.
    pub fn apply_pull(&self, response: &PullResponse) -> SyncResult<bool> {
        let Some(payload) = &response.payload else {
            debug!(domain = %T::DOMAIN, "Server has no record, keeping local state");
            return Ok(false);
        };

        let data = decode::<T>(payload)?;

        let mut inner = self.inner.write();
        inner.data = data;
        inner.local_version = response.version;
        if response.last_sync_at.is_some() {
            inner.last_sync_at = response.last_sync_at;
        }
        let pending = self.encode(&mut inner);
        drop(inner);
        self.write_through(pending);
        Ok(true)
    }

    /// Scrub session data and forget the sync position
    pub fn reset_for_logout(&self) {
        let mut inner = self.inner.write();
        inner.data.scrub();
        inner.local_version = 0;
        inner.last_sync_at = None;
        let pending = self.encode(&mut inner);
        drop(inner);
        self.write_through(pending);
        self.set_status(SyncStatus::Idle);
    }

    /// Encode the current state for the cache; called with the write lock held
    fn encode(&self, inner: &mut Inner<T>) -> Option<PendingWrite> {
        if self.cache.is_none() {
            return None;
        }
        inner.revision += 1;
        let cached = CachedDomain {
            data: &inner.data,
            version: inner.local_version,
            last_sync_at: inner.last_sync_at,
        };
        match LocalCache::encode(&cached) {
            Ok(bytes) => Some(PendingWrite {
                revision: inner.revision,
                bytes,
            }),
            Err(e) => {
                warn!(domain = %T::DOMAIN, error = %e, "Failed to encode local cache");
                None
            }
        }
    }

    /// Write an encoded snapshot unless a newer one already landed
    fn write_through(&self, pending: Option<PendingWrite>) {
        let (Some(cache), Some(pending)) = (&self.cache, pending) else {
            return;
        };

        let mut written = self.written.lock();
        if pending.revision <= *written {
            return;
        }
        match cache.write(&pending.bytes) {
            Ok(()) => *written = pending.revision,
            Err(e) => warn!(domain = %T::DOMAIN, error = %e, "Failed to write local cache"),
        }
    }
}

fn decode<T: DomainState>(payload: &Value) -> SyncResult<T> {
    T::deserialize(payload).map_err(|source| SyncError::Payload {
        domain: T::DOMAIN,
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ApiProvider, AppState, Settings};
    use crate::protocol::SyncInfo;
    use tempfile::TempDir;

    fn pulled(payload: Option<Value>, version: u64) -> PullResponse {
        PullResponse {
            payload,
            version,
            last_sync_at: Some(Utc::now()),
            sync_info: SyncInfo { is_new_user: false },
        }
    }

    #[test]
    fn test_new_store_starts_unsynced() {
        let store = DomainStore::new(Settings::default());
        let state = store.sync_state();
        assert_eq!(state.local_version, 0);
        assert!(state.last_sync_at.is_none());
        assert_eq!(state.status, SyncStatus::Idle);
    }

    #[test]
    fn test_mutate_keeps_version() {
        let store = DomainStore::new(Settings::default());
        store.record_push(4, Utc::now());

        store.mutate(|s| s.set_api_key(ApiProvider::Gemini, "g-key"));

        assert_eq!(store.local_version(), 4);
        assert!(store.read(|s| s.has_api_key(ApiProvider::Gemini)));
    }

    #[test]
    fn test_push_request_carries_version() {
        let store = DomainStore::new(AppState::default());
        store.mutate(|s| {
            s.create_chat_tab();
        });
        store.record_push(2, Utc::now());

        let request = store.push_request(true).unwrap();
        assert_eq!(request.client_version, 2);
        assert!(request.force_overwrite);
        assert_eq!(request.payload["tabs"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_apply_pull_replaces_data() {
        let store = DomainStore::new(Settings::default());
        let mut remote = Settings::default();
        remote.set_default_model("deepseek-chat");

        let applied = store
            .apply_pull(&pulled(Some(serde_json::to_value(&remote).unwrap()), 3))
            .unwrap();

        assert!(applied);
        assert_eq!(store.snapshot(), remote);
        assert_eq!(store.local_version(), 3);
        assert!(store.last_sync_at().is_some());
    }

    #[test]
    fn test_empty_pull_keeps_local_state() {
        let store = DomainStore::new(Settings::default());
        store.mutate(|s| s.set_default_model("local-model"));

        let applied = store.apply_pull(&PullResponse::empty()).unwrap();

        assert!(!applied);
        assert_eq!(store.read(|s| s.model_settings.default_model.clone()), "local-model");
        assert_eq!(store.local_version(), 0);
    }

    #[test]
    fn test_server_version_replaces_stale_local_version() {
        // Cache left at v5 by a server that has since lost the record
        let store = DomainStore::new(Settings::default());
        store.record_push(5, Utc::now());

        store.record_push(1, Utc::now());
        assert_eq!(store.local_version(), 1);
        assert_eq!(store.push_request(false).unwrap().client_version, 1);

        store
            .apply_pull(&pulled(Some(serde_json::json!({})), 3))
            .unwrap();
        assert_eq!(store.local_version(), 3);

        store
            .apply_pull(&pulled(Some(serde_json::json!({})), 2))
            .unwrap();
        assert_eq!(store.local_version(), 2);
    }

    #[test]
    fn test_bad_payload_is_rejected() {
        let store = DomainStore::new(Settings::default());
        let result = store.apply_pull(&pulled(Some(serde_json::json!({ "apiKeys": 7 })), 1));

        assert!(matches!(result, Err(SyncError::Payload { .. })));
        assert_eq!(store.local_version(), 0);
    }

    #[test]
    fn test_reset_for_logout() {
        let store = DomainStore::new(Settings::default());
        store.mutate(|s| {
            s.set_api_key(ApiProvider::Deepseek, "sk-1");
            s.set_default_model("deepseek-chat");
        });
        store.record_push(7, Utc::now());
        store.set_status(SyncStatus::Success);

        store.reset_for_logout();

        assert_eq!(store.local_version(), 0);
        assert!(store.last_sync_at().is_none());
        assert_eq!(store.status(), SyncStatus::Idle);
        assert!(!store.read(|s| s.has_api_key(ApiProvider::Deepseek)));
        assert_eq!(store.read(|s| s.model_settings.default_model.clone()), "deepseek-chat");
    }

    #[test]
    fn test_cache_survives_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app-state.json");

        {
            let store = DomainStore::<AppState>::open(LocalCache::new(&path)).unwrap();
            store.mutate(|s| {
                s.create_optimizer_tab();
            });
            store.record_push(9, Utc::now());
        }

        let store = DomainStore::<AppState>::open(LocalCache::new(&path)).unwrap();
        assert_eq!(store.local_version(), 9);
        assert!(store.last_sync_at().is_some());
        assert_eq!(store.read(|s| s.tabs.len()), 1);
    }

    #[test]
    fn test_concurrent_mutations_leave_latest_snapshot_cached() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("app-state.json");
        let store = DomainStore::<AppState>::open(LocalCache::new(&path)).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for _ in 0..25 {
                        store.mutate(|s| {
                            s.create_chat_tab();
                        });
                    }
                });
            }
        });
        store.record_push(6, Utc::now());

        assert_eq!(store.read(|s| s.tabs.len()), 100);
        let cached = LocalCache::new(&path).load::<AppState>().unwrap().unwrap();
        assert_eq!(cached.data, store.snapshot());
        assert_eq!(cached.version, 6);
    }

    #[tokio::test]
    async fn test_status_subscription() {
        let store = DomainStore::new(Settings::default());
        let mut rx = store.subscribe_status();

        store.set_status(SyncStatus::Syncing);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow(), SyncStatus::Syncing);
    }
}
