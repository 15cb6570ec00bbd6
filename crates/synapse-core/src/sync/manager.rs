//! Sync manager
//!
//! Wires both domains together: one [`DomainSync`] per domain (store,
//! coordinator, debounced scheduler) plus the session-level operations.
//!
//! ## Lifecycle
//!
//! ```text
//! initialize()  bootstrap both domains concurrently, start periodic sync
//!   update()    mutate local state, schedule a debounced push
//!   tick        push both domains, reload on conflict
//! logout()      final push, stop timers, scrub local state
//! ```
//!
//! Bootstrap failures never block startup; the client keeps working from
//! local state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::coordinator::SyncCoordinator;
use super::scheduler::AutoSyncScheduler;
use super::store::{DomainStore, SyncStatus};
use super::transport::{HttpTransport, PullOutcome, PushOutcome, SyncTransport};
use crate::cache::LocalCache;
use crate::config::Config;
use crate::domain::{Domain, DomainState};
use crate::error::SyncResult;
use crate::models::{AppState, Settings};

/// Timing for the client sync machinery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncOptions {
    /// Quiet period before an auto-sync push
    pub debounce: Duration,
    /// Interval between background push/reload rounds
    pub periodic_interval: Duration,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(800),
            periodic_interval: Duration::from_secs(300),
        }
    }
}

impl SyncOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            debounce: config.debounce(),
            periodic_interval: config.periodic_sync_interval(),
        }
    }
}

/// Store, coordinator and scheduler for one domain
pub struct DomainSync<T: DomainState, C: SyncTransport> {
    store: Arc<DomainStore<T>>,
    coordinator: Arc<SyncCoordinator<T, C>>,
    scheduler: AutoSyncScheduler,
}

impl<T: DomainState, C: SyncTransport> DomainSync<T, C> {
    pub fn new(store: Arc<DomainStore<T>>, transport: Arc<C>, debounce: Duration) -> Self {
        let coordinator = Arc::new(SyncCoordinator::new(store.clone(), transport));

        let task_coordinator = coordinator.clone();
        let scheduler = AutoSyncScheduler::new(
            format!("{}-auto-sync", T::DOMAIN),
            debounce,
            move || {
                let coordinator = task_coordinator.clone();
                async move { coordinator.push(false).await.map(|_| ()) }
            },
        );

        Self {
            store,
            coordinator,
            scheduler,
        }
    }

    pub fn domain(&self) -> Domain {
        T::DOMAIN
    }

    pub fn store(&self) -> &Arc<DomainStore<T>> {
        &self.store
    }

    pub fn scheduler(&self) -> &AutoSyncScheduler {
        &self.scheduler
    }

    /// Read the current data
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.store.read(f)
    }

    /// Mutate local state and schedule a debounced push
    ///
    /// Must be called from within a tokio runtime.
    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = self.store.mutate(f);
        self.scheduler.notify();
        result
    }

    pub async fn push(&self, force_overwrite: bool) -> SyncResult<PushOutcome> {
        self.coordinator.push(force_overwrite).await
    }

    pub async fn pull(&self) -> SyncResult<PullOutcome> {
        self.coordinator.pull().await
    }

    pub async fn push_or_reload(&self) -> SyncResult<PushOutcome> {
        self.coordinator.push_or_reload().await
    }

    /// Reconcile local state with the server at startup
    ///
    /// A client that synced before offers its state first and takes the
    /// server's copy on conflict; a client that never synced takes the
    /// server's copy directly.
    async fn bootstrap(&self) -> SyncResult<()> {
        if self.store.last_sync_at().is_some() {
            debug!(domain = %T::DOMAIN, "Previously synced, pushing local state");
            self.coordinator.push_or_reload().await?;
        } else {
            debug!(domain = %T::DOMAIN, "Never synced, pulling server state");
            self.coordinator.pull().await?;
        }
        Ok(())
    }

    fn report(&self) -> DomainStatus {
        let state = self.store.sync_state();
        DomainStatus {
            domain: T::DOMAIN,
            status: state.status,
            local_version: state.local_version,
            last_sync_at: state.last_sync_at,
            pending_push: !self.scheduler.is_idle(),
        }
    }
}

/// Outcome of a manual sync for both domains
#[derive(Debug, Clone, PartialEq)]
pub struct ManualSyncReport {
    pub settings: PushOutcome,
    pub app_state: PushOutcome,
}

impl ManualSyncReport {
    /// Domains whose push was rejected as stale
    pub fn conflicts(&self) -> Vec<Domain> {
        let mut domains = Vec::new();
        if self.settings.is_conflict() {
            domains.push(Domain::Settings);
        }
        if self.app_state.is_conflict() {
            domains.push(Domain::AppState);
        }
        domains
    }

    pub fn has_conflicts(&self) -> bool {
        self.settings.is_conflict() || self.app_state.is_conflict()
    }
}

/// Sync position of one domain
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainStatus {
    pub domain: Domain,
    pub status: SyncStatus,
    pub local_version: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
    /// Debounced push armed or running
    pub pending_push: bool,
}

/// Sync position of the whole client
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub initialized: bool,
    pub settings: DomainStatus,
    pub app_state: DomainStatus,
}

impl StatusReport {
    /// Worst status across both domains
    pub fn overall(&self) -> SyncStatus {
        let statuses = [self.settings.status, self.app_state.status];
        if statuses.contains(&SyncStatus::Error) {
            SyncStatus::Error
        } else if statuses.contains(&SyncStatus::Syncing) {
            SyncStatus::Syncing
        } else if statuses.contains(&SyncStatus::Success) {
            SyncStatus::Success
        } else {
            SyncStatus::Idle
        }
    }
}

/// Client sync for both domains
pub struct SyncManager<C: SyncTransport> {
    settings: DomainSync<Settings, C>,
    app_state: DomainSync<AppState, C>,
    options: SyncOptions,
    initialized: AtomicBool,
    periodic: Mutex<Option<JoinHandle<()>>>,
}

impl<C: SyncTransport> SyncManager<C> {
    pub fn new(
        settings: Arc<DomainStore<Settings>>,
        app_state: Arc<DomainStore<AppState>>,
        transport: Arc<C>,
        options: SyncOptions,
    ) -> Arc<Self> {
        Arc::new(Self {
            settings: DomainSync::new(settings, transport.clone(), options.debounce),
            app_state: DomainSync::new(app_state, transport, options.debounce),
            options,
            initialized: AtomicBool::new(false),
            periodic: Mutex::new(None),
        })
    }

    pub fn settings(&self) -> &DomainSync<Settings, C> {
        &self.settings
    }

    pub fn app_state(&self) -> &DomainSync<AppState, C> {
        &self.app_state
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// Bootstrap both domains and start periodic sync
    ///
    /// Runs once per session; later calls return immediately.
    pub async fn initialize(self: &Arc<Self>) {
        if self.initialized.swap(true, Ordering::SeqCst) {
            debug!("Sync already initialized");
            return;
        }

        info!("Initializing cross-device sync");
        let (settings, app_state) =
            tokio::join!(self.settings.bootstrap(), self.app_state.bootstrap());

        if let Err(e) = settings {
            warn!(domain = %Domain::Settings, error = %e, "Bootstrap failed, using local state");
        }
        if let Err(e) = app_state {
            warn!(domain = %Domain::AppState, error = %e, "Bootstrap failed, using local state");
        }

        self.start_periodic_sync();
        info!("Cross-device sync initialized");
    }

    fn start_periodic_sync(self: &Arc<Self>) {
        let interval = self.options.periodic_interval;
        let manager = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.periodic_sync().await;
            }
        });

        if let Some(previous) = self.periodic.lock().replace(handle) {
            previous.abort();
        }
    }

    fn stop_periodic_sync(&self) {
        if let Some(handle) = self.periodic.lock().take() {
            handle.abort();
        }
    }

    /// One background round: push both domains, reload on conflict
    pub async fn periodic_sync(&self) {
        debug!("Periodic sync");
        let (settings, app_state) = tokio::join!(
            self.settings.push_or_reload(),
            self.app_state.push_or_reload()
        );

        if let Err(e) = settings {
            warn!(domain = %Domain::Settings, error = %e, "Periodic sync failed");
        }
        if let Err(e) = app_state {
            warn!(domain = %Domain::AppState, error = %e, "Periodic sync failed");
        }
    }

    /// Push both domains now
    ///
    /// Conflicts are reported, not resolved; the caller decides whether to
    /// retry with `force_overwrite`.
    pub async fn manual_sync(&self, force_overwrite: bool) -> SyncResult<ManualSyncReport> {
        info!(force_overwrite, "Manual sync");
        let (settings, app_state) = tokio::join!(
            self.settings.push(force_overwrite),
            self.app_state.push(force_overwrite)
        );

        Ok(ManualSyncReport {
            settings: settings?,
            app_state: app_state?,
        })
    }

    /// Replace local state of both domains with the server copy
    pub async fn pull_all(&self) -> SyncResult<()> {
        let (settings, app_state) = tokio::join!(self.settings.pull(), self.app_state.pull());
        settings?;
        app_state?;
        Ok(())
    }

    /// Run any debounced pushes now and wait for them
    pub async fn flush(&self) {
        tokio::join!(
            self.settings.scheduler().flush(),
            self.app_state.scheduler().flush()
        );
    }

    /// End the session
    ///
    /// Pushes both domains one last time while the session is still valid,
    /// then stops every timer, scrubs local state and resets versions.
    /// Clearing credentials is up to the caller afterwards.
    pub async fn logout(&self) {
        info!("Logging out of sync");
        self.stop_periodic_sync();
        self.settings.scheduler().cancel();
        self.app_state.scheduler().cancel();

        let (settings, app_state) =
            tokio::join!(self.settings.push(false), self.app_state.push(false));
        for (domain, result) in [(Domain::Settings, settings), (Domain::AppState, app_state)] {
            match result {
                Ok(PushOutcome::Conflict(_)) => {
                    warn!(domain = %domain, "Final push conflicted, local changes discarded")
                }
                Ok(_) => {}
                Err(e) => warn!(domain = %domain, error = %e, "Final push failed"),
            }
        }

        // A scheduled push may still have been running
        self.settings.scheduler().wait_idle().await;
        self.app_state.scheduler().wait_idle().await;

        self.settings.store().reset_for_logout();
        self.app_state.store().reset_for_logout();
        self.initialized.store(false, Ordering::SeqCst);
        info!("Sync state cleared");
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            initialized: self.is_initialized(),
            settings: self.settings.report(),
            app_state: self.app_state.report(),
        }
    }
}

impl<C: SyncTransport> Drop for SyncManager<C> {
    fn drop(&mut self) {
        self.stop_periodic_sync();
    }
}

impl SyncManager<HttpTransport> {
    /// Open cached state and build an HTTP-backed manager from configuration
    pub fn open(config: &Config) -> Result<Arc<Self>> {
        let settings = DomainStore::<Settings>::open(LocalCache::new(
            config.cache_path(Domain::Settings),
        ))?;
        let app_state = DomainStore::<AppState>::open(LocalCache::new(
            config.cache_path(Domain::AppState),
        ))?;
        let transport =
            HttpTransport::from_config(config).context("Failed to create HTTP client")?;

        Ok(Self::new(
            Arc::new(settings),
            Arc::new(app_state),
            Arc::new(transport),
            SyncOptions::from_config(config),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApiProvider;
    use crate::protocol::{PullResponse, PushAccepted, PushConflict, SyncInfo};
    use crate::sync::coordinator::testing::ScriptedTransport;

    fn manager() -> (Arc<SyncManager<ScriptedTransport>>, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::default());
        let manager = SyncManager::new(
            Arc::new(DomainStore::new(Settings::default())),
            Arc::new(DomainStore::new(AppState::default())),
            transport.clone(),
            SyncOptions::default(),
        );
        (manager, transport)
    }

    fn accepted(version: u64) -> SyncResult<PushOutcome> {
        Ok(PushOutcome::Accepted(PushAccepted {
            success: true,
            version,
            last_sync_at: Utc::now(),
            conflict_resolved: false,
        }))
    }

    fn conflict(domain: Domain, server_version: u64, client_version: u64) -> SyncResult<PushOutcome> {
        Ok(PushOutcome::Conflict(PushConflict::new(
            domain,
            server_version,
            client_version,
            Some(Utc::now()),
        )))
    }

    fn loaded(payload: serde_json::Value, version: u64) -> SyncResult<PullOutcome> {
        Ok(PullOutcome::Loaded(PullResponse {
            payload: Some(payload),
            version,
            last_sync_at: Some(Utc::now()),
            sync_info: SyncInfo { is_new_user: false },
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_run_bootstrap_pulls() {
        let (manager, transport) = manager();
        transport.on_pull(
            Domain::Settings,
            loaded(serde_json::json!({ "apiKeys": { "gemini": "remote" } }), 2),
        );
        transport.on_pull(Domain::AppState, Ok(PullOutcome::Loaded(PullResponse::empty())));

        manager.initialize().await;

        assert!(manager.is_initialized());
        assert!(transport.pushed.lock().is_empty());
        assert_eq!(transport.pulls_for(Domain::Settings), 1);
        assert_eq!(transport.pulls_for(Domain::AppState), 1);
        assert!(manager.settings().read(|s| s.has_api_key(ApiProvider::Gemini)));
        assert_eq!(manager.settings().store().local_version(), 2);
        assert_eq!(manager.app_state().store().local_version(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returning_client_pushes_then_reloads_on_conflict() {
        let (manager, transport) = manager();
        manager.settings().store().record_push(1, Utc::now());
        manager.app_state().store().record_push(4, Utc::now());

        transport.on_push(Domain::Settings, conflict(Domain::Settings, 3, 1));
        transport.on_pull(
            Domain::Settings,
            loaded(serde_json::json!({ "modelSettings": { "defaultModel": "theirs" } }), 3),
        );
        transport.on_push(Domain::AppState, accepted(5));

        manager.initialize().await;

        assert_eq!(transport.pulls_for(Domain::Settings), 1);
        assert_eq!(transport.pulls_for(Domain::AppState), 0);
        assert_eq!(manager.settings().store().local_version(), 3);
        assert_eq!(
            manager.settings().read(|s| s.model_settings.default_model.clone()),
            "theirs"
        );
        assert_eq!(manager.app_state().store().local_version(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_failure_does_not_block() {
        let (manager, transport) = manager();
        transport.on_pull(
            Domain::Settings,
            Err(crate::error::SyncError::Server {
                url: "http://localhost/api/settings".into(),
                status: 500,
                message: "Failed to fetch settings".into(),
            }),
        );

        manager.initialize().await;

        assert!(manager.is_initialized());
        assert_eq!(manager.settings().store().status(), SyncStatus::Error);
        assert_eq!(manager.status().overall(), SyncStatus::Error);
    }

    #[tokio::test(start_paused = true)]
    async fn test_initialize_runs_once() {
        let (manager, transport) = manager();

        manager.initialize().await;
        manager.initialize().await;

        assert_eq!(transport.pulled.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_are_debounced_into_one_push() {
        let (manager, transport) = manager();
        transport.on_push(Domain::AppState, accepted(1));

        for i in 0..5 {
            manager.app_state().update(|s| {
                let id = s.create_chat_tab();
                s.update_tab_title(&id, format!("Tab {}", i));
            });
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let pushes = transport.pushes_for(Domain::AppState);
        assert_eq!(pushes.len(), 1);
        assert_eq!(pushes[0].payload["tabs"].as_array().unwrap().len(), 5);
        assert_eq!(manager.app_state().store().local_version(), 1);
        assert!(transport.pushes_for(Domain::Settings).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_sync_reloads_on_conflict() {
        let (manager, transport) = manager();
        manager.initialize().await;

        transport.on_push(Domain::Settings, conflict(Domain::Settings, 2, 0));
        transport.on_pull(Domain::Settings, loaded(serde_json::json!({}), 2));
        transport.on_push(Domain::AppState, accepted(1));

        tokio::time::sleep(Duration::from_secs(301)).await;

        assert_eq!(transport.pushes_for(Domain::Settings).len(), 1);
        assert_eq!(transport.pulls_for(Domain::Settings), 2);
        assert_eq!(manager.settings().store().local_version(), 2);
        assert_eq!(manager.app_state().store().local_version(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_sync_reports_conflicts() {
        let (manager, transport) = manager();
        transport.on_push(Domain::Settings, accepted(1));
        transport.on_push(Domain::AppState, conflict(Domain::AppState, 6, 0));

        let report = manager.manual_sync(false).await.unwrap();

        assert!(report.has_conflicts());
        assert_eq!(report.conflicts(), vec![Domain::AppState]);
        // Conflicts are left for the caller
        assert_eq!(transport.pulled.lock().len(), 0);
        assert_eq!(manager.app_state().store().local_version(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_pushes_then_scrubs() {
        let (manager, transport) = manager();
        manager.initialize().await;
        manager.settings().store().record_push(3, Utc::now());
        manager
            .settings()
            .update(|s| s.set_api_key(ApiProvider::Gemini, "g-key"));
        manager.app_state().update(|s| {
            s.create_chat_tab();
        });
        transport.on_push(Domain::Settings, accepted(4));
        transport.on_push(Domain::AppState, accepted(1));

        manager.logout().await;

        // Final push carried the latest state
        let settings_pushes = transport.pushes_for(Domain::Settings);
        assert_eq!(settings_pushes.len(), 1);
        assert_eq!(settings_pushes[0].payload["apiKeys"]["gemini"], "g-key");

        assert!(!manager.is_initialized());
        assert!(!manager.settings().read(|s| s.has_api_key(ApiProvider::Gemini)));
        assert!(manager.app_state().read(|s| s.is_empty()));
        assert_eq!(manager.settings().store().local_version(), 0);
        assert_eq!(manager.app_state().store().local_version(), 0);

        // Nothing left scheduled
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(transport.pushed.lock().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_pushes_pending_changes() {
        let (manager, transport) = manager();
        transport.on_push(Domain::Settings, accepted(1));

        manager.settings().update(|s| s.set_default_model("deepseek-chat"));
        manager.flush().await;

        assert_eq!(transport.pushes_for(Domain::Settings).len(), 1);
        assert!(!manager.status().settings.pending_push);
    }
}
