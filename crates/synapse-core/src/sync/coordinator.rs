//! Push/pull for one domain
//!
//! The coordinator moves a domain's state between its [`DomainStore`] and
//! the server, keeps the store's version in line with what the server
//! reports and reflects every attempt in the store's status. Operations on
//! one domain are serialized.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::store::{DomainStore, SyncStatus};
use super::transport::{PullOutcome, PushOutcome, SyncTransport};
use crate::domain::{Domain, DomainState};
use crate::error::SyncResult;

pub struct SyncCoordinator<T: DomainState, C: SyncTransport> {
    store: Arc<DomainStore<T>>,
    transport: Arc<C>,
    op_lock: Mutex<()>,
}

impl<T: DomainState, C: SyncTransport> SyncCoordinator<T, C> {
    pub fn new(store: Arc<DomainStore<T>>, transport: Arc<C>) -> Self {
        Self {
            store,
            transport,
            op_lock: Mutex::new(()),
        }
    }

    pub fn domain(&self) -> Domain {
        T::DOMAIN
    }

    pub fn store(&self) -> &Arc<DomainStore<T>> {
        &self.store
    }

    /// Offer the current snapshot to the server
    ///
    /// On acceptance the store adopts the server-assigned version. A
    /// conflict leaves local data untouched.
    pub async fn push(&self, force_overwrite: bool) -> SyncResult<PushOutcome> {
        let _guard = self.op_lock.lock().await;
        let domain = T::DOMAIN;
        self.store.set_status(SyncStatus::Syncing);

        let request = match self.store.push_request(force_overwrite) {
            Ok(request) => request,
            Err(e) => {
                self.store.set_status(SyncStatus::Error);
                return Err(e);
            }
        };
        let client_version = request.client_version;

        match self.transport.push(domain, request).await {
            Ok(PushOutcome::Accepted(accepted)) => {
                self.store
                    .record_push(accepted.version, accepted.last_sync_at);
                self.store.set_status(SyncStatus::Success);
                info!(
                    domain = %domain,
                    version = accepted.version,
                    conflict_resolved = accepted.conflict_resolved,
                    "Pushed to server"
                );
                Ok(PushOutcome::Accepted(accepted))
            }
            Ok(PushOutcome::Conflict(conflict)) => {
                self.store.set_status(SyncStatus::Idle);
                warn!(
                    domain = %domain,
                    client_version,
                    server_version = conflict.server_version,
                    "Push rejected, server has a newer version"
                );
                Ok(PushOutcome::Conflict(conflict))
            }
            Ok(PushOutcome::Unauthenticated) => {
                self.store.set_status(SyncStatus::Idle);
                debug!(domain = %domain, "Not signed in, push skipped");
                Ok(PushOutcome::Unauthenticated)
            }
            Err(e) => {
                self.store.set_status(SyncStatus::Error);
                warn!(domain = %domain, error = %e, "Push failed");
                Err(e)
            }
        }
    }

    /// Load the server record into the store
    ///
    /// An empty server record leaves local data as it is.
    pub async fn pull(&self) -> SyncResult<PullOutcome> {
        let _guard = self.op_lock.lock().await;
        let domain = T::DOMAIN;
        self.store.set_status(SyncStatus::Syncing);

        let outcome = match self.transport.pull(domain).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.store.set_status(SyncStatus::Error);
                warn!(domain = %domain, error = %e, "Pull failed");
                return Err(e);
            }
        };

        match &outcome {
            PullOutcome::Loaded(response) => {
                if let Err(e) = self.store.apply_pull(response) {
                    self.store.set_status(SyncStatus::Error);
                    warn!(domain = %domain, error = %e, "Server payload rejected");
                    return Err(e);
                }
                self.store.set_status(SyncStatus::Success);
                info!(
                    domain = %domain,
                    version = response.version,
                    new_user = response.sync_info.is_new_user,
                    "Pulled from server"
                );
            }
            PullOutcome::Unauthenticated => {
                self.store.set_status(SyncStatus::Idle);
                debug!(domain = %domain, "Not signed in, pull skipped");
            }
        }
        Ok(outcome)
    }

    /// Push; on conflict take the server's state
    pub async fn push_or_reload(&self) -> SyncResult<PushOutcome> {
        let outcome = self.push(false).await?;
        if outcome.is_conflict() {
            info!(domain = %T::DOMAIN, "Reloading server state after conflict");
            self.pull().await?;
        }
        Ok(outcome)
    }
}
