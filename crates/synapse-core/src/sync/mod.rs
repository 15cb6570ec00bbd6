//! Client-side sync
//!
//! Keeps each domain's local state in step with the state server:
//! - [`store`]: per-domain data and sync position
//! - [`transport`]: HTTP access to the server
//! - [`coordinator`]: push/pull with version bookkeeping
//! - [`scheduler`]: debounced auto-sync after local changes
//! - [`manager`]: bootstrap, periodic sync, manual sync and logout

pub mod coordinator;
pub mod manager;
pub mod scheduler;
pub mod store;
pub mod transport;

pub use coordinator::SyncCoordinator;
pub use manager::{
    DomainStatus, DomainSync, ManualSyncReport, StatusReport, SyncManager, SyncOptions,
};
pub use scheduler::AutoSyncScheduler;
pub use store::{ClientSyncState, DomainStore, SyncStatus};
pub use transport::{HttpTransport, PullOutcome, PushOutcome, SyncTransport};
