//! Synapse Core Library
//!
//! Client side of Synapse cross-device sync: the two synced state objects
//! (settings and app state), their local cache, the wire protocol shared
//! with `synapse-server`, and the sync machinery that keeps both in step
//! with the server under optimistic concurrency.
//!
//! # Quick Start
//!
//! ```text
//! let config = Config::load()?;
//! let sync = SyncManager::open(&config)?;
//! sync.initialize().await;
//!
//! // Local edits schedule a debounced push
//! sync.settings().update(|s| s.set_default_model("deepseek-chat"));
//!
//! sync.flush().await;
//! ```
//!
//! # Modules
//!
//! - `domain`: The independently synced state buckets
//! - `models`: Settings and app state data structures
//! - `protocol`: Request/response bodies for the sync API
//! - `cache`: Local persistence of state and sync position
//! - `sync`: Store, transport, coordinator, scheduler and manager
//! - `config`: Client configuration

pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod models;
pub mod protocol;
pub mod sync;

pub use cache::{CachedDomain, LocalCache};
pub use config::Config;
pub use domain::{Domain, DomainState};
pub use error::{SyncError, SyncResult};
pub use models::{AppState, Settings};
pub use protocol::{
    ErrorBody, ProtocolError, PullResponse, PushAccepted, PushConflict, PushRequest, SyncInfo,
};
pub use sync::{
    AutoSyncScheduler, DomainStore, HttpTransport, ManualSyncReport, PullOutcome, PushOutcome,
    StatusReport, SyncManager, SyncOptions, SyncStatus, SyncTransport,
};
