//! Synapse Server library
//!
//! Versioned, encrypted per-user state store behind an HTTP API. Re-exports
//! the server modules for use by the binary and integration tests.

use std::sync::Arc;

pub mod api;
pub mod auth;
pub mod crypto;
pub mod db;
pub mod error;
pub mod reconciler;
pub mod schema;
pub mod service;

/// Shared application state
pub struct ServerState {
    /// Encryption boundary over the record store
    pub service: service::SyncService,
    /// Bearer token table
    pub sessions: auth::Sessions,
}

impl ServerState {
    pub fn new(
        db: Arc<db::Database>,
        cipher: crypto::PayloadCipher,
        sessions: auth::Sessions,
    ) -> Arc<Self> {
        Arc::new(Self {
            service: service::SyncService::new(db, cipher),
            sessions,
        })
    }
}
