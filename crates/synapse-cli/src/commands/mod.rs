//! Command handlers

use std::sync::Arc;

use anyhow::{bail, Result};

use synapse_core::{Config, HttpTransport, SyncError, SyncManager};

pub mod config;
pub mod session;
pub mod settings;
pub mod status;
pub mod sync;
pub mod tabs;

/// Sync manager driven by the CLI
pub type Client = Arc<SyncManager<HttpTransport>>;

/// Fail unless a server and a session are configured
pub fn require_sync(config: &Config) -> Result<()> {
    if !config.sync_enabled {
        bail!(
            "Sync is not enabled. Sign in with:\n  \
             synapse login --server http://your-server:8080 --token <session-token>"
        );
    }
    if config.server_url.is_none() {
        bail!(
            "Server URL not configured. Set it with:\n  \
             synapse config set server_url http://your-server:8080"
        );
    }
    if config.session_token.is_none() {
        bail!("Not signed in. Run `synapse login` first.");
    }
    Ok(())
}

/// Attach the recovery hint, if any, to a sync error
pub fn explain(err: SyncError) -> anyhow::Error {
    match err.recovery_suggestion() {
        Some(hint) => anyhow::anyhow!("{}\n  {}", err, hint),
        None => err.into(),
    }
}
