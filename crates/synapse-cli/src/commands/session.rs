//! Login and logout

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use synapse_core::{Config, SyncManager, SyncStatus};

use crate::commands::{require_sync, Client};
use crate::output::{Output, OutputFormat};

/// Store server and session, then bootstrap both domains
pub async fn login(
    config_path: &Path,
    server_url: String,
    token: String,
    output: &Output,
) -> Result<()> {
    let mut config = Config::load_from_path(config_path).context("Failed to load configuration")?;
    config.server_url = Some(server_url.trim_end_matches('/').to_string());
    config.session_token = Some(token);
    config.sync_enabled = true;
    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    let client = SyncManager::open(&config)?;
    output.message("Syncing with server...");
    client.initialize().await;

    let report = client.status();
    match output.format {
        OutputFormat::Json => output.json(&report),
        OutputFormat::Quiet => {}
        OutputFormat::Human => {
            if report.overall() == SyncStatus::Error {
                output.warn("Signed in, but the server could not be reached. Local state is kept.");
            } else {
                output.success(&format!(
                    "Signed in (settings v{}, app state v{})",
                    report.settings.local_version, report.app_state.local_version
                ));
            }
        }
    }

    Ok(())
}

/// Push final state, scrub local data and forget the session
pub async fn logout(
    client: &Client,
    config: &mut Config,
    config_path: &Path,
    output: &Output,
) -> Result<()> {
    require_sync(config)?;

    client.logout().await;

    config.session_token = None;
    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;
    info!("Session cleared");

    output.success("Signed out. API keys and open tabs were removed from this device.");
    Ok(())
}
