//! Sync command handlers

use anyhow::{bail, Result};
use serde_json::json;

use synapse_core::{Config, Domain, PushOutcome};

use crate::commands::{explain, require_sync, Client};
use crate::output::{Output, OutputFormat};

/// Push both domains to the server
///
/// Conflicts are reported; `force` overwrites the server copy instead.
pub async fn sync(client: &Client, config: &Config, force: bool, output: &Output) -> Result<()> {
    require_sync(config)?;

    if force {
        output.message("Pushing local state (overwriting server copy)...");
    } else {
        output.message("Pushing local state...");
    }

    let report = client.manual_sync(force).await.map_err(explain)?;
    let outcomes = [
        (Domain::Settings, &report.settings),
        (Domain::AppState, &report.app_state),
    ];

    if outcomes
        .iter()
        .any(|(_, outcome)| matches!(outcome, PushOutcome::Unauthenticated))
    {
        bail!("Session rejected by the server. Sign in again with `synapse login`.");
    }

    match output.format {
        OutputFormat::Json => {
            let domains: Vec<_> = outcomes
                .iter()
                .map(|(domain, outcome)| outcome_json(*domain, outcome))
                .collect();
            output.json(&json!({
                "forced": force,
                "conflicts": report.conflicts(),
                "domains": domains,
            }));
        }
        OutputFormat::Quiet => {
            for domain in report.conflicts() {
                println!("{}", domain);
            }
        }
        OutputFormat::Human => {
            for (domain, outcome) in outcomes {
                match outcome {
                    PushOutcome::Accepted(accepted) if accepted.conflict_resolved => {
                        output.success(&format!(
                            "{} synced (version {}, server copy overwritten)",
                            domain.label(),
                            accepted.version
                        ));
                    }
                    PushOutcome::Accepted(accepted) => {
                        output.success(&format!(
                            "{} synced (version {})",
                            domain.label(),
                            accepted.version
                        ));
                    }
                    PushOutcome::Conflict(conflict) => {
                        output.warn(&format!(
                            "{}: server has version {}, local copy is based on version {}",
                            conflict.message, conflict.server_version, conflict.client_version
                        ));
                    }
                    PushOutcome::Unauthenticated => {}
                }
            }

            if report.has_conflicts() {
                println!();
                println!("Another device changed the same data. Either:");
                println!("  synapse pull            take the server copy (discards local changes)");
                println!("  synapse sync --force    overwrite the server copy with this device's");
            }
        }
    }

    Ok(())
}

/// Replace local state with the server copy
pub async fn pull(client: &Client, config: &Config, output: &Output) -> Result<()> {
    require_sync(config)?;

    output.message("Pulling server state...");
    client.pull_all().await.map_err(explain)?;

    let report = client.status();
    match output.format {
        OutputFormat::Json => output.json(&report),
        OutputFormat::Quiet => {}
        OutputFormat::Human => {
            output.success(&format!(
                "Settings at version {}, app state at version {}",
                report.settings.local_version, report.app_state.local_version
            ));
        }
    }

    Ok(())
}

fn outcome_json(domain: Domain, outcome: &PushOutcome) -> serde_json::Value {
    match outcome {
        PushOutcome::Accepted(accepted) => json!({
            "domain": domain,
            "result": "accepted",
            "version": accepted.version,
            "lastSyncAt": accepted.last_sync_at,
            "conflictResolved": accepted.conflict_resolved,
        }),
        PushOutcome::Conflict(conflict) => json!({
            "domain": domain,
            "result": "conflict",
            "serverVersion": conflict.server_version,
            "clientVersion": conflict.client_version,
            "lastSyncAt": conflict.last_sync_at,
        }),
        PushOutcome::Unauthenticated => json!({
            "domain": domain,
            "result": "unauthenticated",
        }),
    }
}
