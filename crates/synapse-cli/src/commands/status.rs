//! Status command handler

use anyhow::Result;

use synapse_core::Config;

use crate::commands::Client;
use crate::output::{Output, OutputFormat};

/// Show sync configuration and the local sync position
pub fn show(client: &Client, config: &Config, output: &Output) -> Result<()> {
    let report = client.status();
    let tab_count = client.app_state().read(|s| s.tabs.len());

    if output.format == OutputFormat::Human {
        println!("Synapse Status");
        println!("==============");
        println!();
        println!("Sync:");
        println!(
            "  Status:  {}",
            if config.sync_enabled {
                "enabled"
            } else {
                "disabled"
            }
        );
        println!(
            "  Server:  {}",
            config.server_url.as_deref().unwrap_or("(not set)")
        );
        println!(
            "  Session: {}",
            if config.session_token.is_some() {
                "signed in"
            } else {
                "signed out"
            }
        );
        println!("  Cache:   {}", config.data_dir.display());
        println!();
    }

    output.print_status(&report, tab_count);
    Ok(())
}
