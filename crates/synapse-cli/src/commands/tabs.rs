//! Tab and chat command handlers

use anyhow::{anyhow, bail, Result};

use synapse_core::models::{Role, TabKind};

use crate::commands::Client;
use crate::output::Output;

pub fn list(client: &Client, output: &Output) -> Result<()> {
    let state = client.app_state().store().snapshot();
    output.print_tabs(&state);
    Ok(())
}

pub fn show(client: &Client, id: String, output: &Output) -> Result<()> {
    let state = client.app_state().store().snapshot();
    let tab_id = resolve(client, &id)?;
    let tab = state
        .tab(&tab_id)
        .ok_or_else(|| anyhow!("Tab not found: {}", id))?;
    output.print_tab(&state, tab);
    Ok(())
}

/// Open a new tab of the given kind and make it active
pub fn create(client: &Client, kind: String, output: &Output) -> Result<()> {
    let tab_id = match kind.as_str() {
        "chat" => client.app_state().update(|s| s.create_chat_tab()),
        "optimizer" => client.app_state().update(|s| s.create_optimizer_tab()),
        other => bail!("Unknown tab type '{}' (expected chat or optimizer)", other),
    };

    if output.is_quiet() {
        println!("{}", tab_id);
    }
    output.success(&format!("Opened {} tab {}", kind, tab_id));
    Ok(())
}

pub fn close(client: &Client, id: String, output: &Output) -> Result<()> {
    let tab_id = resolve(client, &id)?;
    client.app_state().update(|s| s.close_tab(&tab_id));
    output.success(&format!("Closed tab {}", tab_id));
    Ok(())
}

pub fn activate(client: &Client, id: String, output: &Output) -> Result<()> {
    let tab_id = resolve(client, &id)?;
    client.app_state().update(|s| s.set_active_tab(tab_id.as_str()));
    output.success(&format!("Active tab is now {}", tab_id));
    Ok(())
}

pub fn rename(client: &Client, id: String, title: String, output: &Output) -> Result<()> {
    let tab_id = resolve(client, &id)?;
    client.app_state().update(|s| s.update_tab_title(&tab_id, title.as_str()));
    output.success(&format!("Renamed tab to '{}'", title));
    Ok(())
}

/// Append a message to a chat tab
pub fn say(
    client: &Client,
    id: String,
    role: String,
    content: String,
    output: &Output,
) -> Result<()> {
    let tab_id = resolve_kind(client, &id, TabKind::Chat)?;
    let role: Role = role.parse().map_err(|e: String| anyhow!(e))?;
    let message_id = client
        .app_state()
        .update(|s| s.add_chat_message(&tab_id, role, content));

    if output.is_quiet() {
        println!("{}", message_id);
    }
    output.success(&format!("Added message {}", message_id));
    Ok(())
}

/// Set the starting prompt of an optimizer tab
pub fn set_prompt(client: &Client, id: String, prompt: String, output: &Output) -> Result<()> {
    let tab_id = resolve_kind(client, &id, TabKind::Optimizer)?;
    client
        .app_state()
        .update(|s| s.set_optimizer_initial_prompt(&tab_id, prompt));
    output.success("Initial prompt updated");
    Ok(())
}

/// Resolve a tab id or unique prefix to the full id
fn resolve(client: &Client, id: &str) -> Result<String> {
    client.app_state().read(|s| {
        s.find_tab(id)
            .map(|tab| tab.id.clone())
            .ok_or_else(|| anyhow!("No unique tab matches '{}'", id))
    })
}

fn resolve_kind(client: &Client, id: &str, kind: TabKind) -> Result<String> {
    let tab_id = resolve(client, id)?;
    let actual = client
        .app_state()
        .read(|s| s.tab(&tab_id).map(|tab| tab.kind));
    if actual != Some(kind) {
        bail!(
            "Tab {} is not a {} tab",
            tab_id,
            format!("{:?}", kind).to_lowercase()
        );
    }
    Ok(tab_id)
}
