//! Settings command handlers
//!
//! Every change goes through the settings domain's `update`, which schedules
//! the debounced push.

use anyhow::{anyhow, Result};

use synapse_core::models::{ApiProvider, Feature, PromptKind};

use crate::commands::Client;
use crate::output::Output;

pub fn show(client: &Client, output: &Output) -> Result<()> {
    let settings = client.settings().store().snapshot();
    output.print_settings(&settings);
    Ok(())
}

pub fn set_key(client: &Client, provider: String, key: String, output: &Output) -> Result<()> {
    let provider: ApiProvider = provider.parse().map_err(|e: String| anyhow!(e))?;
    client.settings().update(|s| s.set_api_key(provider, key));
    output.success(&format!("Saved {} API key", provider));
    Ok(())
}

/// Set the default model, and optionally its provider
pub fn set_model(
    client: &Client,
    model: String,
    provider: Option<String>,
    output: &Output,
) -> Result<()> {
    let provider = provider
        .map(|p| p.parse::<ApiProvider>())
        .transpose()
        .map_err(|e| anyhow!(e))?;

    client.settings().update(|s| {
        if let Some(provider) = provider {
            s.set_default_provider(provider);
        }
        s.set_default_model(model.as_str());
    });

    output.success(&format!("Default model set to {}", model));
    Ok(())
}

pub fn set_temperature(client: &Client, temperature: f64, output: &Output) -> Result<()> {
    let applied = client.settings().update(|s| {
        s.set_temperature(temperature);
        s.model_settings.temperature
    });
    output.success(&format!("Temperature set to {}", applied));
    Ok(())
}

pub fn set_prompt(client: &Client, kind: String, prompt: String, output: &Output) -> Result<()> {
    let kind: PromptKind = kind.parse().map_err(|e: String| anyhow!(e))?;
    client.settings().update(|s| s.set_system_prompt(kind, prompt));
    output.success("System prompt updated");
    Ok(())
}

pub fn set_feature(client: &Client, feature: String, enabled: bool, output: &Output) -> Result<()> {
    let parsed: Feature = feature.parse().map_err(|e: String| anyhow!(e))?;
    client.settings().update(|s| s.set_feature(parsed, enabled));
    output.success(&format!(
        "{} {}",
        feature,
        if enabled { "enabled" } else { "disabled" }
    ));
    Ok(())
}

/// Restore default settings, including API keys
pub fn reset(client: &Client, output: &Output) -> Result<()> {
    client.settings().update(|s| s.reset_to_defaults());
    output.success("Settings reset to defaults");
    Ok(())
}
