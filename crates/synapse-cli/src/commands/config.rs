//! Config command handlers

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde_json::json;

use synapse_core::Config;

use crate::output::{Output, OutputFormat};

const KEYS: &str = "data_dir, server_url, session_token, sync_enabled, debounce_ms, \
                    periodic_sync_secs, request_timeout_secs, log_file";

/// Show current configuration
pub fn show(config_path: &Path, output: &Output) -> Result<()> {
    let config = Config::load_from_path(config_path).context("Failed to load configuration")?;
    let token = config.session_token.as_ref().map(|_| "(set)");

    match output.format {
        OutputFormat::Json => {
            output.json(&json!({
                "data_dir": config.data_dir,
                "server_url": config.server_url,
                "session_token": token,
                "sync_enabled": config.sync_enabled,
                "debounce_ms": config.debounce_ms,
                "periodic_sync_secs": config.periodic_sync_secs,
                "request_timeout_secs": config.request_timeout_secs,
                "log_file": config.log_file,
            }));
        }
        OutputFormat::Quiet => {
            println!("{}", config.data_dir.display());
        }
        OutputFormat::Human => {
            println!("Configuration:");
            println!("  data_dir:             {}", config.data_dir.display());
            println!(
                "  server_url:           {}",
                config.server_url.as_deref().unwrap_or("(not set)")
            );
            println!("  session_token:        {}", token.unwrap_or("(not set)"));
            println!("  sync_enabled:         {}", config.sync_enabled);
            println!("  debounce_ms:          {}", config.debounce_ms);
            println!("  periodic_sync_secs:   {}", config.periodic_sync_secs);
            println!("  request_timeout_secs: {}", config.request_timeout_secs);
            println!(
                "  log_file:             {}",
                config
                    .log_file
                    .as_ref()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "(not set)".to_string())
            );
            println!();
            println!("Config file: {}", config_path.display());
        }
    }

    Ok(())
}

/// Set a configuration value
pub fn set(key: String, value: String, config_path: &Path, output: &Output) -> Result<()> {
    let mut config = Config::load_from_path(config_path).context("Failed to load configuration")?;
    apply(&mut config, &key, &value)?;
    config
        .save_to_path(config_path)
        .context("Failed to save configuration")?;

    let shown = if key == "session_token" { "(set)" } else { value.as_str() };
    output.success(&format!("Set {} = {}", key, shown));
    Ok(())
}

fn apply(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        "data_dir" => config.data_dir = value.into(),
        "server_url" => config.server_url = optional(value),
        "session_token" => config.session_token = optional(value),
        "sync_enabled" => {
            config.sync_enabled = value
                .parse()
                .context("Invalid value for sync_enabled. Use 'true' or 'false'.")?;
        }
        "debounce_ms" => {
            config.debounce_ms = value
                .parse()
                .context("Invalid value for debounce_ms. Use a number of milliseconds.")?;
        }
        "periodic_sync_secs" => {
            let secs: u64 = value
                .parse()
                .context("Invalid value for periodic_sync_secs. Use a number of seconds.")?;
            if secs == 0 {
                bail!("periodic_sync_secs must be greater than zero");
            }
            config.periodic_sync_secs = secs;
        }
        "request_timeout_secs" => {
            config.request_timeout_secs = value
                .parse()
                .context("Invalid value for request_timeout_secs. Use a number of seconds.")?;
        }
        "log_file" => config.log_file = optional(value).map(Into::into),
        _ => {
            bail!("Unknown configuration key: '{}'\nValid keys: {}", key, KEYS);
        }
    }
    Ok(())
}

/// Empty string or "none" clears an optional value
fn optional(value: &str) -> Option<String> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_known_keys() {
        let mut config = Config::default();

        apply(&mut config, "server_url", "http://localhost:8080").unwrap();
        apply(&mut config, "sync_enabled", "true").unwrap();
        apply(&mut config, "debounce_ms", "250").unwrap();

        assert_eq!(config.server_url.as_deref(), Some("http://localhost:8080"));
        assert!(config.sync_enabled);
        assert_eq!(config.debounce_ms, 250);
    }

    #[test]
    fn test_apply_clears_optional_values() {
        let mut config = Config {
            server_url: Some("http://localhost:8080".to_string()),
            session_token: Some("token".to_string()),
            ..Config::default()
        };

        apply(&mut config, "server_url", "none").unwrap();
        apply(&mut config, "session_token", "").unwrap();

        assert!(config.server_url.is_none());
        assert!(config.session_token.is_none());
    }

    #[test]
    fn test_apply_rejects_bad_values() {
        let mut config = Config::default();

        assert!(apply(&mut config, "sync_enabled", "maybe").is_err());
        assert!(apply(&mut config, "periodic_sync_secs", "0").is_err());
        assert!(apply(&mut config, "favorite_color", "blue").is_err());
    }

    #[test]
    fn test_set_persists_to_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        let data_dir = temp_dir.path().join("data");
        let output = Output::new(OutputFormat::Quiet);

        set("data_dir".into(), data_dir.display().to_string(), &path, &output).unwrap();
        set("request_timeout_secs".into(), "10".into(), &path, &output).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("request_timeout_secs = 10"));
    }
}
