//! Client configuration
//!
//! Values are layered, later layers winning:
//! defaults, then `~/.config/synapse/config.toml` (or `SYNAPSE_CONFIG`),
//! then `SYNAPSE_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::Domain;

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for the local state caches
    pub data_dir: PathBuf,

    /// State server base URL, e.g. `http://localhost:8080`
    pub server_url: Option<String>,

    /// Bearer token identifying the signed-in user
    pub session_token: Option<String>,

    /// Whether cross-device sync is enabled
    pub sync_enabled: bool,

    /// Quiet period before a mutation burst is pushed
    pub debounce_ms: u64,

    /// Interval of the background push while signed in
    pub periodic_sync_secs: u64,

    /// Per-request timeout for server calls
    pub request_timeout_secs: u64,

    /// Write logs to this file instead of stderr
    pub log_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("synapse"),
            server_url: None,
            session_token: None,
            sync_enabled: false,
            debounce_ms: 800,
            periodic_sync_secs: 5 * 60,
            request_timeout_secs: 30,
            log_file: None,
        }
    }
}

impl Config {
    /// Load from the default config file plus environment
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load from a specific file plus environment
    ///
    /// A missing file means defaults. The data directory is created.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)
                .with_context(|| format!("Invalid config file {}", path.display()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                return Err(e).with_context(|| format!("Cannot read config file {}", path.display()))
            }
        };
        config.apply_env(|name| std::env::var(name).ok());

        std::fs::create_dir_all(&config.data_dir).with_context(|| {
            format!("Cannot create data directory {}", config.data_dir.display())
        })?;
        Ok(config)
    }

    /// Parse TOML and apply the environment, without touching the filesystem
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(toml_content).context("Invalid config TOML")?;
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Overlay `SYNAPSE_*` variables read through `lookup`
    ///
    /// An empty `SERVER_URL` or `SESSION_TOKEN` clears the value.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(dir) = lookup("SYNAPSE_DATA_DIR") {
            self.data_dir = dir.into();
        }
        if let Some(url) = lookup("SYNAPSE_SERVER_URL") {
            self.server_url = Some(url).filter(|v| !v.is_empty());
        }
        if let Some(token) = lookup("SYNAPSE_SESSION_TOKEN") {
            self.session_token = Some(token).filter(|v| !v.is_empty());
        }
        if let Some(flag) = lookup("SYNAPSE_SYNC_ENABLED") {
            self.sync_enabled = matches!(flag.to_ascii_lowercase().as_str(), "true" | "1");
        }
    }

    /// Save to the default config file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Cannot create config directory {}", dir.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Cannot serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Cannot write config file {}", path.display()))
    }

    /// `SYNAPSE_CONFIG`, or `synapse/config.toml` under the user config dir
    pub fn config_file_path() -> PathBuf {
        match std::env::var_os("SYNAPSE_CONFIG") {
            Some(path) => PathBuf::from(path),
            None => dirs::config_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("synapse")
                .join("config.toml"),
        }
    }

    /// Whether a server and a session are both available
    pub fn sync_configured(&self) -> bool {
        self.sync_enabled && self.server_url.is_some() && self.session_token.is_some()
    }

    /// Path of the local cache for a domain
    pub fn cache_path(&self, domain: Domain) -> PathBuf {
        self.data_dir.join(format!("{}.json", domain.as_str()))
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn periodic_sync_interval(&self) -> Duration {
        Duration::from_secs(self.periodic_sync_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
