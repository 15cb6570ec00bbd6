//! Local state cache
//!
//! Persists each domain's state together with the last observed server
//! version, so a restarted client knows whether it holds previously synced
//! data. Uses atomic writes (write to temp file, then rename) to prevent
//! corruption.
//!
//! Files (under `data_dir`):
//! - `settings.json`
//! - `app-state.json`

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the cache file holds for one domain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedDomain<T> {
    pub data: T,
    #[serde(default)]
    pub version: u64,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
}

/// Cache file for one domain
#[derive(Debug, Clone)]
pub struct LocalCache {
    path: PathBuf,
}

impl LocalCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check if a cache file exists on disk
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load the cached state
    ///
    /// Returns `None` if the file doesn't exist.
    /// Returns an error if the file exists but can't be read or parsed.
    pub fn load<T: for<'de> Deserialize<'de>>(&self) -> Result<Option<CachedDomain<T>>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read cache from {:?}", self.path))?;
        let cached = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse cache in {:?}", self.path))?;

        Ok(Some(cached))
    }

    /// Save state to disk using atomic write
    pub fn save<T: Serialize>(&self, cached: &CachedDomain<T>) -> Result<()> {
        let bytes = Self::encode(cached)?;
        self.write(&bytes)
    }

    /// Serialize a cache entry without touching the disk
    pub fn encode<T: Serialize>(cached: &CachedDomain<T>) -> Result<Vec<u8>> {
        serde_json::to_vec_pretty(cached).context("Failed to serialize cache")
    }

    /// Atomically replace the cache file with already encoded bytes
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        atomic_write(&self.path, bytes)
            .with_context(|| format!("Failed to save cache to {:?}", self.path))
    }
}

/// Write data to a file atomically
///
/// 1. Write to a temporary file in the same directory
/// 2. Sync the file to disk
/// 3. Rename the temp file to the target path
fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }

    // Same directory so the rename stays atomic
    let temp_path = path.with_extension("tmp");

    let mut file = File::create(&temp_path)
        .with_context(|| format!("Failed to create temp file {:?}", temp_path))?;

    file.write_all(data)
        .with_context(|| format!("Failed to write to temp file {:?}", temp_path))?;

    file.sync_all()
        .with_context(|| format!("Failed to sync temp file {:?}", temp_path))?;

    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename {:?} to {:?}", temp_path, path))?;

    Ok(())
}
