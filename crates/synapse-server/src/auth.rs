//! Session resolution
//!
//! Bearer tokens are resolved to user ids from a table loaded at startup.
//! Requests without a known token are rejected before any record is read.
//!
//! Sessions file format:
//!
//! ```toml
//! [tokens]
//! "3f9c0d1e-..." = "user-1"
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use serde::Deserialize;
use tracing::warn;

use crate::error::ServerError;
use crate::ServerState;

/// Bearer token to user id table
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sessions {
    #[serde(default)]
    tokens: HashMap<String, String>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a sessions file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read sessions file {:?}", path))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse sessions file {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn insert(&mut self, token: impl Into<String>, user_id: impl Into<String>) {
        self.tokens.insert(token.into(), user_id.into());
    }

    /// User id for a token
    pub fn resolve(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Authenticated caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser(pub String);

impl FromRequestParts<Arc<ServerState>> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<ServerState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(ServerError::Unauthorized)?;

        match state.sessions.resolve(token) {
            Some(user_id) => Ok(AuthUser(user_id.to_string())),
            None => {
                warn!(path = %parts.uri.path(), "Rejected unknown session token");
                Err(ServerError::Unauthorized)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sessions_file() {
        let sessions = Sessions::from_toml_str(
            r#"
            [tokens]
            "token-a" = "user-1"
            "token-b" = "user-2"
            "#,
        )
        .unwrap();

        assert_eq!(sessions.len(), 2);
        assert_eq!(sessions.resolve("token-b"), Some("user-2"));
        assert_eq!(sessions.resolve("token-c"), None);
    }

    #[test]
    fn test_empty_sessions_file() {
        let sessions = Sessions::from_toml_str("").unwrap();
        assert!(sessions.is_empty());
    }

    #[test]
    fn test_load_from_disk() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("sessions.toml");
        std::fs::write(&path, "[tokens]\n\"t\" = \"u\"\n").unwrap();

        let sessions = Sessions::load(&path).unwrap();
        assert_eq!(sessions.resolve("t"), Some("u"));

        assert!(Sessions::load(&temp_dir.path().join("missing.toml")).is_err());
    }
}
