//! Sync error handling
//!
//! Typed errors for client-side sync operations. Conflicts and
//! unauthenticated responses are not errors; they are outcomes (see
//! [`crate::sync::PushOutcome`]).

use thiserror::Error;

use crate::domain::Domain;
use crate::protocol::ProtocolError;

/// Errors that can occur while talking to the state server
#[derive(Error, Debug)]
pub enum SyncError {
    /// Request never produced a response (connect failure, timeout, TLS)
    #[error("Request to '{url}' failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with an unexpected status
    #[error("Server returned {status} for '{url}': {message}")]
    Server {
        url: String,
        status: u16,
        message: String,
    },

    /// Server answered but the body could not be understood
    #[error("Malformed response from '{url}': {details}")]
    InvalidResponse { url: String, details: String },

    /// Protocol envelope could not be decoded
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Domain payload did not match the local model
    #[error("Invalid {domain} payload: {source}")]
    Payload {
        domain: Domain,
        #[source]
        source: serde_json::Error,
    },
}

impl SyncError {
    /// Check if a later retry could succeed without user action
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport { .. } => true,
            SyncError::Server { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Get a recovery suggestion for this error
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            SyncError::Transport { source, .. } if source.is_timeout() => {
                Some("The server did not answer in time. Changes stay local and are retried on the next sync.")
            }
            SyncError::Transport { .. } => {
                Some("Check that server_url is correct and the server is running.")
            }
            SyncError::Server { status, .. } if *status >= 500 => {
                Some("The server failed to process the request. Check the server logs.")
            }
            SyncError::Payload { .. } => {
                Some("The server copy was written by an incompatible client. Push with --force to replace it.")
            }
            _ => None,
        }
    }
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
