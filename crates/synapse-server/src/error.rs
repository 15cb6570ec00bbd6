//! Server error handling
//!
//! Every handler failure maps to a status code and a `{ message }` body.
//! Internal details are logged, never returned to the caller.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use synapse_core::protocol::{ErrorBody, ProtocolError};
use thiserror::Error;
use tracing::error;

use crate::crypto::CryptoError;

#[derive(Error, Debug)]
pub enum ServerError {
    /// Request body rejected
    #[error("{0}")]
    BadRequest(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Unknown sync domain '{0}'")]
    UnknownDomain(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored ciphertext could not be produced or opened
    #[error("Payload cipher error: {0}")]
    Crypto(#[from] CryptoError),

    /// Decrypted payload is not valid JSON
    #[error("Stored payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl From<ProtocolError> for ServerError {
    fn from(e: ProtocolError) -> Self {
        ServerError::BadRequest(e.to_string())
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unauthorized => StatusCode::UNAUTHORIZED,
            ServerError::UnknownDomain(_) => StatusCode::NOT_FOUND,
            ServerError::Database(_)
            | ServerError::Crypto(_)
            | ServerError::Json(_)
            | ServerError::Corrupt(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            error!(error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };

        (status, Json(ErrorBody { message })).into_response()
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
