//! HTTP API for state sync

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::Value;
use synapse_core::protocol::{PushAccepted, PushConflict, PushRequest};
use synapse_core::Domain;
use tracing::{debug, info, warn};

use crate::auth::AuthUser;
use crate::db::WriteOutcome;
use crate::error::{ServerError, ServerResult};
use crate::ServerState;

/// Create the API router
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/{domain}", get(read_domain).post(write_domain))
        .with_state(state)
}

/// Health check endpoint
async fn health() -> &'static str {
    "ok"
}

fn parse_domain(segment: &str) -> ServerResult<Domain> {
    segment
        .parse()
        .map_err(|_| ServerError::UnknownDomain(segment.to_string()))
}

/// Current record for the caller
async fn read_domain(
    State(state): State<Arc<ServerState>>,
    AuthUser(user_id): AuthUser,
    Path(domain): Path<String>,
) -> ServerResult<Json<Value>> {
    let domain = parse_domain(&domain)?;
    let pulled = state.service.read(&user_id, domain)?;

    debug!(user_id = %user_id, domain = %domain, version = pulled.version, "Record read");
    Ok(Json(pulled.to_json(domain)))
}

/// Versioned write of a full snapshot
async fn write_domain(
    State(state): State<Arc<ServerState>>,
    AuthUser(user_id): AuthUser,
    Path(domain): Path<String>,
    body: Bytes,
) -> ServerResult<Response> {
    let domain = parse_domain(&domain)?;
    let body: Value = serde_json::from_slice(&body)
        .map_err(|e| ServerError::BadRequest(format!("Invalid JSON body: {}", e)))?;
    let request = PushRequest::from_json(domain, body)?;

    match state.service.write(&user_id, domain, &request)? {
        WriteOutcome::Written {
            version,
            last_sync_at,
            conflict_resolved,
        } => {
            info!(
                user_id = %user_id,
                domain = %domain,
                version,
                forced = request.force_overwrite,
                "Record stored"
            );
            let accepted = PushAccepted {
                success: true,
                version,
                last_sync_at,
                conflict_resolved,
            };
            Ok((StatusCode::OK, Json(accepted)).into_response())
        }
        WriteOutcome::Conflict {
            server_version,
            client_version,
            last_sync_at,
        } => {
            warn!(
                user_id = %user_id,
                domain = %domain,
                server_version,
                client_version,
                "Stale write rejected"
            );
            let conflict = PushConflict::new(domain, server_version, client_version, last_sync_at);
            Ok((StatusCode::CONFLICT, Json(conflict)).into_response())
        }
    }
}
