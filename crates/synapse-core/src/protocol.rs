//! Sync wire protocol
//!
//! JSON bodies exchanged between clients and the state server. The payload
//! field is named after the domain (`settings` or `state`), so the envelope
//! types convert to and from `serde_json::Value` with an explicit domain
//! instead of deriving a fixed field name.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::Domain;

/// Errors decoding a protocol body
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Body was not a JSON object
    #[error("{domain} body must be a JSON object")]
    NotAnObject { domain: Domain },

    /// Payload field missing or null
    #[error("{} data is required", .domain.label())]
    MissingPayload { domain: Domain },

    /// Payload present but not a JSON object
    #[error("{} data must be an object", .domain.label())]
    PayloadNotAnObject { domain: Domain },

    /// Envelope fields had the wrong shape
    #[error("Malformed {domain} body: {source}")]
    Malformed {
        domain: Domain,
        #[source]
        source: serde_json::Error,
    },
}

/// Extra information returned alongside a read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncInfo {
    pub is_new_user: bool,
}

/// Response to `GET /api/<domain>`
#[derive(Debug, Clone, PartialEq)]
pub struct PullResponse {
    /// Decrypted domain payload, `None` when the user has no record yet
    pub payload: Option<Value>,
    /// Server version (0 when no record exists)
    pub version: u64,
    /// Time of the last accepted write
    pub last_sync_at: Option<DateTime<Utc>>,
    pub sync_info: SyncInfo,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PullEnvelope {
    #[serde(default)]
    version: u64,
    #[serde(default)]
    last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    sync_info: SyncInfo,
}

impl PullResponse {
    /// The response for a user without a stored record
    pub fn empty() -> Self {
        Self {
            payload: None,
            version: 0,
            last_sync_at: None,
            sync_info: SyncInfo { is_new_user: true },
        }
    }

    /// Encode with the domain's payload field
    pub fn to_json(&self, domain: Domain) -> Value {
        let envelope = PullEnvelope {
            version: self.version,
            last_sync_at: self.last_sync_at,
            sync_info: self.sync_info,
        };
        with_payload(envelope, domain, self.payload.clone().unwrap_or(Value::Null))
    }

    /// Decode a response body for the given domain
    pub fn from_json(domain: Domain, value: Value) -> Result<Self, ProtocolError> {
        let (payload, rest) = split_payload(domain, value)?;
        let envelope: PullEnvelope = serde_json::from_value(rest)
            .map_err(|source| ProtocolError::Malformed { domain, source })?;

        Ok(Self {
            payload,
            version: envelope.version,
            last_sync_at: envelope.last_sync_at,
            sync_info: envelope.sync_info,
        })
    }
}

/// Body of `POST /api/<domain>`
#[derive(Debug, Clone, PartialEq)]
pub struct PushRequest {
    /// Full domain snapshot
    pub payload: Value,
    /// Last version the client observed
    pub client_version: u64,
    /// Bypass conflict detection
    pub force_overwrite: bool,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushEnvelope {
    #[serde(default)]
    client_version: u64,
    #[serde(default)]
    force_overwrite: bool,
}

impl PushRequest {
    /// Encode with the domain's payload field
    pub fn to_json(&self, domain: Domain) -> Value {
        let envelope = PushEnvelope {
            client_version: self.client_version,
            force_overwrite: self.force_overwrite,
        };
        with_payload(envelope, domain, self.payload.clone())
    }

    /// Decode a request body
    ///
    /// The payload must be present and a JSON object; clients cannot decode
    /// anything else back into domain state.
    pub fn from_json(domain: Domain, value: Value) -> Result<Self, ProtocolError> {
        let (payload, rest) = split_payload(domain, value)?;
        let payload = payload.ok_or(ProtocolError::MissingPayload { domain })?;
        if !payload.is_object() {
            return Err(ProtocolError::PayloadNotAnObject { domain });
        }
        let envelope: PushEnvelope = serde_json::from_value(rest)
            .map_err(|source| ProtocolError::Malformed { domain, source })?;

        Ok(Self {
            payload,
            client_version: envelope.client_version,
            force_overwrite: envelope.force_overwrite,
        })
    }
}

/// `200` response to an accepted push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushAccepted {
    pub success: bool,
    /// New server version
    pub version: u64,
    pub last_sync_at: DateTime<Utc>,
    /// True when a forced write replaced an existing record
    #[serde(default)]
    pub conflict_resolved: bool,
}

/// `409` response to a stale push
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushConflict {
    pub conflict: bool,
    #[serde(default)]
    pub message: String,
    pub server_version: u64,
    pub client_version: u64,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl PushConflict {
    pub fn new(
        domain: Domain,
        server_version: u64,
        client_version: u64,
        last_sync_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            conflict: true,
            message: format!("{} conflict detected", domain.label()),
            server_version,
            client_version,
            last_sync_at,
        }
    }
}

/// Body of every non-2xx response other than a conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
}

fn with_payload<E: Serialize>(envelope: E, domain: Domain, payload: Value) -> Value {
    let mut map = match serde_json::to_value(envelope) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    };
    map.insert(domain.payload_field().to_string(), payload);
    Value::Object(map)
}

fn split_payload(domain: Domain, value: Value) -> Result<(Option<Value>, Value), ProtocolError> {
    let Value::Object(mut map) = value else {
        return Err(ProtocolError::NotAnObject { domain });
    };
    let payload = map
        .remove(domain.payload_field())
        .filter(|payload| !payload.is_null());
    Ok((payload, Value::Object(map)))
}
