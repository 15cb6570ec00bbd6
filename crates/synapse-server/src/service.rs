//! Sync service
//!
//! Encryption boundary between the HTTP layer and the record store:
//! serialize, encrypt, store on write; load, decrypt, deserialize on read.

use std::sync::Arc;

use serde_json::Value;
use synapse_core::protocol::{PullResponse, PushRequest, SyncInfo};
use synapse_core::Domain;

use crate::crypto::PayloadCipher;
use crate::db::{Database, WriteOutcome};
use crate::error::ServerResult;

pub struct SyncService {
    db: Arc<Database>,
    cipher: PayloadCipher,
}

impl SyncService {
    pub fn new(db: Arc<Database>, cipher: PayloadCipher) -> Self {
        Self { db, cipher }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    /// Current record for a user, decrypted
    ///
    /// A stored payload that fails to decrypt or parse is an error for this
    /// request only; the ciphertext is left in place.
    pub fn read(&self, user_id: &str, domain: Domain) -> ServerResult<PullResponse> {
        let Some(record) = self.db.fetch(user_id, domain)? else {
            return Ok(PullResponse::empty());
        };

        let plaintext = self.cipher.decrypt(&record.payload)?;
        let payload: Value = serde_json::from_slice(&plaintext)?;

        Ok(PullResponse {
            payload: Some(payload),
            version: record.version,
            last_sync_at: Some(record.last_sync_at),
            sync_info: SyncInfo { is_new_user: false },
        })
    }

    /// Encrypt and store a pushed snapshot under version control
    pub fn write(
        &self,
        user_id: &str,
        domain: Domain,
        request: &PushRequest,
    ) -> ServerResult<WriteOutcome> {
        let plaintext = serde_json::to_vec(&request.payload)?;
        let ciphertext = self.cipher.encrypt(&plaintext)?;

        self.db.write_versioned(
            user_id,
            domain,
            request.client_version,
            request.force_overwrite,
            &ciphertext,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServerError;
    use serde_json::json;

    fn service() -> SyncService {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let cipher = PayloadCipher::from_base64(&PayloadCipher::generate_key()).unwrap();
        SyncService::new(db, cipher)
    }

    fn push(payload: Value, client_version: u64) -> PushRequest {
        PushRequest {
            payload,
            client_version,
            force_overwrite: false,
        }
    }

    #[test]
    fn test_read_of_new_user() {
        let pulled = service().read("user-1", Domain::Settings).unwrap();
        assert_eq!(pulled, PullResponse::empty());
        assert!(pulled.sync_info.is_new_user);
    }

    #[test]
    fn test_stored_payload_is_encrypted() {
        let service = service();
        service
            .write("user-1", Domain::Settings, &push(json!({ "apiKeys": { "gemini": "g-secret" } }), 0))
            .unwrap();

        let stored = service.db().fetch("user-1", Domain::Settings).unwrap().unwrap();
        assert!(!stored.payload.contains("g-secret"));

        let pulled = service.read("user-1", Domain::Settings).unwrap();
        assert_eq!(pulled.payload, Some(json!({ "apiKeys": { "gemini": "g-secret" } })));
        assert_eq!(pulled.version, 1);
        assert!(!pulled.sync_info.is_new_user);
    }

    #[test]
    fn test_undecryptable_record_is_internal_error() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let writer = SyncService::new(
            db.clone(),
            PayloadCipher::from_base64(&PayloadCipher::generate_key()).unwrap(),
        );
        let reader = SyncService::new(
            db.clone(),
            PayloadCipher::from_base64(&PayloadCipher::generate_key()).unwrap(),
        );
        writer
            .write("user-1", Domain::AppState, &push(json!({ "tabs": [] }), 0))
            .unwrap();

        let err = reader.read("user-1", Domain::AppState).unwrap_err();
        assert!(matches!(err, ServerError::Crypto(_)));

        // Ciphertext stays put
        assert_eq!(db.fetch("user-1", Domain::AppState).unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_idempotent_read() {
        let service = service();
        service
            .write("user-1", Domain::AppState, &push(json!({ "activeTab": "t1" }), 0))
            .unwrap();

        let first = service.read("user-1", Domain::AppState).unwrap();
        let second = service.read("user-1", Domain::AppState).unwrap();
        assert_eq!(first, second);
    }
}
