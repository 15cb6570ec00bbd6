//! Versioned record store
//!
//! SQLite table of opaque ciphertext blobs keyed by `(user_id, domain)`.
//! Reading the stored version and writing the new one happen in a single
//! transaction under the connection lock, so concurrent writers for the
//! same record are serialized.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use synapse_core::Domain;
use tracing::debug;

use crate::error::{ServerError, ServerResult};
use crate::reconciler::{reconcile, Decision, RecordVersion};
use crate::schema;

/// A stored record
#[derive(Debug, Clone, PartialEq)]
pub struct StoredRecord {
    /// Ciphertext in stored form
    pub payload: String,
    pub version: u64,
    pub last_sync_at: DateTime<Utc>,
}

/// Result of a versioned write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome {
    Written {
        version: u64,
        last_sync_at: DateTime<Utc>,
        conflict_resolved: bool,
    },
    Conflict {
        server_version: u64,
        client_version: u64,
        last_sync_at: Option<DateTime<Utc>>,
    },
}

/// SQLite database for synced records
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open or create the database
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        Self::init(conn)
    }

    /// Open a private in-memory database
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::init(conn)
    }

    fn init(mut conn: Connection) -> Result<Self> {
        let applied = schema::migrate(&mut conn).context("Failed to migrate schema")?;
        if applied > 0 {
            debug!(applied, version = schema::latest_version(), "Schema migrated");
        }
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Fetch the record for a user and domain
    pub fn fetch(&self, user_id: &str, domain: Domain) -> ServerResult<Option<StoredRecord>> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT payload, version, last_sync_at FROM synced_records
                 WHERE user_id = ?1 AND domain = ?2",
                params![user_id, domain.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(payload, version, last_sync_at)| {
            Ok::<_, ServerError>(StoredRecord {
                payload,
                version: to_version(version)?,
                last_sync_at: to_timestamp(last_sync_at)?,
            })
        })
        .transpose()
    }

    /// Write a payload if the reconciler accepts it
    ///
    /// A conflict leaves the stored record untouched.
    pub fn write_versioned(
        &self,
        user_id: &str,
        domain: Domain,
        client_version: u64,
        force_overwrite: bool,
        payload: &str,
    ) -> ServerResult<WriteOutcome> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let current = tx
            .query_row(
                "SELECT version, last_sync_at FROM synced_records
                 WHERE user_id = ?1 AND domain = ?2",
                params![user_id, domain.as_str()],
                |row| Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?)),
            )
            .optional()?
            .map(|(version, last_sync_at)| {
                Ok::<_, ServerError>(RecordVersion {
                    version: to_version(version)?,
                    last_sync_at: to_timestamp(last_sync_at)?,
                })
            })
            .transpose()?;

        match reconcile(current.as_ref(), client_version, force_overwrite) {
            Decision::Conflict {
                server_version,
                client_version,
                last_sync_at,
            } => {
                debug!(
                    user_id,
                    domain = %domain,
                    server_version,
                    client_version,
                    "Write rejected as stale"
                );
                Ok(WriteOutcome::Conflict {
                    server_version,
                    client_version,
                    last_sync_at,
                })
            }
            Decision::Accept {
                next_version,
                conflict_resolved,
            } => {
                let now = Utc::now();
                let now_ms = now.timestamp_millis();
                let version = i64::try_from(next_version)
                    .map_err(|_| ServerError::Corrupt(format!("version {} overflows", next_version)))?;

                tx.execute(
                    "INSERT INTO synced_records
                        (user_id, domain, payload, version, last_sync_at, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?5)
                     ON CONFLICT (user_id, domain) DO UPDATE SET
                        payload = excluded.payload,
                        version = excluded.version,
                        last_sync_at = excluded.last_sync_at,
                        updated_at = excluded.updated_at",
                    params![user_id, domain.as_str(), payload, version, now_ms],
                )?;
                tx.commit()?;

                debug!(user_id, domain = %domain, version = next_version, "Record written");
                Ok(WriteOutcome::Written {
                    version: next_version,
                    last_sync_at: DateTime::from_timestamp_millis(now_ms).unwrap_or(now),
                    conflict_resolved,
                })
            }
        }
    }

    /// Number of stored records
    pub fn record_count(&self) -> ServerResult<u64> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM synced_records", [], |row| {
            row.get(0)
        })?;
        to_version(count)
    }
}

fn to_version(value: i64) -> ServerResult<u64> {
    u64::try_from(value).map_err(|_| ServerError::Corrupt(format!("negative version {}", value)))
}

fn to_timestamp(millis: i64) -> ServerResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| ServerError::Corrupt(format!("timestamp {} out of range", millis)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn write(db: &Database, client_version: u64, force: bool, payload: &str) -> WriteOutcome {
        db.write_versioned("user-1", Domain::Settings, client_version, force, payload)
            .unwrap()
    }

    #[test]
    fn test_missing_record() {
        assert!(db().fetch("user-1", Domain::Settings).unwrap().is_none());
    }

    #[test]
    fn test_accepted_writes_are_monotonic() {
        let db = db();
        for n in 1..=5u64 {
            match write(&db, n - 1, false, &format!("blob-{}", n)) {
                WriteOutcome::Written { version, .. } => assert_eq!(version, n),
                other => panic!("unexpected {:?}", other),
            }
        }

        let record = db.fetch("user-1", Domain::Settings).unwrap().unwrap();
        assert_eq!(record.version, 5);
        assert_eq!(record.payload, "blob-5");
    }

    #[test]
    fn test_conflict_leaves_record_untouched() {
        let db = db();
        write(&db, 0, false, "first");
        let before = db.fetch("user-1", Domain::Settings).unwrap().unwrap();

        let outcome = write(&db, 0, false, "second");

        assert_eq!(
            outcome,
            WriteOutcome::Conflict {
                server_version: 1,
                client_version: 0,
                last_sync_at: Some(before.last_sync_at),
            }
        );
        assert_eq!(db.fetch("user-1", Domain::Settings).unwrap().unwrap(), before);
    }

    #[test]
    fn test_force_overwrite() {
        let db = db();
        write(&db, 0, false, "first");
        write(&db, 1, false, "second");

        match write(&db, 0, true, "forced") {
            WriteOutcome::Written {
                version,
                conflict_resolved,
                ..
            } => {
                assert_eq!(version, 3);
                assert!(conflict_resolved);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            db.fetch("user-1", Domain::Settings).unwrap().unwrap().payload,
            "forced"
        );
    }

    #[test]
    fn test_records_are_isolated_by_user_and_domain() {
        let db = db();
        write(&db, 0, false, "settings");
        db.write_versioned("user-1", Domain::AppState, 0, false, "state")
            .unwrap();
        db.write_versioned("user-2", Domain::Settings, 0, false, "other")
            .unwrap();

        assert_eq!(db.record_count().unwrap(), 3);
        assert_eq!(
            db.fetch("user-2", Domain::Settings).unwrap().unwrap().payload,
            "other"
        );
        assert_eq!(
            db.fetch("user-1", Domain::AppState).unwrap().unwrap().version,
            1
        );
    }

    #[test]
    fn test_written_timestamp_matches_stored() {
        let db = db();
        let WriteOutcome::Written { last_sync_at, .. } = write(&db, 0, false, "x") else {
            panic!("expected write");
        };
        assert_eq!(
            db.fetch("user-1", Domain::Settings).unwrap().unwrap().last_sync_at,
            last_sync_at
        );
    }

    #[test]
    fn test_reopen_keeps_records() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("synapse.db");

        {
            let db = Database::open(&path).unwrap();
            write(&db, 0, false, "persisted");
        }

        let db = Database::open(&path).unwrap();
        let record = db.fetch("user-1", Domain::Settings).unwrap().unwrap();
        assert_eq!(record.payload, "persisted");
        assert_eq!(record.version, 1);
    }
}
