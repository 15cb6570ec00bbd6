//! SQLite schema for versioned records
//!
//! One row per user per domain. `payload` holds ciphertext only; the server
//! never stores plaintext domain data.
//!
//! Migrations are applied in order and tracked in `PRAGMA user_version`.

use rusqlite::{Connection, Result};

/// Ordered migrations; entry `n` moves the database to version `n + 1`
const MIGRATIONS: &[&str] = &[r#"
    CREATE TABLE synced_records (
        user_id TEXT NOT NULL,
        domain TEXT NOT NULL,
        payload TEXT NOT NULL,
        version INTEGER NOT NULL CHECK (version > 0),
        last_sync_at INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        PRIMARY KEY (user_id, domain)
    );
"#];

/// Version the database reaches after all migrations
pub fn latest_version() -> u32 {
    MIGRATIONS.len() as u32
}

pub fn current_version(conn: &Connection) -> Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
}

/// Apply pending migrations; returns how many ran
///
/// Each migration commits together with its version bump.
pub fn migrate(conn: &mut Connection) -> Result<usize> {
    let from = current_version(conn)? as usize;
    let pending = MIGRATIONS.iter().enumerate().skip(from);

    let mut applied = 0;
    for (index, sql) in pending {
        let tx = conn.transaction()?;
        tx.execute_batch(sql)?;
        tx.pragma_update(None, "user_version", (index + 1) as u32)?;
        tx.commit()?;
        applied += 1;
    }
    Ok(applied)
}
