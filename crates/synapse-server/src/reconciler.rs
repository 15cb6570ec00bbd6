//! Version reconciliation
//!
//! Decides whether a write is accepted under optimistic concurrency. Pure
//! function of the stored version and the write's declared version; the
//! database applies the decision inside the same transaction that read the
//! stored version.

use chrono::{DateTime, Utc};

/// Version position of a stored record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordVersion {
    pub version: u64,
    pub last_sync_at: DateTime<Utc>,
}

/// Outcome of reconciling one write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Store the payload under `next_version`
    Accept {
        next_version: u64,
        /// A forced write replaced an existing record
        conflict_resolved: bool,
    },
    /// Writer is behind; store nothing
    Conflict {
        server_version: u64,
        client_version: u64,
        last_sync_at: Option<DateTime<Utc>>,
    },
}

/// Last-writer-wins with staleness detection
///
/// A missing record counts as version 0. Writes declaring at least the
/// stored version are accepted, as are forced writes.
pub fn reconcile(
    current: Option<&RecordVersion>,
    client_version: u64,
    force_overwrite: bool,
) -> Decision {
    let server_version = current.map_or(0, |record| record.version);

    match current {
        Some(record) if !force_overwrite && client_version < server_version => Decision::Conflict {
            server_version,
            client_version,
            last_sync_at: Some(record.last_sync_at),
        },
        _ => Decision::Accept {
            next_version: server_version + 1,
            conflict_resolved: force_overwrite && current.is_some(),
        },
    }
}
