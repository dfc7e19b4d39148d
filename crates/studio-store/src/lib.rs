// ABOUTME: Persistence layer for the persona studio: idempotency ledger, request tracking, raw archive.
// ABOUTME: SQLite (WAL) holds the durable keyed records; raw provider outputs are archived as files.

pub mod archive;
pub mod ledger;
pub mod tracking;

pub use archive::RawArchive;
pub use ledger::{Decision, DecisionReason, LedgerEntry, SqliteLedger, UnknownStatusPolicy};
pub use tracking::SqliteTracker;

use thiserror::Error;

/// Errors raised by the persistence layer.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
