// ABOUTME: SQLite-backed idempotency ledger: at most one open published artifact per request key.
// ABOUTME: Decides whether a publish may proceed by comparing fingerprints and the artifact's external status.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use studio_core::{ArtifactRef, ArtifactStatusSource, Fingerprint};
use thiserror::Error;

use crate::StoreError;

/// One durable idempotency record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub key: String,
    pub fingerprint: Fingerprint,
    pub artifact: ArtifactRef,
    pub created_at: String,
}

/// Why [`SqliteLedger::should_publish`] decided the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionReason {
    NoExistingEntry,
    PreviousClosed,
    ContentChanged,
    DuplicateContentPending,
    /// The status query failed; the outcome follows the configured policy.
    StatusUnknown,
}

impl DecisionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoExistingEntry => "no_existing_entry",
            Self::PreviousClosed => "previous_closed",
            Self::ContentChanged => "content_changed",
            Self::DuplicateContentPending => "duplicate_content_pending",
            Self::StatusUnknown => "status_unknown",
        }
    }
}

impl fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub publish: bool,
    pub reason: DecisionReason,
}

impl Decision {
    fn publish(reason: DecisionReason) -> Self {
        Self {
            publish: true,
            reason,
        }
    }

    fn hold(reason: DecisionReason) -> Self {
        Self {
            publish: false,
            reason,
        }
    }
}

/// What to do when the publisher cannot report an artifact's status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownStatusPolicy {
    /// Treat the artifact as still open. Never double-publishes, but a
    /// persistently failing status query blocks the key.
    #[default]
    Pending,
    /// Treat the artifact as terminal and release the entry.
    Released,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown status policy: {0} (expected 'pending' or 'released')")]
pub struct UnknownPolicyName(pub String);

impl FromStr for UnknownStatusPolicy {
    type Err = UnknownPolicyName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "released" | "release" => Ok(Self::Released),
            other => Err(UnknownPolicyName(other.to_string())),
        }
    }
}

/// The ledger. Every read and write goes straight to SQLite so the state
/// survives restarts; the connection lock is never held across an await.
pub struct SqliteLedger {
    conn: Mutex<Connection>,
    policy: UnknownStatusPolicy,
}

impl SqliteLedger {
    /// Open or create the ledger database at `path`.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS ledger (
                request_key TEXT PRIMARY KEY,
                fingerprint TEXT NOT NULL,
                artifact_number INTEGER NOT NULL,
                artifact_url TEXT NOT NULL,
                artifact_branch TEXT NOT NULL,
                created_at TEXT NOT NULL
            );",
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            policy: UnknownStatusPolicy::default(),
        })
    }

    pub fn with_policy(mut self, policy: UnknownStatusPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> UnknownStatusPolicy {
        self.policy
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn get(&self, key: &str) -> Result<Option<LedgerEntry>, StoreError> {
        let conn = self.conn();
        let entry = conn
            .query_row(
                "SELECT request_key, fingerprint, artifact_number, artifact_url, artifact_branch, created_at
                 FROM ledger WHERE request_key = ?1",
                params![key],
                row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    /// Store (or replace) the entry for `key` right after a successful publish.
    pub fn record(
        &self,
        key: &str,
        artifact: &ArtifactRef,
        fingerprint: &Fingerprint,
    ) -> Result<(), StoreError> {
        self.record_at(key, artifact, fingerprint, Utc::now())
    }

    fn record_at(
        &self,
        key: &str,
        artifact: &ArtifactRef,
        fingerprint: &Fingerprint,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO ledger (request_key, fingerprint, artifact_number, artifact_url, artifact_branch, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             ON CONFLICT(request_key) DO UPDATE SET
                fingerprint = excluded.fingerprint,
                artifact_number = excluded.artifact_number,
                artifact_url = excluded.artifact_url,
                artifact_branch = excluded.artifact_branch,
                created_at = excluded.created_at",
            params![
                key,
                fingerprint.as_str(),
                artifact.number as i64,
                artifact.url,
                artifact.branch,
                timestamp(at),
            ],
        )?;
        tracing::info!(key, artifact = artifact.number, fingerprint = %fingerprint, "ledger entry recorded");
        Ok(())
    }

    /// Remove the entry for `key`. Releasing a missing key is a no-op.
    pub fn release(&self, key: &str) -> Result<(), StoreError> {
        let removed = self
            .conn()
            .execute("DELETE FROM ledger WHERE request_key = ?1", params![key])?;
        if removed > 0 {
            tracing::debug!(key, "ledger entry released");
        }
        Ok(())
    }

    /// Decide whether a new artifact may be published for `key`.
    ///
    /// A changed fingerprint supersedes the stored entry without consulting
    /// the publisher. An unchanged fingerprint publishes only once the prior
    /// artifact is closed or merged.
    pub async fn should_publish<S>(
        &self,
        key: &str,
        fingerprint: &Fingerprint,
        status: &S,
    ) -> Result<Decision, StoreError>
    where
        S: ArtifactStatusSource + ?Sized,
    {
        let Some(entry) = self.get(key)? else {
            return Ok(self.decided(key, Decision::publish(DecisionReason::NoExistingEntry)));
        };

        if entry.fingerprint != *fingerprint {
            self.release(key)?;
            return Ok(self.decided(key, Decision::publish(DecisionReason::ContentChanged)));
        }

        let decision = match status.artifact_status(&entry.artifact).await {
            Ok(state) if state.is_terminal() => {
                self.release(key)?;
                Decision::publish(DecisionReason::PreviousClosed)
            }
            Ok(_) => Decision::hold(DecisionReason::DuplicateContentPending),
            Err(e) => {
                tracing::warn!(
                    key,
                    artifact = entry.artifact.number,
                    error = %e,
                    policy = ?self.policy,
                    "artifact status unknown, applying policy"
                );
                match self.policy {
                    UnknownStatusPolicy::Pending => Decision::hold(DecisionReason::StatusUnknown),
                    UnknownStatusPolicy::Released => {
                        self.release(key)?;
                        Decision::publish(DecisionReason::StatusUnknown)
                    }
                }
            }
        };
        Ok(self.decided(key, decision))
    }

    fn decided(&self, key: &str, decision: Decision) -> Decision {
        tracing::info!(
            key,
            publish = decision.publish,
            reason = decision.reason.as_str(),
            "ledger decision"
        );
        decision
    }

    /// All entries, newest first.
    pub fn entries(&self) -> Result<Vec<LedgerEntry>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT request_key, fingerprint, artifact_number, artifact_url, artifact_branch, created_at
             FROM ledger ORDER BY created_at DESC, request_key ASC",
        )?;
        let rows = stmt.query_map([], row_to_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Delete entries recorded more than `age` ago. Returns how many were removed.
    pub fn cleanup_older_than(&self, age: Duration) -> Result<usize, StoreError> {
        let cutoff = timestamp(Utc::now() - age);
        let removed = self
            .conn()
            .execute("DELETE FROM ledger WHERE created_at < ?1", params![cutoff])?;
        if removed > 0 {
            tracing::info!(removed, "old ledger entries purged");
        }
        Ok(removed)
    }
}

fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn row_to_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<LedgerEntry> {
    let fingerprint: String = row.get(1)?;
    let number: i64 = row.get(2)?;
    Ok(LedgerEntry {
        key: row.get(0)?,
        fingerprint: Fingerprint::from_stored(fingerprint),
        artifact: ArtifactRef {
            number: number as u64,
            url: row.get(3)?,
            branch: row.get(4)?,
        },
        created_at: row.get(5)?,
    })
}
