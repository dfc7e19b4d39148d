// ABOUTME: Durable tracking of handled request issues, notices sent on them, feedback comments, and batch names.
// ABOUTME: Lets the orchestrator skip work it already finished across restarts.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, params};
use studio_core::RequestKind;

use crate::StoreError;

pub struct SqliteTracker {
    conn: Mutex<Connection>,
}

fn kind_name(kind: RequestKind) -> &'static str {
    match kind {
        RequestKind::Create => "create",
        RequestKind::Update => "update",
    }
}

impl SqliteTracker {
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS handled_requests (
                kind TEXT NOT NULL,
                number INTEGER NOT NULL,
                note TEXT NOT NULL,
                handled_at TEXT NOT NULL,
                PRIMARY KEY (kind, number)
            );

            CREATE TABLE IF NOT EXISTS request_notices (
                kind TEXT NOT NULL,
                number INTEGER NOT NULL,
                notice TEXT NOT NULL,
                noted_at TEXT NOT NULL,
                PRIMARY KEY (kind, number, notice)
            );

            CREATE TABLE IF NOT EXISTS processed_comments (
                comment_key TEXT PRIMARY KEY,
                processed_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS batch_names (
                name_key TEXT PRIMARY KEY,
                processed_at TEXT NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn is_handled(&self, kind: RequestKind, number: u64) -> Result<bool, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM handled_requests WHERE kind = ?1 AND number = ?2",
            params![kind_name(kind), number as i64],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Mark a request as fully handled. `note` records why (published,
    /// duplicate, parse error) for operators.
    pub fn mark_handled(&self, kind: RequestKind, number: u64, note: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT INTO handled_requests (kind, number, note, handled_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(kind, number) DO UPDATE SET
                note = excluded.note,
                handled_at = excluded.handled_at",
            params![kind_name(kind), number as i64, note, now()],
        )?;
        Ok(())
    }

    /// Whether `notice` was already posted on a request that is still open.
    pub fn has_notice(&self, kind: RequestKind, number: u64, notice: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM request_notices WHERE kind = ?1 AND number = ?2 AND notice = ?3",
            params![kind_name(kind), number as i64, notice],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn record_notice(&self, kind: RequestKind, number: u64, notice: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR IGNORE INTO request_notices (kind, number, notice, noted_at) VALUES (?1, ?2, ?3, ?4)",
            params![kind_name(kind), number as i64, notice, now()],
        )?;
        Ok(())
    }

    pub fn is_comment_processed(&self, key: &str) -> Result<bool, StoreError> {
        self.exists("SELECT COUNT(*) FROM processed_comments WHERE comment_key = ?1", key)
    }

    pub fn mark_comment_processed(&self, key: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR IGNORE INTO processed_comments (comment_key, processed_at) VALUES (?1, ?2)",
            params![key, now()],
        )?;
        Ok(())
    }

    pub fn is_batch_processed(&self, name_key: &str) -> Result<bool, StoreError> {
        self.exists("SELECT COUNT(*) FROM batch_names WHERE name_key = ?1", name_key)
    }

    pub fn mark_batch_processed(&self, name_key: &str) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR IGNORE INTO batch_names (name_key, processed_at) VALUES (?1, ?2)",
            params![name_key, now()],
        )?;
        Ok(())
    }

    fn exists(&self, sql: &str, key: &str) -> Result<bool, StoreError> {
        let count: i64 = self.conn().query_row(sql, params![key], |row| row.get(0))?;
        Ok(count > 0)
    }
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}
