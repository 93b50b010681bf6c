//! SQLite persistence layer.
//!
//! RULE: Only store/ talks to the database.
//! Registries and the engine call store methods — they never execute SQL
//! directly.
//!
//! One connection, guarded by a mutex. Every public method holds the lock
//! for its whole statement or transaction, so a reader never observes a
//! half-applied write.

use crate::{
    error::{AppraisalError, AppraisalResult},
    types::Money,
};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, types::Type, Connection, Row};
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

mod appraisal_log;
mod condition;
mod parameter;
mod punishment;

const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../../migrations/001_foundation.sql")),
    (2, include_str!("../../../migrations/002_punishment_policy.sql")),
    (3, include_str!("../../../migrations/003_condition_modifiers.sql")),
    (4, include_str!("../../../migrations/004_parameters.sql")),
    (5, include_str!("../../../migrations/005_appraisal_log.sql")),
];

pub struct AppraisalStore {
    conn: Mutex<Connection>,
    path: Option<String>, // None for :memory:, Some(path) for file
}

impl AppraisalStore {
    pub fn open(path: &str) -> AppraisalResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        if let Err(e) = conn.execute_batch("PRAGMA journal_mode=WAL;") {
            log::debug!("store: WAL not enabled for {path}: {e}");
        }
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        log::debug!("store: opened {path}");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_string()),
        })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AppraisalResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn: Mutex::new(conn), path: None })
    }

    pub fn path(&self) -> Option<&str> {
        self.path.as_deref()
    }

    /// Apply all schema migrations in order. Safe to call repeatedly.
    pub fn migrate(&self) -> AppraisalResult<()> {
        let conn = self.conn();
        for (version, sql) in MIGRATIONS {
            conn.execute_batch(sql)?;
            conn.execute(
                "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, ?2)",
                params![version, Utc::now().timestamp_millis()],
            )?;
        }
        log::debug!("store: schema at version {}", MIGRATIONS.len());
        Ok(())
    }

    pub fn schema_version(&self) -> AppraisalResult<i64> {
        let version: i64 = self.conn().query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )?;
        Ok(version)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic mid-transaction drops the Transaction, which rolls back.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Column codecs ──────────────────────────────────────────────────
//
// Decimals are TEXT (exact), instants are INTEGER epoch millis,
// calendar dates are TEXT YYYY-MM-DD.

pub(crate) fn money_to_sql(value: Money) -> String {
    value.normalize().to_string()
}

pub(crate) fn money_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Money> {
    let text: String = row.get(idx)?;
    Money::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn instant_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let millis: i64 = row.get(idx)?;
    DateTime::from_timestamp_millis(millis).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("timestamp {millis} out of range").into(),
        )
    })
}

pub(crate) fn date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let text: String = row.get(idx)?;
    NaiveDate::parse_from_str(&text, "%Y-%m-%d")
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

pub(crate) fn corrupt(table: &str, id: i64, e: AppraisalError) -> AppraisalError {
    AppraisalError::CorruptRecord(format!("{table} row {id}: {e}"))
}
