//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database. The engine and scheduler
//! call store methods — they never execute SQL directly.
//!
//! Every mutating method is one short transaction; methods that change an
//! alert or incident append the matching audit entry inside that same
//! transaction, so the invariant "one mutation, one audit entry" holds even
//! if the process dies mid-operation.

mod alert;
mod audit;
mod cycle;
mod incident;
mod transaction;

use crate::error::ComplianceResult;
use crate::types::BadEnumValue;
use chrono::{DateTime, Utc};
use rusqlite::Connection;

pub struct ComplianceStore {
    conn: Connection,
}

impl ComplianceStore {
    /// Open (or create) the database at `path`. URI filenames are accepted,
    /// which lets tests share one in-memory database across connections
    /// (`file:name?mode=memory&cache=shared`).
    pub fn open(path: &str) -> ComplianceResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an isolated in-memory database (used in tests).
    pub fn in_memory() -> ComplianceResult<Self> {
        let conn = Connection::open(":memory:")?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> ComplianceResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_compliance.sql"))?;
        Ok(())
    }
}

// ── Row conversion helpers shared by the submodules ──────────────────────────

/// Parse an RFC 3339 TEXT column into a `DateTime<Utc>`.
pub(crate) fn ts_col(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

/// Same, for a nullable column.
pub(crate) fn opt_ts_col(
    row: &rusqlite::Row<'_>,
    idx: usize,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    match s {
        None => Ok(None),
        Some(s) => DateTime::parse_from_rfc3339(&s)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
    }
}

/// Error for a status/severity string that no longer maps to an enum.
pub(crate) fn enum_col_err(
    column: &'static str,
    value: String,
    idx: usize,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        Box::new(BadEnumValue { column, value }),
    )
}
