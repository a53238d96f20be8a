//! Audit log persistence — append and range reads.
//!
//! The audit_log table never sees UPDATE or DELETE from this code; `verify`
//! in the audit module is the sole detection mechanism for out-of-band
//! edits, and that is by design.

use super::{ts_col, ComplianceStore};
use crate::audit::{chain_digest, AuditLogEntry, AuditOperation, GENESIS_HASH};
use crate::error::ComplianceResult;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

/// Append one entry on `conn`, chaining it to the current tail. Called
/// inside the same transaction as the business mutation it records, with
/// the transaction handle deref'd to a connection.
pub(crate) fn append_audit_entry(
    conn: &Connection,
    operation: AuditOperation,
    actor_id: &str,
    resource_type: &str,
    resource_id: &str,
    detail: &str,
    recorded_at: DateTime<Utc>,
) -> ComplianceResult<AuditLogEntry> {
    let prev_hash: String = conn
        .query_row(
            "SELECT digest FROM audit_log ORDER BY seq DESC LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()?
        .unwrap_or_else(|| GENESIS_HASH.to_string());

    let recorded_at_str = recorded_at.to_rfc3339();
    let digest = chain_digest(
        operation.as_str(),
        actor_id,
        resource_type,
        resource_id,
        detail,
        &recorded_at_str,
        &prev_hash,
    );

    conn.execute(
        "INSERT INTO audit_log
            (operation, actor_id, resource_type, resource_id, detail,
             recorded_at, prev_hash, digest)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            operation.as_str(),
            actor_id,
            resource_type,
            resource_id,
            detail,
            recorded_at_str,
            prev_hash,
            digest
        ],
    )?;
    let seq = conn.last_insert_rowid();

    Ok(AuditLogEntry {
        seq,
        operation: operation.as_str().to_string(),
        actor_id: actor_id.to_string(),
        resource_type: resource_type.to_string(),
        resource_id: resource_id.to_string(),
        detail: detail.to_string(),
        recorded_at,
        prev_hash,
        digest,
    })
}

impl ComplianceStore {
    /// Read entries in sequence order, optionally bounded to `[from, to]`.
    pub fn audit_entries(
        &self,
        range: Option<(i64, i64)>,
    ) -> ComplianceResult<Vec<AuditLogEntry>> {
        let (from, to) = range.unwrap_or((1, i64::MAX));
        let mut stmt = self.conn.prepare(
            "SELECT seq, operation, actor_id, resource_type, resource_id,
                    detail, recorded_at, prev_hash, digest
             FROM audit_log
             WHERE seq >= ?1 AND seq <= ?2
             ORDER BY seq ASC",
        )?;
        let rows = stmt.query_map(params![from, to], |r| {
            Ok(AuditLogEntry {
                seq: r.get(0)?,
                operation: r.get(1)?,
                actor_id: r.get(2)?,
                resource_type: r.get(3)?,
                resource_id: r.get(4)?,
                detail: r.get(5)?,
                recorded_at: ts_col(r, 6)?,
                prev_hash: r.get(7)?,
                digest: r.get(8)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Stored digest of the entry immediately before `seq`, used to anchor
    /// verification of a mid-chain range.
    pub fn digest_before(&self, seq: i64) -> ComplianceResult<Option<String>> {
        let digest = self
            .conn
            .query_row(
                "SELECT digest FROM audit_log WHERE seq < ?1
                 ORDER BY seq DESC LIMIT 1",
                params![seq],
                |r| r.get(0),
            )
            .optional()?;
        Ok(digest)
    }

    pub fn audit_count(&self) -> ComplianceResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM audit_log", [], |r| r.get(0))?)
    }

    /// Count of entries recorded against one resource (test support).
    pub fn audit_count_for_resource(&self, resource_id: &str) -> ComplianceResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM audit_log WHERE resource_id = ?1",
            params![resource_id],
            |r| r.get(0),
        )?)
    }
}
