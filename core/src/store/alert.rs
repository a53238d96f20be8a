//! Alert persistence — creation, the claim compare-and-swap, decisions.

use super::audit::append_audit_entry;
use super::{enum_col_err, ts_col, ComplianceStore};
use crate::alert::{Alert, AlertStatus, ReviewDecision};
use crate::audit::AuditOperation;
use crate::error::ComplianceResult;
use crate::risk::RiskAssessment;
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

fn alert_from_row(r: &Row<'_>) -> rusqlite::Result<Alert> {
    let status_str: String = r.get(4)?;
    let status = AlertStatus::from_db_str(&status_str)
        .ok_or_else(|| enum_col_err("alert.status", status_str, 4))?;
    let decision_str: Option<String> = r.get(6)?;
    let decision = match decision_str {
        None => None,
        Some(s) => Some(
            ReviewDecision::from_db_str(&s)
                .ok_or_else(|| enum_col_err("alert.decision", s, 6))?,
        ),
    };
    Ok(Alert {
        alert_id: r.get(0)?,
        assessment_id: r.get(1)?,
        txn_id: r.get(2)?,
        account_id: r.get(3)?,
        status,
        reviewer_id: r.get(5)?,
        decision,
        notes: r.get(7)?,
        submission_ref: r.get(8)?,
        created_at: ts_col(r, 9)?,
        updated_at: ts_col(r, 10)?,
    })
}

const ALERT_COLUMNS: &str =
    "alert_id, assessment_id, txn_id, account_id, status, reviewer_id,
     decision, notes, submission_ref, created_at, updated_at";

impl ComplianceStore {
    /// Open a pending alert for an assessment that requires review. The
    /// alert row and its audit entry commit together.
    pub fn create_alert(
        &self,
        assessment: &RiskAssessment,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> ComplianceResult<Alert> {
        let alert_id = Uuid::new_v4().to_string();
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO alert
                (alert_id, assessment_id, txn_id, account_id, status,
                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)",
            params![
                alert_id,
                assessment.assessment_id,
                assessment.txn_id,
                assessment.account_id,
                now.to_rfc3339()
            ],
        )?;
        let detail = serde_json::json!({
            "assessment_id": assessment.assessment_id,
            "score": assessment.score,
            "triggered_rules": assessment.triggered_rules,
        })
        .to_string();
        append_audit_entry(
            &tx,
            AuditOperation::AlertCreated,
            actor_id,
            "alert",
            &alert_id,
            &detail,
            now,
        )?;
        tx.commit()?;

        self.get_alert(&alert_id)?.ok_or_else(|| {
            crate::error::ComplianceError::NotFound(format!("alert {alert_id}"))
        })
    }

    pub fn get_alert(&self, alert_id: &str) -> ComplianceResult<Option<Alert>> {
        let alert = self
            .conn
            .query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM alert WHERE alert_id = ?1"),
                params![alert_id],
                alert_from_row,
            )
            .optional()?;
        Ok(alert)
    }

    pub fn list_pending_alerts(&self, limit: usize) -> ComplianceResult<Vec<Alert>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alert
             WHERE status = 'pending'
             ORDER BY created_at ASC
             LIMIT ?1"
        ))?;
        let rows = stmt.query_map(params![limit as i64], alert_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Pending alerts created before `cutoff` — the cycle's SLA scan.
    pub fn pending_alerts_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> ComplianceResult<Vec<Alert>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {ALERT_COLUMNS} FROM alert
             WHERE status = 'pending' AND created_at < ?1
             ORDER BY created_at ASC"
        ))?;
        let rows = stmt.query_map(params![cutoff.to_rfc3339()], alert_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Any alert already opened for a transaction, regardless of state.
    pub fn alert_for_transaction(&self, txn_id: &str) -> ComplianceResult<Option<Alert>> {
        let alert = self
            .conn
            .query_row(
                &format!(
                    "SELECT {ALERT_COLUMNS} FROM alert
                     WHERE txn_id = ?1
                     ORDER BY created_at ASC LIMIT 1"
                ),
                params![txn_id],
                alert_from_row,
            )
            .optional()?;
        Ok(alert)
    }

    pub fn pending_alert_count(&self) -> ComplianceResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM alert WHERE status = 'pending'",
            [],
            |r| r.get(0),
        )?)
    }

    /// The claim compare-and-swap. A conditional update scoped to the
    /// pending state makes two racing reviewers produce exactly one winner;
    /// zero rows affected means the claim was lost and nothing — row or
    /// audit entry — is written.
    pub fn claim_alert(
        &self,
        alert_id: &str,
        reviewer_id: &str,
        now: DateTime<Utc>,
    ) -> ComplianceResult<Option<Alert>> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE alert
             SET status = 'under_review', reviewer_id = ?1, updated_at = ?2
             WHERE alert_id = ?3 AND status = 'pending'",
            params![reviewer_id, now.to_rfc3339(), alert_id],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let detail = serde_json::json!({
            "from": "pending",
            "to": "under_review",
            "reviewer_id": reviewer_id,
        })
        .to_string();
        append_audit_entry(
            &tx,
            AuditOperation::AlertClaimed,
            reviewer_id,
            "alert",
            alert_id,
            &detail,
            now,
        )?;
        tx.commit()?;
        self.get_alert(alert_id)
    }

    /// Record the reviewer's decision. Conditional on the alert still being
    /// under review by this reviewer; zero rows means the caller raced a
    /// concurrent mutation and nothing is written.
    pub fn decide_alert(
        &self,
        alert_id: &str,
        reviewer_id: &str,
        decision: ReviewDecision,
        notes: &str,
        submission_ref: Option<&str>,
        now: DateTime<Utc>,
    ) -> ComplianceResult<Option<Alert>> {
        let final_status = decision.final_status();
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE alert
             SET status = ?1, decision = ?2, notes = ?3, submission_ref = ?4,
                 updated_at = ?5
             WHERE alert_id = ?6 AND status = 'under_review' AND reviewer_id = ?7",
            params![
                final_status.as_db_str(),
                decision.as_db_str(),
                notes,
                submission_ref,
                now.to_rfc3339(),
                alert_id,
                reviewer_id
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let detail = serde_json::json!({
            "from": "under_review",
            "to": final_status.as_db_str(),
            "decision": decision.as_db_str(),
            "reviewer_id": reviewer_id,
            "submission_ref": submission_ref,
        })
        .to_string();
        append_audit_entry(
            &tx,
            AuditOperation::AlertDecided,
            reviewer_id,
            "alert",
            alert_id,
            &detail,
            now,
        )?;
        tx.commit()?;
        self.get_alert(alert_id)
    }
}
