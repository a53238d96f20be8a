//! Incident persistence — lifecycle transitions and notification flags.

use super::audit::append_audit_entry;
use super::{enum_col_err, opt_ts_col, ts_col, ComplianceStore};
use crate::audit::AuditOperation;
use crate::error::ComplianceResult;
use crate::incident::{IncidentReport, IncidentSeverity, IncidentState};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

fn incident_from_row(r: &Row<'_>) -> rusqlite::Result<IncidentReport> {
    let severity_str: String = r.get(1)?;
    let severity = IncidentSeverity::from_db_str(&severity_str)
        .ok_or_else(|| enum_col_err("incident.severity", severity_str, 1))?;
    let state_str: String = r.get(2)?;
    let state = IncidentState::from_db_str(&state_str)
        .ok_or_else(|| enum_col_err("incident.state", state_str, 2))?;
    let details_json: String = r.get(3)?;
    let details = serde_json::from_str(&details_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(IncidentReport {
        incident_id: r.get(0)?,
        severity,
        state,
        details,
        detected_at: ts_col(r, 4)?,
        data_compromised: r.get::<_, i64>(5)? != 0,
        regulator_notified: r.get::<_, i64>(6)? != 0,
        breach_notified: r.get::<_, i64>(7)? != 0,
        regulator_ref: r.get(8)?,
        breach_ref: r.get(9)?,
        closed_at: opt_ts_col(r, 10)?,
    })
}

const INCIDENT_COLUMNS: &str =
    "incident_id, severity, state, details, detected_at, data_compromised,
     regulator_notified, breach_notified, regulator_ref, breach_ref, closed_at";

impl ComplianceStore {
    pub fn create_incident(
        &self,
        incident: &IncidentReport,
        actor_id: &str,
    ) -> ComplianceResult<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO incident
                (incident_id, severity, state, details, detected_at,
                 data_compromised)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                incident.incident_id,
                incident.severity.as_db_str(),
                incident.state.as_db_str(),
                serde_json::to_string(&incident.details)?,
                incident.detected_at.to_rfc3339(),
                incident.data_compromised as i64
            ],
        )?;
        let detail = serde_json::json!({
            "severity": incident.severity.as_db_str(),
            "data_compromised": incident.data_compromised,
        })
        .to_string();
        append_audit_entry(
            &tx,
            AuditOperation::IncidentOpened,
            actor_id,
            "incident",
            &incident.incident_id,
            &detail,
            incident.detected_at,
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_incident(
        &self,
        incident_id: &str,
    ) -> ComplianceResult<Option<IncidentReport>> {
        let incident = self
            .conn
            .query_row(
                &format!("SELECT {INCIDENT_COLUMNS} FROM incident WHERE incident_id = ?1"),
                params![incident_id],
                incident_from_row,
            )
            .optional()?;
        Ok(incident)
    }

    /// Every incident not yet closed, oldest detection first — the cycle's
    /// deadline scan.
    pub fn active_incidents(&self) -> ComplianceResult<Vec<IncidentReport>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INCIDENT_COLUMNS} FROM incident
             WHERE state != 'closed'
             ORDER BY detected_at ASC"
        ))?;
        let rows = stmt.query_map([], incident_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Conditional lifecycle transition. Zero rows affected means the stored
    /// state was not `from`, and nothing — row or audit entry — is written.
    pub fn transition_incident(
        &self,
        incident_id: &str,
        from: IncidentState,
        to: IncidentState,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> ComplianceResult<Option<IncidentReport>> {
        let closed_at = if to == IncidentState::Closed {
            Some(now.to_rfc3339())
        } else {
            None
        };
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE incident
             SET state = ?1, closed_at = COALESCE(?2, closed_at)
             WHERE incident_id = ?3 AND state = ?4",
            params![
                to.as_db_str(),
                closed_at,
                incident_id,
                from.as_db_str()
            ],
        )?;
        if changed == 0 {
            return Ok(None);
        }
        let detail = serde_json::json!({
            "from": from.as_db_str(),
            "to": to.as_db_str(),
        })
        .to_string();
        append_audit_entry(
            &tx,
            AuditOperation::IncidentStateChanged,
            actor_id,
            "incident",
            incident_id,
            &detail,
            now,
        )?;
        tx.commit()?;
        self.get_incident(incident_id)
    }

    /// Record the primary regulator notification. Conditional on the flag
    /// still being clear — this is the scheduler's dedup point, so
    /// at-least-once cycles cannot double-submit. Returns false when the
    /// flag was already set.
    pub fn mark_regulator_notified(
        &self,
        incident_id: &str,
        reference: Option<&str>,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> ComplianceResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE incident
             SET regulator_notified = 1, regulator_ref = ?1
             WHERE incident_id = ?2 AND regulator_notified = 0",
            params![reference, incident_id],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        let detail = serde_json::json!({ "reference": reference }).to_string();
        append_audit_entry(
            &tx,
            AuditOperation::RegulatorNotified,
            actor_id,
            "incident",
            incident_id,
            &detail,
            now,
        )?;
        tx.commit()?;
        Ok(true)
    }

    /// Same discipline for the independent data-breach obligation.
    pub fn mark_breach_notified(
        &self,
        incident_id: &str,
        reference: Option<&str>,
        actor_id: &str,
        now: DateTime<Utc>,
    ) -> ComplianceResult<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE incident
             SET breach_notified = 1, breach_ref = ?1
             WHERE incident_id = ?2 AND breach_notified = 0",
            params![reference, incident_id],
        )?;
        if changed == 0 {
            return Ok(false);
        }
        let detail = serde_json::json!({ "reference": reference }).to_string();
        append_audit_entry(
            &tx,
            AuditOperation::BreachNotified,
            actor_id,
            "incident",
            incident_id,
            &detail,
            now,
        )?;
        tx.commit()?;
        Ok(true)
    }

    pub fn incident_count(&self) -> ComplianceResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM incident", [], |r| r.get(0))?)
    }
}
