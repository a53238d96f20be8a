//! Cycle summaries and recorded delivery failures.

use super::ComplianceStore;
use crate::error::ComplianceResult;
use crate::scheduler::CycleSummary;
use chrono::{DateTime, Utc};
use rusqlite::params;

impl ComplianceStore {
    /// A failed regulator/notifier submission, kept for out-of-band retry.
    pub fn record_delivery_failure(
        &self,
        target: &str,
        resource_type: &str,
        resource_id: &str,
        error: &str,
        now: DateTime<Utc>,
    ) -> ComplianceResult<()> {
        self.conn.execute(
            "INSERT INTO delivery_attempt
                (target, resource_type, resource_id, error, attempted_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![target, resource_type, resource_id, error, now.to_rfc3339()],
        )?;
        Ok(())
    }

    pub fn unresolved_delivery_failures(&self) -> ComplianceResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM delivery_attempt WHERE resolved = 0",
            [],
            |r| r.get(0),
        )?)
    }

    pub fn insert_cycle_summary(&self, summary: &CycleSummary) -> ComplianceResult<()> {
        self.conn.execute(
            "INSERT INTO compliance_cycle
                (ran_at, pending_alerts, stale_alerts, open_incidents,
                 due_soon_incidents, overdue_incidents,
                 regulator_notifications, breach_notifications,
                 delivery_failures, summary)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                summary.ran_at.to_rfc3339(),
                summary.pending_alerts,
                summary.stale_alerts.len() as i64,
                summary.open_incidents,
                summary.due_soon_incidents.len() as i64,
                summary.overdue_incidents.len() as i64,
                summary.regulator_notifications as i64,
                summary.breach_notifications as i64,
                summary.delivery_failures as i64,
                serde_json::to_string(summary)?
            ],
        )?;
        Ok(())
    }

    pub fn cycle_count(&self) -> ComplianceResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM compliance_cycle", [], |r| r.get(0))?)
    }
}
