//! Monitored transaction and risk assessment queries.

use super::{ts_col, ComplianceStore};
use crate::error::ComplianceResult;
use crate::risk::{MonitoredTransaction, RiskAssessment};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, OptionalExtension};

impl ComplianceStore {
    pub fn insert_transaction(&self, txn: &MonitoredTransaction) -> ComplianceResult<()> {
        self.conn.execute(
            "INSERT INTO monitored_transaction
                (txn_id, account_id, amount, currency, merchant, category, occurred_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                txn.txn_id,
                txn.account_id,
                txn.amount,
                txn.currency,
                txn.merchant,
                txn.category,
                txn.occurred_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn transaction_exists(&self, txn_id: &str) -> ComplianceResult<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM monitored_transaction WHERE txn_id = ?1",
            params![txn_id],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn get_transaction(
        &self,
        txn_id: &str,
    ) -> ComplianceResult<Option<MonitoredTransaction>> {
        let txn = self
            .conn
            .query_row(
                "SELECT txn_id, account_id, amount, currency, merchant, category, occurred_at
                 FROM monitored_transaction WHERE txn_id = ?1",
                params![txn_id],
                |r| {
                    Ok(MonitoredTransaction {
                        txn_id: r.get(0)?,
                        account_id: r.get(1)?,
                        amount: r.get(2)?,
                        currency: r.get(3)?,
                        merchant: r.get(4)?,
                        category: r.get(5)?,
                        occurred_at: ts_col(r, 6)?,
                    })
                },
            )
            .optional()?;
        Ok(txn)
    }

    /// Prior transactions for an account inside a lookback window ending at
    /// `until`, excluding `exclude_txn`, most recent first. This is the
    /// history handed to the pure scoring function.
    pub fn account_history(
        &self,
        account_id: &str,
        exclude_txn: &str,
        until: DateTime<Utc>,
        lookback_hours: f64,
    ) -> ComplianceResult<Vec<MonitoredTransaction>> {
        let since = until - Duration::seconds((lookback_hours * 3600.0) as i64);
        let mut stmt = self.conn.prepare(
            "SELECT txn_id, account_id, amount, currency, merchant, category, occurred_at
             FROM monitored_transaction
             WHERE account_id = ?1 AND txn_id != ?2
               AND occurred_at >= ?3 AND occurred_at <= ?4
             ORDER BY occurred_at DESC",
        )?;
        let rows = stmt.query_map(
            params![
                account_id,
                exclude_txn,
                since.to_rfc3339(),
                until.to_rfc3339()
            ],
            |r| {
                Ok(MonitoredTransaction {
                    txn_id: r.get(0)?,
                    account_id: r.get(1)?,
                    amount: r.get(2)?,
                    currency: r.get(3)?,
                    merchant: r.get(4)?,
                    category: r.get(5)?,
                    occurred_at: ts_col(r, 6)?,
                })
            },
        )?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn insert_assessment(&self, assessment: &RiskAssessment) -> ComplianceResult<()> {
        self.conn.execute(
            "INSERT INTO risk_assessment
                (assessment_id, txn_id, account_id, score, triggered_rules,
                 requires_review, assessed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                assessment.assessment_id,
                assessment.txn_id,
                assessment.account_id,
                assessment.score,
                serde_json::to_string(&assessment.triggered_rules)?,
                assessment.requires_review as i64,
                assessment.assessed_at.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// All assessments ever produced for a transaction, oldest first —
    /// re-assessment appends, never rewrites.
    pub fn assessments_for_transaction(
        &self,
        txn_id: &str,
    ) -> ComplianceResult<Vec<RiskAssessment>> {
        let mut stmt = self.conn.prepare(
            "SELECT assessment_id, txn_id, account_id, score, triggered_rules,
                    requires_review, assessed_at
             FROM risk_assessment
             WHERE txn_id = ?1
             ORDER BY assessed_at ASC, assessment_id ASC",
        )?;
        let rows = stmt.query_map(params![txn_id], |r| {
            let rules_json: String = r.get(4)?;
            let triggered_rules = serde_json::from_str(&rules_json).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    4,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Ok(RiskAssessment {
                assessment_id: r.get(0)?,
                txn_id: r.get(1)?,
                account_id: r.get(2)?,
                score: r.get(3)?,
                triggered_rules,
                requires_review: r.get::<_, i64>(5)? != 0,
                assessed_at: ts_col(r, 6)?,
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn assessment_count(&self) -> ComplianceResult<i64> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM risk_assessment", [], |r| r.get(0))?)
    }
}
