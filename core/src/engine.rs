//! The compliance engine — the public face of the core.
//!
//! Wires the store, rule configuration, clock and external collaborators
//! together and exposes the operations an API layer calls:
//! assessment, alert review, incident lifecycle, audit verification and the
//! periodic compliance cycle (scheduler.rs).
//!
//! RULES:
//!   - Validation failures reject before any state change.
//!   - Losing the claim race is `Conflict`; an illegal lifecycle move is
//!     `InvalidStateTransition`; callers must be able to tell them apart.
//!   - Regulator delivery is an at-least-once side effect: a failed
//!     submission is recorded for retry and never rolls back the local,
//!     audit-logged transition.

use crate::{
    alert::{Alert, AlertStatus, ReviewDecision},
    audit::{verify_chain, ChainVerification, GENESIS_HASH},
    clock::Clock,
    config::ComplianceConfig,
    error::{ComplianceError, ComplianceResult},
    external::{HealthCheck, Notifier, RegulatorSubmitter, SubmissionPayload},
    incident::{
        IncidentDetails, IncidentReport, IncidentSeverity, IncidentState,
        IncidentStatusView,
    },
    risk::{self, MonitoredTransaction, RiskAssessment},
    store::ComplianceStore,
    types::ActorId,
};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Actor recorded for mutations the engine makes on its own behalf.
pub const SYSTEM_ACTOR: &str = "system";

pub struct ComplianceEngine {
    pub store: ComplianceStore,
    pub config: ComplianceConfig,
    pub(crate) clock: Box<dyn Clock>,
    /// Regulator A: financial-crime reporting.
    pub(crate) fincrime_regulator: Box<dyn RegulatorSubmitter>,
    /// Regulator B: data-breach reporting.
    pub(crate) breach_regulator: Box<dyn RegulatorSubmitter>,
    pub(crate) notifier: Box<dyn Notifier>,
    pub(crate) health_checks: Vec<Box<dyn HealthCheck>>,
}

impl ComplianceEngine {
    pub fn new(
        store: ComplianceStore,
        config: ComplianceConfig,
        clock: Box<dyn Clock>,
        fincrime_regulator: Box<dyn RegulatorSubmitter>,
        breach_regulator: Box<dyn RegulatorSubmitter>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            config,
            clock,
            fincrime_regulator,
            breach_regulator,
            notifier,
            health_checks: Vec::new(),
        }
    }

    pub fn register_health_check(&mut self, check: Box<dyn HealthCheck>) {
        self.health_checks.push(check);
    }

    // ── Risk assessment ──────────────────────────────────────────────────────

    /// Observe a transaction, score it, persist the assessment, and open a
    /// pending alert when review is required.
    pub fn assess_transaction(
        &self,
        txn: MonitoredTransaction,
    ) -> ComplianceResult<RiskAssessment> {
        validate_transaction(&txn)?;
        if self.store.transaction_exists(&txn.txn_id)? {
            return Err(ComplianceError::Validation(format!(
                "transaction {} already observed",
                txn.txn_id
            )));
        }

        self.store.insert_transaction(&txn)?;
        let assessment = self.run_assessment(&txn)?;
        if assessment.requires_review {
            let alert = self
                .store
                .create_alert(&assessment, SYSTEM_ACTOR, self.clock.now())?;
            log::warn!(
                "alert {} opened for txn {} (score {:.0})",
                alert.alert_id,
                txn.txn_id,
                assessment.score
            );
        }
        Ok(assessment)
    }

    /// Score an already-observed transaction again under the current
    /// configuration. History is preserved — this inserts a new assessment
    /// record and opens an alert only if none exists for the transaction.
    pub fn reassess_transaction(&self, txn_id: &str) -> ComplianceResult<RiskAssessment> {
        let txn = self
            .store
            .get_transaction(txn_id)?
            .ok_or_else(|| ComplianceError::NotFound(format!("transaction {txn_id}")))?;
        let assessment = self.run_assessment(&txn)?;
        if assessment.requires_review && self.store.alert_for_transaction(txn_id)?.is_none() {
            self.store
                .create_alert(&assessment, SYSTEM_ACTOR, self.clock.now())?;
        }
        Ok(assessment)
    }

    fn run_assessment(&self, txn: &MonitoredTransaction) -> ComplianceResult<RiskAssessment> {
        let rules = &self.config.rules;
        let lookback = rules
            .velocity_window_hours
            .max(rules.structuring_window_hours)
            // keep enough older history to form the trailing average
            * 4.0;
        let history =
            self.store
                .account_history(&txn.account_id, &txn.txn_id, txn.occurred_at, lookback)?;
        let assessment = risk::assess(txn, &history, rules, self.clock.now());
        self.store.insert_assessment(&assessment)?;
        Ok(assessment)
    }

    // ── Alert review workflow ────────────────────────────────────────────────

    pub fn list_pending_alerts(&self, limit: Option<usize>) -> ComplianceResult<Vec<Alert>> {
        let limit = limit.unwrap_or(self.config.alerts.list_default_limit);
        self.store.list_pending_alerts(limit)
    }

    /// Claim a pending alert for review. Exactly one of two racing
    /// reviewers wins; the loser gets `Conflict`. Retrying is the caller's
    /// choice — the engine does not retry.
    pub fn claim_alert(&self, alert_id: &str, reviewer_id: &ActorId) -> ComplianceResult<Alert> {
        if reviewer_id.is_empty() {
            return Err(ComplianceError::Validation("reviewer_id is empty".into()));
        }
        match self.store.claim_alert(alert_id, reviewer_id, self.clock.now())? {
            Some(alert) => {
                log::info!("alert {alert_id} claimed by {reviewer_id}");
                Ok(alert)
            }
            None => match self.store.get_alert(alert_id)? {
                None => Err(ComplianceError::NotFound(format!("alert {alert_id}"))),
                Some(alert) => Err(ComplianceError::Conflict(format!(
                    "alert {alert_id} is {}{}",
                    alert.status.as_db_str(),
                    alert
                        .reviewer_id
                        .as_deref()
                        .map(|r| format!(" (held by {r})"))
                        .unwrap_or_default()
                ))),
            },
        }
    }

    /// Record the reviewer's decision on a claimed alert. A `reported`
    /// decision files a Suspicious Matter Report with the financial-crime
    /// regulator; a failed filing is recorded for retry and the decision
    /// still commits.
    pub fn decide_alert(
        &self,
        alert_id: &str,
        reviewer_id: &ActorId,
        decision: ReviewDecision,
        notes: &str,
    ) -> ComplianceResult<Alert> {
        let alert = self
            .store
            .get_alert(alert_id)?
            .ok_or_else(|| ComplianceError::NotFound(format!("alert {alert_id}")))?;

        if alert.status != AlertStatus::UnderReview {
            return Err(ComplianceError::InvalidStateTransition {
                resource: format!("alert {alert_id}"),
                from: alert.status.as_db_str().into(),
                to: decision.final_status().as_db_str().into(),
            });
        }
        if alert.reviewer_id.as_deref() != Some(reviewer_id.as_str()) {
            return Err(ComplianceError::Conflict(format!(
                "alert {alert_id} is held by {}",
                alert.reviewer_id.as_deref().unwrap_or("nobody")
            )));
        }

        let now = self.clock.now();
        let submission_ref = if decision == ReviewDecision::Reported {
            let payload = SubmissionPayload::SuspiciousMatter {
                alert_id: alert.alert_id.clone(),
                account_id: alert.account_id.clone(),
                score: self.alert_score(&alert)?,
                notes: notes.to_string(),
            };
            match self.fincrime_regulator.submit(&payload) {
                Ok(reference) => {
                    log::info!("SMR filed for alert {alert_id}: {reference}");
                    Some(reference)
                }
                Err(e) => {
                    log::warn!("SMR filing failed for alert {alert_id}: {e}");
                    self.store.record_delivery_failure(
                        self.fincrime_regulator.name(),
                        "alert",
                        alert_id,
                        &e.to_string(),
                        now,
                    )?;
                    None
                }
            }
        } else {
            None
        };

        let updated = self
            .store
            .decide_alert(
                alert_id,
                reviewer_id,
                decision,
                notes,
                submission_ref.as_deref(),
                now,
            )?
            .ok_or_else(|| {
                ComplianceError::Conflict(format!(
                    "alert {alert_id} changed while deciding"
                ))
            })?;

        if decision == ReviewDecision::Reported {
            if let Err(e) = self.notifier.notify(
                "alert reported",
                &format!("alert {alert_id} reported by {reviewer_id}"),
            ) {
                log::warn!("notification failed for alert {alert_id}: {e}");
            }
        }
        Ok(updated)
    }

    fn alert_score(&self, alert: &Alert) -> ComplianceResult<f64> {
        let assessments = self.store.assessments_for_transaction(&alert.txn_id)?;
        Ok(assessments
            .iter()
            .find(|a| a.assessment_id == alert.assessment_id)
            .or_else(|| assessments.last())
            .map(|a| a.score)
            .unwrap_or(0.0))
    }

    // ── Incident lifecycle ───────────────────────────────────────────────────

    pub fn open_incident(
        &self,
        severity: IncidentSeverity,
        details: IncidentDetails,
        data_compromised: bool,
        actor_id: &ActorId,
    ) -> ComplianceResult<IncidentReport> {
        let incident = IncidentReport {
            incident_id: Uuid::new_v4().to_string(),
            severity,
            state: IncidentState::Open,
            details,
            detected_at: self.clock.now(),
            data_compromised,
            regulator_notified: false,
            breach_notified: false,
            regulator_ref: None,
            breach_ref: None,
            closed_at: None,
        };
        self.store.create_incident(&incident, actor_id)?;
        if severity == IncidentSeverity::Critical {
            log::warn!(
                "critical incident {} opened, notification clock running",
                incident.incident_id
            );
        }
        Ok(incident)
    }

    pub fn begin_investigation(
        &self,
        incident_id: &str,
        actor_id: &ActorId,
    ) -> ComplianceResult<IncidentReport> {
        let incident = self.require_incident(incident_id)?;
        self.transition(
            &incident,
            IncidentState::Open,
            IncidentState::Investigating,
            actor_id,
        )
    }

    /// Manual regulator filing from an active investigation. The local
    /// transition to `reported_to_regulator` completes even when delivery
    /// fails; the failure is recorded for out-of-band retry.
    pub fn notify_regulator(
        &self,
        incident_id: &str,
        actor_id: &ActorId,
    ) -> ComplianceResult<IncidentReport> {
        let incident = self.require_incident(incident_id)?;
        if incident.state != IncidentState::Investigating {
            return Err(ComplianceError::InvalidStateTransition {
                resource: format!("incident {incident_id}"),
                from: incident.state.as_db_str().into(),
                to: IncidentState::ReportedToRegulator.as_db_str().into(),
            });
        }

        let now = self.clock.now();
        let payload = SubmissionPayload::IncidentNotification {
            incident_id: incident.incident_id.clone(),
            severity: incident.severity.as_db_str().into(),
            detected_at: incident.detected_at,
        };
        match self.fincrime_regulator.submit(&payload) {
            Ok(reference) => {
                self.store
                    .mark_regulator_notified(incident_id, Some(&reference), actor_id, now)?;
            }
            Err(e) => {
                log::warn!("regulator submission failed for incident {incident_id}: {e}");
                self.store.record_delivery_failure(
                    self.fincrime_regulator.name(),
                    "incident",
                    incident_id,
                    &e.to_string(),
                    now,
                )?;
            }
        }

        self.transition(
            &incident,
            IncidentState::Investigating,
            IncidentState::ReportedToRegulator,
            actor_id,
        )
    }

    pub fn close_incident(
        &self,
        incident_id: &str,
        actor_id: &ActorId,
    ) -> ComplianceResult<IncidentReport> {
        let incident = self.require_incident(incident_id)?;
        match incident.state {
            IncidentState::Investigating | IncidentState::ReportedToRegulator => self
                .transition(&incident, incident.state, IncidentState::Closed, actor_id),
            _ => Err(ComplianceError::InvalidStateTransition {
                resource: format!("incident {incident_id}"),
                from: incident.state.as_db_str().into(),
                to: IncidentState::Closed.as_db_str().into(),
            }),
        }
    }

    /// Point-in-time deadline view. OVERDUE / DUE_SOON / ON_TRACK are
    /// derived from `now` on every call, never stored.
    pub fn incident_status(
        &self,
        incident_id: &str,
        now: DateTime<Utc>,
    ) -> ComplianceResult<IncidentStatusView> {
        let incident = self.require_incident(incident_id)?;
        Ok(IncidentStatusView::compute(
            incident,
            &self.config.incidents,
            now,
        ))
    }

    pub fn list_active_incidents(&self) -> ComplianceResult<Vec<IncidentReport>> {
        self.store.active_incidents()
    }

    fn require_incident(&self, incident_id: &str) -> ComplianceResult<IncidentReport> {
        self.store
            .get_incident(incident_id)?
            .ok_or_else(|| ComplianceError::NotFound(format!("incident {incident_id}")))
    }

    fn transition(
        &self,
        incident: &IncidentReport,
        from: IncidentState,
        to: IncidentState,
        actor_id: &str,
    ) -> ComplianceResult<IncidentReport> {
        if !from.can_transition_to(to) {
            return Err(ComplianceError::InvalidStateTransition {
                resource: format!("incident {}", incident.incident_id),
                from: from.as_db_str().into(),
                to: to.as_db_str().into(),
            });
        }
        self.store
            .transition_incident(&incident.incident_id, from, to, actor_id, self.clock.now())?
            .ok_or_else(|| {
                ComplianceError::Conflict(format!(
                    "incident {} changed while transitioning",
                    incident.incident_id
                ))
            })
    }

    // ── Audit verification ───────────────────────────────────────────────────

    /// Walk the stored chain (or a sub-range) and report every break.
    /// Read-only; findings are surfaced, never auto-corrected.
    pub fn verify_audit_log(
        &self,
        range: Option<(i64, i64)>,
    ) -> ComplianceResult<ChainVerification> {
        let entries = self.store.audit_entries(range)?;
        let anchor = match entries.first() {
            Some(first) => self
                .store
                .digest_before(first.seq)?
                .unwrap_or_else(|| GENESIS_HASH.to_string()),
            None => GENESIS_HASH.to_string(),
        };
        let report = verify_chain(&anchor, &entries);
        if !report.valid {
            log::warn!(
                "audit chain verification found {} break(s)",
                report.errors.len()
            );
        }
        Ok(report)
    }
}

fn validate_transaction(txn: &MonitoredTransaction) -> ComplianceResult<()> {
    if txn.txn_id.is_empty() || txn.account_id.is_empty() {
        return Err(ComplianceError::Validation(
            "transaction and account ids are required".into(),
        ));
    }
    if !txn.amount.is_finite() || txn.amount <= 0.0 {
        return Err(ComplianceError::Validation(format!(
            "amount {} is not a positive number",
            txn.amount
        )));
    }
    if txn.currency.is_empty() {
        return Err(ComplianceError::Validation("currency is required".into()));
    }
    Ok(())
}
