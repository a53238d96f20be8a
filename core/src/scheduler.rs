//! The compliance cycle — periodic driver over alerts and incidents.
//!
//! Designed for at-least-once invocation: overlapping cron firings or a
//! retry after a crash must not double-report. Deduplication is by the
//! notification flags recorded on each incident (checked before acting and
//! set conditionally in the store), never by a lock.

use crate::{
    engine::ComplianceEngine,
    error::ComplianceResult,
    external::SubmissionPayload,
    incident::{DeadlineStatus, IncidentReport, IncidentStatusView},
    types::EntityId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Actor recorded for mutations the cycle makes.
pub const SCHEDULER_ACTOR: &str = "scheduler";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthFinding {
    pub name: String,
    pub healthy: bool,
    pub detail: Option<String>,
}

/// One cycle's outcome: counts plus the ids an operator should act on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CycleSummary {
    pub ran_at: DateTime<Utc>,
    pub health: Vec<HealthFinding>,
    pub pending_alerts: i64,
    /// Pending alerts older than the review SLA.
    pub stale_alerts: Vec<EntityId>,
    pub open_incidents: i64,
    pub due_soon_incidents: Vec<EntityId>,
    pub overdue_incidents: Vec<EntityId>,
    /// Incidents overdue on the independent breach clock.
    pub breach_overdue_incidents: Vec<EntityId>,
    pub regulator_notifications: u32,
    pub breach_notifications: u32,
    pub delivery_failures: u32,
}

impl ComplianceEngine {
    /// Run one compliance cycle at `now`. Safe to invoke repeatedly or
    /// concurrently across instances; re-running neither double-counts nor
    /// double-reports.
    pub fn run_compliance_cycle(&self, now: DateTime<Utc>) -> ComplianceResult<CycleSummary> {
        // 1. Residency/health checks, delegated to collaborators.
        let mut health = Vec::new();
        for check in &self.health_checks {
            match check.check() {
                Ok(()) => health.push(HealthFinding {
                    name: check.name().into(),
                    healthy: true,
                    detail: None,
                }),
                Err(e) => {
                    log::warn!("health check {} failed: {e}", check.name());
                    health.push(HealthFinding {
                        name: check.name().into(),
                        healthy: false,
                        detail: Some(e.to_string()),
                    });
                }
            }
        }

        // 2. Alerts still pending past the review SLA.
        let pending_alerts = self.store.pending_alert_count()?;
        let cutoff = now
            - chrono::Duration::seconds((self.config.alerts.pending_sla_hours * 3600.0) as i64);
        let stale_alerts: Vec<EntityId> = self
            .store
            .pending_alerts_older_than(cutoff)?
            .into_iter()
            .map(|a| a.alert_id)
            .collect();
        if !stale_alerts.is_empty() {
            log::warn!("{} alert(s) pending past SLA", stale_alerts.len());
        }

        // 3. Incident deadline scan and deduplicated notifications.
        let incidents = self.store.active_incidents()?;
        let open_incidents = incidents.len() as i64;
        let mut due_soon_incidents = Vec::new();
        let mut overdue_incidents = Vec::new();
        let mut breach_overdue_incidents = Vec::new();
        let mut regulator_notifications = 0u32;
        let mut breach_notifications = 0u32;
        let mut delivery_failures = 0u32;

        for incident in incidents {
            let IncidentStatusView {
                incident,
                deadline,
                breach_deadline,
                ..
            } = IncidentStatusView::compute(incident, &self.config.incidents, now);

            match deadline {
                DeadlineStatus::DueSoon => due_soon_incidents.push(incident.incident_id.clone()),
                DeadlineStatus::Overdue => overdue_incidents.push(incident.incident_id.clone()),
                DeadlineStatus::OnTrack => {}
            }
            if breach_deadline == Some(DeadlineStatus::Overdue) {
                breach_overdue_incidents.push(incident.incident_id.clone());
            }

            if deadline == DeadlineStatus::Overdue && !incident.regulator_notified {
                match self.submit_incident_notification(&incident, now)? {
                    SubmissionOutcome::Recorded => regulator_notifications += 1,
                    SubmissionOutcome::AlreadyRecorded => {}
                    SubmissionOutcome::Failed => delivery_failures += 1,
                }
            }

            if breach_deadline == Some(DeadlineStatus::Overdue) && !incident.breach_notified {
                match self.submit_breach_notification(&incident, now)? {
                    SubmissionOutcome::Recorded => breach_notifications += 1,
                    SubmissionOutcome::AlreadyRecorded => {}
                    SubmissionOutcome::Failed => delivery_failures += 1,
                }
            }
        }

        if !overdue_incidents.is_empty() {
            if let Err(e) = self.notifier.notify(
                "incidents overdue",
                &format!("{} incident(s) past deadline", overdue_incidents.len()),
            ) {
                log::warn!("cycle notification failed: {e}");
            }
        }

        let summary = CycleSummary {
            ran_at: now,
            health,
            pending_alerts,
            stale_alerts,
            open_incidents,
            due_soon_incidents,
            overdue_incidents,
            breach_overdue_incidents,
            regulator_notifications,
            breach_notifications,
            delivery_failures,
        };
        self.store.insert_cycle_summary(&summary)?;

        log::info!(
            "cycle at {}: {} pending alert(s), {} stale, {} open incident(s), \
             {} overdue, {} notification(s) sent",
            summary.ran_at.to_rfc3339(),
            summary.pending_alerts,
            summary.stale_alerts.len(),
            summary.open_incidents,
            summary.overdue_incidents.len(),
            summary.regulator_notifications + summary.breach_notifications
        );
        Ok(summary)
    }

    fn submit_incident_notification(
        &self,
        incident: &IncidentReport,
        now: DateTime<Utc>,
    ) -> ComplianceResult<SubmissionOutcome> {
        let payload = SubmissionPayload::IncidentNotification {
            incident_id: incident.incident_id.clone(),
            severity: incident.severity.as_db_str().into(),
            detected_at: incident.detected_at,
        };
        match self.fincrime_regulator.submit(&payload) {
            Ok(reference) => {
                // Conditional on the flag: if a concurrent cycle recorded
                // first, this records nothing.
                let recorded = self.store.mark_regulator_notified(
                    &incident.incident_id,
                    Some(&reference),
                    SCHEDULER_ACTOR,
                    now,
                )?;
                if recorded {
                    log::warn!(
                        "overdue incident {} reported to regulator: {reference}",
                        incident.incident_id
                    );
                    Ok(SubmissionOutcome::Recorded)
                } else {
                    Ok(SubmissionOutcome::AlreadyRecorded)
                }
            }
            Err(e) => {
                log::warn!(
                    "regulator submission failed for incident {}: {e}",
                    incident.incident_id
                );
                self.store.record_delivery_failure(
                    self.fincrime_regulator.name(),
                    "incident",
                    &incident.incident_id,
                    &e.to_string(),
                    now,
                )?;
                Ok(SubmissionOutcome::Failed)
            }
        }
    }

    fn submit_breach_notification(
        &self,
        incident: &IncidentReport,
        now: DateTime<Utc>,
    ) -> ComplianceResult<SubmissionOutcome> {
        let payload = SubmissionPayload::DataBreachNotification {
            incident_id: incident.incident_id.clone(),
            detected_at: incident.detected_at,
        };
        match self.breach_regulator.submit(&payload) {
            Ok(reference) => {
                let recorded = self.store.mark_breach_notified(
                    &incident.incident_id,
                    Some(&reference),
                    SCHEDULER_ACTOR,
                    now,
                )?;
                if recorded {
                    log::warn!(
                        "breach notification filed for incident {}: {reference}",
                        incident.incident_id
                    );
                    Ok(SubmissionOutcome::Recorded)
                } else {
                    Ok(SubmissionOutcome::AlreadyRecorded)
                }
            }
            Err(e) => {
                log::warn!(
                    "breach submission failed for incident {}: {e}",
                    incident.incident_id
                );
                self.store.record_delivery_failure(
                    self.breach_regulator.name(),
                    "incident",
                    &incident.incident_id,
                    &e.to_string(),
                    now,
                )?;
                Ok(SubmissionOutcome::Failed)
            }
        }
    }
}

enum SubmissionOutcome {
    Recorded,
    AlreadyRecorded,
    Failed,
}
