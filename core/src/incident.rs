//! Incident lifecycle manager.
//!
//! open -> investigating -> {reported_to_regulator, closed}
//! reported_to_regulator -> closed
//!
//! Each incident runs a severity-keyed notification clock from
//! `detected_at`; incidents flagged `data_compromised` additionally run an
//! independent breach clock with its own reporting target. OVERDUE,
//! DUE_SOON and ON_TRACK are derived at query time from the supplied `now`,
//! never stored. Closed incidents are kept forever.

use crate::config::IncidentPolicyConfig;
use crate::types::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IncidentSeverity {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentState {
    Open,
    Investigating,
    ReportedToRegulator,
    Closed,
}

impl IncidentState {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Investigating => "investigating",
            Self::ReportedToRegulator => "reported_to_regulator",
            Self::Closed => "closed",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "investigating" => Some(Self::Investigating),
            "reported_to_regulator" => Some(Self::ReportedToRegulator),
            "closed" => Some(Self::Closed),
            _ => None,
        }
    }

    pub fn can_transition_to(&self, to: IncidentState) -> bool {
        matches!(
            (self, to),
            (Self::Open, IncidentState::Investigating)
                | (Self::Investigating, IncidentState::ReportedToRegulator)
                | (Self::Investigating, IncidentState::Closed)
                | (Self::ReportedToRegulator, IncidentState::Closed)
        )
    }
}

/// Typed detail payload per incident kind, validated at the boundary.
/// The lifecycle manager never branches on untyped JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IncidentDetails {
    SuspiciousActivity {
        account_id: EntityId,
        summary: String,
    },
    DataBreach {
        records_exposed: u64,
        systems: Vec<String>,
    },
    SystemOutage {
        component: String,
        description: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentReport {
    pub incident_id: EntityId,
    pub severity: IncidentSeverity,
    pub state: IncidentState,
    pub details: IncidentDetails,
    pub detected_at: DateTime<Utc>,
    pub data_compromised: bool,
    /// Regulator A (financial crime) notification recorded.
    pub regulator_notified: bool,
    /// Regulator B (data breach) notification recorded.
    pub breach_notified: bool,
    pub regulator_ref: Option<String>,
    pub breach_ref: Option<String>,
    pub closed_at: Option<DateTime<Utc>>,
}

/// Derived, never stored; recomputed from `now` on every query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadlineStatus {
    OnTrack,
    DueSoon,
    Overdue,
}

/// Hours left on a clock of `deadline_hours` started at `detected_at`.
/// Negative when the deadline has passed.
pub fn time_remaining_hours(
    detected_at: DateTime<Utc>,
    deadline_hours: f64,
    now: DateTime<Utc>,
) -> f64 {
    let elapsed_hours = (now - detected_at).num_seconds() as f64 / 3600.0;
    deadline_hours - elapsed_hours
}

pub fn deadline_status(remaining_hours: f64, due_soon_hours: f64) -> DeadlineStatus {
    if remaining_hours < 0.0 {
        DeadlineStatus::Overdue
    } else if remaining_hours < due_soon_hours {
        DeadlineStatus::DueSoon
    } else {
        DeadlineStatus::OnTrack
    }
}

/// Point-in-time view of both clocks for a status query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentStatusView {
    pub incident: IncidentReport,
    pub time_remaining_hours: f64,
    pub deadline: DeadlineStatus,
    /// Present only when `data_compromised` is set.
    pub breach_time_remaining_hours: Option<f64>,
    pub breach_deadline: Option<DeadlineStatus>,
}

impl IncidentStatusView {
    pub fn compute(
        incident: IncidentReport,
        policy: &IncidentPolicyConfig,
        now: DateTime<Utc>,
    ) -> Self {
        let deadline_hours = policy.deadline_for(incident.severity.as_db_str());
        let remaining = time_remaining_hours(incident.detected_at, deadline_hours, now);
        let deadline = deadline_status(remaining, policy.due_soon_hours);

        let (breach_remaining, breach_deadline) = if incident.data_compromised {
            let r = time_remaining_hours(
                incident.detected_at,
                policy.breach_notification_hours,
                now,
            );
            (Some(r), Some(deadline_status(r, policy.due_soon_hours)))
        } else {
            (None, None)
        };

        Self {
            incident,
            time_remaining_hours: remaining,
            deadline,
            breach_time_remaining_hours: breach_remaining,
            breach_deadline,
        }
    }
}
