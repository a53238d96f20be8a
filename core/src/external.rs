//! External collaborator interfaces — regulator submission, notification,
//! platform health. The core only ever sees these traits; wire formats and
//! credentials belong to the implementations.

use crate::types::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payloads submitted to a regulator. Typed per filing kind so callers and
/// implementations never branch on free-form JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SubmissionPayload {
    /// Suspicious Matter Report produced from a reviewed alert.
    SuspiciousMatter {
        alert_id: EntityId,
        account_id: EntityId,
        score: f64,
        notes: String,
    },
    /// Statutory incident notification (primary clock).
    IncidentNotification {
        incident_id: EntityId,
        severity: String,
        detected_at: DateTime<Utc>,
    },
    /// Data-breach notification (independent breach clock).
    DataBreachNotification {
        incident_id: EntityId,
        detected_at: DateTime<Utc>,
    },
}

/// A regulator endpoint. Two instances are injected: financial-crime
/// reporting and data-breach reporting. `submit` returns the regulator's
/// reference id; failures are recorded by the caller and retried
/// out-of-band — they never roll back local state.
pub trait RegulatorSubmitter {
    fn name(&self) -> &'static str;
    fn submit(&self, payload: &SubmissionPayload) -> anyhow::Result<String>;
}

/// Fire-and-forget operator notification. Failures are logged, never
/// propagated, and never block a compliance state transition.
pub trait Notifier {
    fn notify(&self, subject: &str, body: &str) -> anyhow::Result<()>;
}

/// Residency/health probe run at the top of each compliance cycle.
pub trait HealthCheck {
    fn name(&self) -> &'static str;
    fn check(&self) -> anyhow::Result<()>;
}

// ── Stub implementations for the headless runner ─────────────────────────────

/// Logs the payload and fabricates a reference id. Stands in for a real
/// regulator gateway in demos; tests supply their own recording doubles.
pub struct LoggingSubmitter {
    name: &'static str,
    counter: std::cell::Cell<u64>,
}

impl LoggingSubmitter {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            counter: std::cell::Cell::new(0),
        }
    }
}

impl RegulatorSubmitter for LoggingSubmitter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn submit(&self, payload: &SubmissionPayload) -> anyhow::Result<String> {
        let n = self.counter.get() + 1;
        self.counter.set(n);
        log::info!("{} submission: {payload:?}", self.name);
        Ok(format!("{}-{n:06}", self.name.to_uppercase()))
    }
}

pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, subject: &str, body: &str) -> anyhow::Result<()> {
        log::info!("notify: {subject} — {body}");
        Ok(())
    }
}
