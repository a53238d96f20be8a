//! Compliance cycle tests: at-least-once safety, flag-based deduplication
//! of regulator notifications, SLA scanning, health checks, and cycle
//! records.

use chrono::{DateTime, TimeZone, Utc};
use compliance_core::{
    clock::{Clock, FixedClock},
    config::ComplianceConfig,
    engine::ComplianceEngine,
    external::{HealthCheck, LogNotifier, RegulatorSubmitter, SubmissionPayload},
    incident::{IncidentDetails, IncidentSeverity},
    risk::MonitoredTransaction,
    store::ComplianceStore,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 4, 7, 0, 0).unwrap()
}

struct StubSubmitter {
    name: &'static str,
    calls: Rc<RefCell<Vec<String>>>,
    fail_next: Rc<Cell<u32>>,
}

impl RegulatorSubmitter for StubSubmitter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn submit(&self, payload: &SubmissionPayload) -> anyhow::Result<String> {
        if self.fail_next.get() > 0 {
            self.fail_next.set(self.fail_next.get() - 1);
            anyhow::bail!("gateway unavailable");
        }
        self.calls.borrow_mut().push(format!("{payload:?}"));
        Ok(format!("{}-{:03}", self.name, self.calls.borrow().len()))
    }
}

struct Harness {
    engine: ComplianceEngine,
    clock: Rc<FixedClock>,
    fincrime_calls: Rc<RefCell<Vec<String>>>,
    fincrime_fail_next: Rc<Cell<u32>>,
    breach_calls: Rc<RefCell<Vec<String>>>,
}

fn build() -> Harness {
    let store = ComplianceStore::in_memory().expect("open store");
    store.migrate().expect("migrate");
    let clock = Rc::new(FixedClock::new(base_time()));
    let fincrime_calls = Rc::new(RefCell::new(Vec::new()));
    let fincrime_fail_next = Rc::new(Cell::new(0));
    let breach_calls = Rc::new(RefCell::new(Vec::new()));
    let engine = ComplianceEngine::new(
        store,
        ComplianceConfig::default(),
        Box::new(clock.clone()),
        Box::new(StubSubmitter {
            name: "fincrime",
            calls: fincrime_calls.clone(),
            fail_next: fincrime_fail_next.clone(),
        }),
        Box::new(StubSubmitter {
            name: "breach",
            calls: breach_calls.clone(),
            fail_next: Rc::new(Cell::new(0)),
        }),
        Box::new(LogNotifier),
    );
    Harness {
        engine,
        clock,
        fincrime_calls,
        fincrime_fail_next,
        breach_calls,
    }
}

fn open_overdue_critical(h: &Harness, data_compromised: bool) -> String {
    let id = h
        .engine
        .open_incident(
            IncidentSeverity::Critical,
            IncidentDetails::SystemOutage {
                component: "core-banking".into(),
                description: "ledger unavailable".into(),
            },
            data_compromised,
            &"ops".to_string(),
        )
        .unwrap()
        .incident_id;
    h.clock.advance_hours(73);
    id
}

/// Two rapid cycles over the same overdue incident: the regulator sees one
/// submission; the second cycle observes the recorded flag and stays quiet.
#[test]
fn overdue_notification_happens_exactly_once() {
    let h = build();
    let id = open_overdue_critical(&h, false);

    let first = h.engine.run_compliance_cycle(h.clock.now()).unwrap();
    let second = h.engine.run_compliance_cycle(h.clock.now()).unwrap();

    assert_eq!(first.overdue_incidents, vec![id.clone()]);
    assert_eq!(first.regulator_notifications, 1);
    assert_eq!(second.regulator_notifications, 0);
    assert_eq!(second.overdue_incidents, vec![id.clone()]);
    assert_eq!(h.fincrime_calls.borrow().len(), 1);

    let incident = h.engine.store.get_incident(&id).unwrap().unwrap();
    assert!(incident.regulator_notified);
    assert!(incident.regulator_ref.is_some());
}

#[test]
fn breach_notification_deduplicated_on_its_own_flag() {
    let h = build();
    let id = open_overdue_critical(&h, true);

    let first = h.engine.run_compliance_cycle(h.clock.now()).unwrap();
    let second = h.engine.run_compliance_cycle(h.clock.now()).unwrap();

    assert_eq!(first.breach_notifications, 1);
    assert_eq!(second.breach_notifications, 0);
    assert_eq!(h.breach_calls.borrow().len(), 1);

    let incident = h.engine.store.get_incident(&id).unwrap().unwrap();
    assert!(incident.breach_notified);
    assert!(incident.regulator_notified);
}

/// A failed submission leaves the flag clear so the next cycle retries it;
/// the failure itself is recorded for operators.
#[test]
fn failed_submission_is_recorded_and_retried() {
    let h = build();
    let id = open_overdue_critical(&h, false);
    h.fincrime_fail_next.set(1);

    let first = h.engine.run_compliance_cycle(h.clock.now()).unwrap();
    assert_eq!(first.regulator_notifications, 0);
    assert_eq!(first.delivery_failures, 1);
    assert_eq!(h.engine.store.unresolved_delivery_failures().unwrap(), 1);
    let incident = h.engine.store.get_incident(&id).unwrap().unwrap();
    assert!(!incident.regulator_notified);

    let second = h.engine.run_compliance_cycle(h.clock.now()).unwrap();
    assert_eq!(second.regulator_notifications, 1);
    assert_eq!(h.fincrime_calls.borrow().len(), 1);
}

#[test]
fn on_track_incident_is_left_alone() {
    let h = build();
    h.engine
        .open_incident(
            IncidentSeverity::Critical,
            IncidentDetails::SystemOutage {
                component: "mobile".into(),
                description: "degraded".into(),
            },
            false,
            &"ops".to_string(),
        )
        .unwrap();

    let summary = h.engine.run_compliance_cycle(h.clock.now()).unwrap();

    assert!(summary.overdue_incidents.is_empty());
    assert_eq!(summary.regulator_notifications, 0);
    assert!(h.fincrime_calls.borrow().is_empty());
}

#[test]
fn stale_pending_alerts_are_surfaced() {
    let h = build();
    h.engine
        .assess_transaction(MonitoredTransaction {
            txn_id: "txn-stale".into(),
            account_id: "acc-s".into(),
            amount: 13_000.0,
            currency: "USD".into(),
            merchant: "dealer".into(),
            category: "vehicles".into(),
            occurred_at: h.clock.now(),
        })
        .unwrap();

    // Inside the 48h SLA: nothing to report.
    let fresh = h.engine.run_compliance_cycle(h.clock.now()).unwrap();
    assert!(fresh.stale_alerts.is_empty());
    assert_eq!(fresh.pending_alerts, 1);

    h.clock.advance_hours(49);
    let stale = h.engine.run_compliance_cycle(h.clock.now()).unwrap();
    assert_eq!(stale.stale_alerts.len(), 1);
}

#[test]
fn health_findings_are_reported_per_check() {
    struct Healthy;
    impl HealthCheck for Healthy {
        fn name(&self) -> &'static str {
            "data-residency"
        }
        fn check(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }
    struct Broken;
    impl HealthCheck for Broken {
        fn name(&self) -> &'static str {
            "regulator-endpoint"
        }
        fn check(&self) -> anyhow::Result<()> {
            anyhow::bail!("tls handshake failed")
        }
    }

    let mut h = build();
    h.engine.register_health_check(Box::new(Healthy));
    h.engine.register_health_check(Box::new(Broken));

    let summary = h.engine.run_compliance_cycle(h.clock.now()).unwrap();

    assert_eq!(summary.health.len(), 2);
    assert!(summary.health[0].healthy);
    assert!(!summary.health[1].healthy);
    assert_eq!(summary.health[1].name, "regulator-endpoint");
    assert!(summary.health[1].detail.as_deref().unwrap().contains("tls"));
}

/// Cycles are themselves records: each run inserts exactly one summary row.
#[test]
fn every_cycle_is_recorded() {
    let h = build();
    h.engine.run_compliance_cycle(h.clock.now()).unwrap();
    h.clock.advance_hours(1);
    h.engine.run_compliance_cycle(h.clock.now()).unwrap();

    assert_eq!(h.engine.store.cycle_count().unwrap(), 2);
}

/// The cycle never rewrites history: a fully processed incident keeps its
/// audit trail intact and verifiable.
#[test]
fn cycle_activity_keeps_the_audit_chain_valid() {
    let h = build();
    open_overdue_critical(&h, true);
    h.engine.run_compliance_cycle(h.clock.now()).unwrap();
    h.engine.run_compliance_cycle(h.clock.now()).unwrap();

    let report = h.engine.verify_audit_log(None).unwrap();
    assert!(report.valid, "breaks: {:?}", report.errors);
    // incident_opened + regulator_notified + breach_notified
    assert_eq!(report.checked, 3);
}
