//! Alert review workflow tests: the claim compare-and-swap, decision
//! legality, regulator filing on `reported`, and the audit trail each
//! mutation leaves behind.

use chrono::{DateTime, TimeZone, Utc};
use compliance_core::{
    alert::{AlertStatus, ReviewDecision},
    clock::FixedClock,
    config::ComplianceConfig,
    engine::ComplianceEngine,
    error::ComplianceError,
    external::{LogNotifier, Notifier, RegulatorSubmitter, SubmissionPayload},
    risk::MonitoredTransaction,
    store::ComplianceStore,
};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()
}

/// Records every submission; can be told to fail the next N calls.
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
        Ok(format!("REF-{:03}", self.calls.borrow().len()))
    }
}

struct Harness {
    engine: ComplianceEngine,
    clock: Rc<FixedClock>,
    smr_calls: Rc<RefCell<Vec<String>>>,
    smr_fail_next: Rc<Cell<u32>>,
}

fn build() -> Harness {
    let store = ComplianceStore::in_memory().expect("open store");
    store.migrate().expect("migrate");
    let clock = Rc::new(FixedClock::new(base_time()));
    let smr_calls = Rc::new(RefCell::new(Vec::new()));
    let smr_fail_next = Rc::new(Cell::new(0));
    let engine = ComplianceEngine::new(
        store,
        ComplianceConfig::default(),
        Box::new(clock.clone()),
        Box::new(StubSubmitter {
            name: "fincrime",
            calls: smr_calls.clone(),
            fail_next: smr_fail_next.clone(),
        }),
        Box::new(StubSubmitter {
            name: "breach",
            calls: Rc::new(RefCell::new(Vec::new())),
            fail_next: Rc::new(Cell::new(0)),
        }),
        Box::new(LogNotifier),
    );
    Harness {
        engine,
        clock,
        smr_calls,
        smr_fail_next,
    }
}

/// Seed one reviewable transaction and return its alert id.
fn seed_alert(h: &Harness) -> String {
    use compliance_core::clock::Clock;
    h.engine
        .assess_transaction(MonitoredTransaction {
            txn_id: format!("txn-{}", h.engine.store.assessment_count().unwrap()),
            account_id: "acc-w".into(),
            amount: 14_000.0,
            currency: "USD".into(),
            merchant: "dealer".into(),
            category: "vehicles".into(),
            occurred_at: h.clock.now(),
        })
        .expect("assess");
    let pending = h.engine.list_pending_alerts(None).unwrap();
    pending.last().unwrap().alert_id.clone()
}

#[test]
fn claim_moves_pending_to_under_review() {
    let h = build();
    let alert_id = seed_alert(&h);

    let alert = h.engine.claim_alert(&alert_id, &"rev-1".to_string()).unwrap();

    assert_eq!(alert.status, AlertStatus::UnderReview);
    assert_eq!(alert.reviewer_id.as_deref(), Some("rev-1"));
    // alert_created + alert_claimed
    assert_eq!(
        h.engine.store.audit_count_for_resource(&alert_id).unwrap(),
        2
    );
}

/// Two claims on the same pending alert: exactly one winner, the loser
/// gets Conflict — never a validation error, never success.
#[test]
fn second_claim_loses_with_conflict() {
    let h = build();
    let alert_id = seed_alert(&h);

    h.engine.claim_alert(&alert_id, &"rev-1".to_string()).unwrap();
    let err = h
        .engine
        .claim_alert(&alert_id, &"rev-2".to_string())
        .unwrap_err();

    assert!(matches!(err, ComplianceError::Conflict(_)), "got {err:?}");
    let alert = h.engine.store.get_alert(&alert_id).unwrap().unwrap();
    assert_eq!(alert.reviewer_id.as_deref(), Some("rev-1"));
}

/// The conditional update observed from two independent connections to the
/// same database: one winner, one zero-row loser.
#[test]
fn contested_claim_across_connections() {
    let uri = "file:claim_race?mode=memory&cache=shared";
    let store_a = ComplianceStore::open(uri).unwrap();
    store_a.migrate().unwrap();
    let store_b = ComplianceStore::open(uri).unwrap();

    let clock = Rc::new(FixedClock::new(base_time()));
    let engine = ComplianceEngine::new(
        store_a,
        ComplianceConfig::default(),
        Box::new(clock.clone()),
        Box::new(StubSubmitter {
            name: "fincrime",
            calls: Rc::new(RefCell::new(Vec::new())),
            fail_next: Rc::new(Cell::new(0)),
        }),
        Box::new(StubSubmitter {
            name: "breach",
            calls: Rc::new(RefCell::new(Vec::new())),
            fail_next: Rc::new(Cell::new(0)),
        }),
        Box::new(LogNotifier),
    );
    let h = Harness {
        engine,
        clock,
        smr_calls: Rc::new(RefCell::new(Vec::new())),
        smr_fail_next: Rc::new(Cell::new(0)),
    };
    let alert_id = seed_alert(&h);

    let won_a = h
        .engine
        .store
        .claim_alert(&alert_id, "rev-a", base_time())
        .unwrap();
    let won_b = store_b.claim_alert(&alert_id, "rev-b", base_time()).unwrap();

    assert!(won_a.is_some());
    assert!(won_b.is_none(), "second connection must lose the swap");
}

#[test]
fn claim_unknown_alert_is_not_found() {
    let h = build();
    let err = h
        .engine
        .claim_alert("no-such-alert", &"rev-1".to_string())
        .unwrap_err();
    assert!(matches!(err, ComplianceError::NotFound(_)));
}

/// A decision against a pending alert is an illegal lifecycle move and
/// must leave no audit entry behind.
#[test]
fn decide_without_claim_fails_and_leaves_no_trace() {
    let h = build();
    let alert_id = seed_alert(&h);
    let before = h.engine.store.audit_count().unwrap();

    let err = h
        .engine
        .decide_alert(&alert_id, &"rev-1".to_string(), ReviewDecision::Cleared, "")
        .unwrap_err();

    assert!(
        matches!(err, ComplianceError::InvalidStateTransition { .. }),
        "got {err:?}"
    );
    assert_eq!(h.engine.store.audit_count().unwrap(), before);
    let alert = h.engine.store.get_alert(&alert_id).unwrap().unwrap();
    assert_eq!(alert.status, AlertStatus::Pending);
}

/// Someone else holds the claim: that is Conflict, not a validation error.
#[test]
fn decide_by_non_holder_is_conflict() {
    let h = build();
    let alert_id = seed_alert(&h);
    h.engine.claim_alert(&alert_id, &"rev-1".to_string()).unwrap();

    let err = h
        .engine
        .decide_alert(&alert_id, &"rev-2".to_string(), ReviewDecision::Cleared, "")
        .unwrap_err();

    assert!(matches!(err, ComplianceError::Conflict(_)), "got {err:?}");
}

#[test]
fn cleared_decision_records_notes_and_audit() {
    let h = build();
    let alert_id = seed_alert(&h);
    h.engine.claim_alert(&alert_id, &"rev-1".to_string()).unwrap();

    let alert = h
        .engine
        .decide_alert(
            &alert_id,
            &"rev-1".to_string(),
            ReviewDecision::Cleared,
            "matched an invoice",
        )
        .unwrap();

    assert_eq!(alert.status, AlertStatus::Cleared);
    assert_eq!(alert.decision, Some(ReviewDecision::Cleared));
    assert_eq!(alert.notes.as_deref(), Some("matched an invoice"));
    assert!(alert.submission_ref.is_none());
    assert!(h.smr_calls.borrow().is_empty());
    // created + claimed + decided
    assert_eq!(
        h.engine.store.audit_count_for_resource(&alert_id).unwrap(),
        3
    );
}

#[test]
fn reported_decision_files_smr_and_records_reference() {
    let h = build();
    let alert_id = seed_alert(&h);
    h.engine.claim_alert(&alert_id, &"rev-1".to_string()).unwrap();

    let alert = h
        .engine
        .decide_alert(
            &alert_id,
            &"rev-1".to_string(),
            ReviewDecision::Reported,
            "no economic rationale",
        )
        .unwrap();

    assert_eq!(alert.status, AlertStatus::Reported);
    assert_eq!(alert.submission_ref.as_deref(), Some("REF-001"));
    assert_eq!(h.smr_calls.borrow().len(), 1);
}

/// A failed filing is recorded for retry; the local decision still commits.
#[test]
fn failed_smr_submission_does_not_block_the_decision() {
    let h = build();
    let alert_id = seed_alert(&h);
    h.engine.claim_alert(&alert_id, &"rev-1".to_string()).unwrap();
    h.smr_fail_next.set(1);

    let alert = h
        .engine
        .decide_alert(
            &alert_id,
            &"rev-1".to_string(),
            ReviewDecision::Reported,
            "gateway was down",
        )
        .unwrap();

    assert_eq!(alert.status, AlertStatus::Reported);
    assert!(alert.submission_ref.is_none());
    assert_eq!(h.engine.store.unresolved_delivery_failures().unwrap(), 1);
    assert!(h.smr_calls.borrow().is_empty());
}

/// Broken notifier delivery must never surface to the reviewer.
#[test]
fn notifier_failure_is_swallowed() {
    struct FailingNotifier;
    impl Notifier for FailingNotifier {
        fn notify(&self, _subject: &str, _body: &str) -> anyhow::Result<()> {
            anyhow::bail!("smtp refused")
        }
    }

    let store = ComplianceStore::in_memory().unwrap();
    store.migrate().unwrap();
    let clock = Rc::new(FixedClock::new(base_time()));
    let engine = ComplianceEngine::new(
        store,
        ComplianceConfig::default(),
        Box::new(clock.clone()),
        Box::new(StubSubmitter {
            name: "fincrime",
            calls: Rc::new(RefCell::new(Vec::new())),
            fail_next: Rc::new(Cell::new(0)),
        }),
        Box::new(StubSubmitter {
            name: "breach",
            calls: Rc::new(RefCell::new(Vec::new())),
            fail_next: Rc::new(Cell::new(0)),
        }),
        Box::new(FailingNotifier),
    );
    let h = Harness {
        engine,
        clock,
        smr_calls: Rc::new(RefCell::new(Vec::new())),
        smr_fail_next: Rc::new(Cell::new(0)),
    };
    let alert_id = seed_alert(&h);
    h.engine.claim_alert(&alert_id, &"rev-1".to_string()).unwrap();

    let alert = h
        .engine
        .decide_alert(&alert_id, &"rev-1".to_string(), ReviewDecision::Reported, "")
        .unwrap();

    assert_eq!(alert.status, AlertStatus::Reported);
}
