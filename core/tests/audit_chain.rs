//! Hash-chained audit log tests: chain construction through engine
//! operations, exhaustive tamper detection, and range verification.
//!
//! Tampering is done through a second raw connection to the same
//! shared-cache database — the store itself exposes no update or delete on
//! the audit log, and that is the point.

use chrono::{TimeZone, Utc};
use compliance_core::{
    alert::ReviewDecision,
    audit::{BreakKind, GENESIS_HASH},
    clock::FixedClock,
    config::ComplianceConfig,
    engine::ComplianceEngine,
    external::{LogNotifier, LoggingSubmitter},
    incident::{IncidentDetails, IncidentSeverity},
    risk::MonitoredTransaction,
    store::ComplianceStore,
};
use std::rc::Rc;

fn shared_db_uri(name: &str) -> String {
    format!("file:{name}?mode=memory&cache=shared")
}

fn build_engine(db_uri: &str) -> (ComplianceEngine, Rc<FixedClock>) {
    let store = ComplianceStore::open(db_uri).expect("open store");
    store.migrate().expect("migrate");
    let clock = Rc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    ));
    let engine = ComplianceEngine::new(
        store,
        ComplianceConfig::default(),
        Box::new(clock.clone()),
        Box::new(LoggingSubmitter::new("fincrime")),
        Box::new(LoggingSubmitter::new("breach")),
        Box::new(LogNotifier),
    );
    (engine, clock)
}

fn big_txn(id: &str, clock: &FixedClock) -> MonitoredTransaction {
    use compliance_core::clock::Clock;
    MonitoredTransaction {
        txn_id: id.to_string(),
        account_id: "acc-audit".into(),
        amount: 15_000.0,
        currency: "USD".into(),
        merchant: "dealer".into(),
        category: "vehicles".into(),
        occurred_at: clock.now(),
    }
}

/// Drive several audited operations so the chain has real entries.
fn populate(engine: &ComplianceEngine, clock: &Rc<FixedClock>) {
    for i in 0..3 {
        clock.advance_minutes(5);
        engine
            .assess_transaction(big_txn(&format!("txn-a{i}"), clock))
            .expect("assess");
    }
    let pending = engine.list_pending_alerts(None).unwrap();
    let reviewer = "rev-1".to_string();
    let alert = engine.claim_alert(&pending[0].alert_id, &reviewer).unwrap();
    engine
        .decide_alert(&alert.alert_id, &reviewer, ReviewDecision::Cleared, "ok")
        .unwrap();

    let incident = engine
        .open_incident(
            IncidentSeverity::High,
            IncidentDetails::SystemOutage {
                component: "payment-gateway".into(),
                description: "elevated error rate".into(),
            },
            false,
            &"ops".to_string(),
        )
        .unwrap();
    engine
        .begin_investigation(&incident.incident_id, &"ops".to_string())
        .unwrap();
}

#[test]
fn untouched_chain_verifies() {
    let (engine, clock) = build_engine(&shared_db_uri("audit_clean"));
    populate(&engine, &clock);

    let report = engine.verify_audit_log(None).unwrap();
    assert!(report.valid, "expected a valid chain, got {:?}", report.errors);
    assert!(report.errors.is_empty());
    assert!(
        report.checked >= 7,
        "expected at least 7 audited operations, checked {}",
        report.checked
    );
}

#[test]
fn first_entry_links_to_genesis() {
    let (engine, clock) = build_engine(&shared_db_uri("audit_genesis"));
    populate(&engine, &clock);

    let entries = engine.store.audit_entries(None).unwrap();
    assert_eq!(entries[0].prev_hash, GENESIS_HASH);
    // Each entry links to the stored digest of its predecessor.
    for pair in entries.windows(2) {
        assert_eq!(pair[1].prev_hash, pair[0].digest);
    }
}

#[test]
fn tampered_field_flags_entry_and_everything_after() {
    let uri = shared_db_uri("audit_tamper");
    let (engine, clock) = build_engine(&uri);
    populate(&engine, &clock);

    let total = engine.store.audit_count().unwrap();
    assert!(total >= 5);
    let target_seq = 3i64;

    // Out-of-band edit, exactly what verify exists to catch.
    let raw = rusqlite::Connection::open_with_flags(
        &uri,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_URI,
    )
    .unwrap();
    raw.execute(
        "UPDATE audit_log SET detail = '{\"score\":0.0}' WHERE seq = ?1",
        [target_seq],
    )
    .unwrap();

    let report = engine.verify_audit_log(None).unwrap();
    assert!(!report.valid);

    let mismatch_seqs: Vec<i64> = report
        .errors
        .iter()
        .filter(|e| e.kind == BreakKind::DigestMismatch)
        .map(|e| e.seq)
        .collect();
    assert_eq!(mismatch_seqs, vec![target_seq]);

    // Everything downstream of the break is unverifiable.
    let unverifiable: Vec<i64> = report
        .errors
        .iter()
        .filter(|e| e.kind == BreakKind::Unverifiable)
        .map(|e| e.seq)
        .collect();
    let expected: Vec<i64> = (target_seq + 1..=total).collect();
    assert_eq!(unverifiable, expected);
}

#[test]
fn rewritten_digest_breaks_the_link() {
    let uri = shared_db_uri("audit_relink");
    let (engine, clock) = build_engine(&uri);
    populate(&engine, &clock);

    // An attacker who recomputes entry 2's digest still cannot fix entry
    // 3's stored prev_hash.
    let raw = rusqlite::Connection::open_with_flags(
        &uri,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_URI,
    )
    .unwrap();
    raw.execute("UPDATE audit_log SET digest = 'feedface' WHERE seq = 2", [])
        .unwrap();

    let report = engine.verify_audit_log(None).unwrap();
    assert!(!report.valid);
    assert!(report
        .errors
        .iter()
        .any(|e| e.seq == 2 && e.kind == BreakKind::DigestMismatch));
    assert!(report
        .errors
        .iter()
        .any(|e| e.seq == 3 && e.kind == BreakKind::LinkMismatch));
}

#[test]
fn mid_chain_range_verifies_against_stored_anchor() {
    let (engine, clock) = build_engine(&shared_db_uri("audit_range"));
    populate(&engine, &clock);

    let total = engine.store.audit_count().unwrap();
    let report = engine.verify_audit_log(Some((3, total))).unwrap();
    assert!(
        report.valid,
        "range anchored mid-chain should verify, got {:?}",
        report.errors
    );
    assert_eq!(report.checked as i64, total - 2);
}

#[test]
fn verification_is_exhaustive_not_fail_fast() {
    let uri = shared_db_uri("audit_multi");
    let (engine, clock) = build_engine(&uri);
    populate(&engine, &clock);

    let raw = rusqlite::Connection::open_with_flags(
        &uri,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE | rusqlite::OpenFlags::SQLITE_OPEN_URI,
    )
    .unwrap();
    raw.execute("UPDATE audit_log SET actor_id = 'mallory' WHERE seq = 2", [])
        .unwrap();
    raw.execute("UPDATE audit_log SET actor_id = 'mallory' WHERE seq = 4", [])
        .unwrap();

    let report = engine.verify_audit_log(None).unwrap();
    let mismatch_seqs: Vec<i64> = report
        .errors
        .iter()
        .filter(|e| e.kind == BreakKind::DigestMismatch)
        .map(|e| e.seq)
        .collect();
    // Both independent corruptions reported in one pass.
    assert_eq!(mismatch_seqs, vec![2, 4]);
}
