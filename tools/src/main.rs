//! compliance-runner: headless driver for the compliance monitoring core.
//!
//! Usage:
//!   compliance-runner --db compliance.db
//!   compliance-runner --db compliance.db --config config.json
//!
//! Seeds a demonstration workload (a threshold breach, a structuring
//! cluster, a critical incident), walks it through review and the
//! compliance cycle, then verifies the audit chain and prints a summary.

use anyhow::Result;
use chrono::{Duration, Utc};
use compliance_core::{
    alert::ReviewDecision,
    clock::{Clock, FixedClock},
    config::ComplianceConfig,
    engine::ComplianceEngine,
    external::{LogNotifier, LoggingSubmitter},
    incident::{IncidentDetails, IncidentSeverity},
    risk::MonitoredTransaction,
    store::ComplianceStore,
};
use std::env;
use std::rc::Rc;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let config_path = args
        .windows(2)
        .find(|w| w[0] == "--config")
        .map(|w| w[1].as_str());

    println!("compliance-runner");
    println!("  db:     {db}");
    println!("  config: {}", config_path.unwrap_or("(defaults)"));
    println!();

    let config = match config_path {
        Some(path) => ComplianceConfig::load(path)?,
        None => ComplianceConfig::default(),
    };

    let store = ComplianceStore::open(db)?;
    store.migrate()?;

    // A pinned clock so the demo can fast-forward past statutory deadlines.
    let clock = Rc::new(FixedClock::new(Utc::now()));
    let engine = ComplianceEngine::new(
        store,
        config,
        Box::new(clock.clone()),
        Box::new(LoggingSubmitter::new("fincrime-gateway")),
        Box::new(LoggingSubmitter::new("breach-gateway")),
        Box::new(LogNotifier),
    );

    seed_transactions(&engine, &clock)?;
    review_first_alert(&engine)?;
    run_incident_demo(&engine, &clock)?;

    print_summary(&engine)?;
    Ok(())
}

fn seed_transactions(engine: &ComplianceEngine, clock: &Rc<FixedClock>) -> Result<()> {
    let now = clock.now();
    let mut txns = vec![
        txn("acc-001", 120.0, "grocer", "groceries", now - Duration::hours(30)),
        txn("acc-001", 90.0, "cafe", "dining", now - Duration::hours(28)),
        // Single transaction over the reporting threshold.
        txn("acc-001", 12_000.0, "auto-dealer", "vehicles", now - Duration::hours(2)),
    ];
    // Structuring cluster: five deposits just under the threshold in an hour.
    for i in 0..5 {
        txns.push(txn(
            "acc-002",
            9_500.0,
            "branch-cash",
            "cash_deposit",
            now - Duration::minutes(60 - i * 10),
        ));
    }

    for t in txns {
        let assessment = engine.assess_transaction(t)?;
        println!(
            "  assessed {:<12} score {:>5.1}  rules [{}]",
            assessment.txn_id,
            assessment.score,
            assessment.triggered_rules.join(", ")
        );
    }
    println!();
    Ok(())
}

fn review_first_alert(engine: &ComplianceEngine) -> Result<()> {
    let pending = engine.list_pending_alerts(None)?;
    println!("  {} pending alert(s)", pending.len());
    if let Some(first) = pending.first() {
        let claimed = engine.claim_alert(&first.alert_id, &"demo-reviewer".to_string())?;
        let decided = engine.decide_alert(
            &claimed.alert_id,
            &"demo-reviewer".to_string(),
            ReviewDecision::Reported,
            "confirmed threshold breach, SMR filed",
        )?;
        println!(
            "  alert {} -> {} (submission {})",
            decided.alert_id,
            decided.status.as_db_str(),
            decided.submission_ref.as_deref().unwrap_or("pending")
        );
    }
    println!();
    Ok(())
}

fn run_incident_demo(engine: &ComplianceEngine, clock: &Rc<FixedClock>) -> Result<()> {
    let incident = engine.open_incident(
        IncidentSeverity::Critical,
        IncidentDetails::DataBreach {
            records_exposed: 1_200,
            systems: vec!["customer-db".into()],
        },
        true,
        &"ops-lead".to_string(),
    )?;
    engine.begin_investigation(&incident.incident_id, &"ops-lead".to_string())?;

    // Fast-forward past the 72-hour notification deadline.
    clock.advance_hours(73);

    let first = engine.run_compliance_cycle(clock.now())?;
    println!(
        "  cycle 1: {} overdue, {} regulator + {} breach notification(s)",
        first.overdue_incidents.len(),
        first.regulator_notifications,
        first.breach_notifications
    );
    // A second firing must observe the recorded flags and stay quiet.
    let second = engine.run_compliance_cycle(clock.now())?;
    println!(
        "  cycle 2: {} regulator + {} breach notification(s) (deduplicated)",
        second.regulator_notifications, second.breach_notifications
    );
    println!();
    Ok(())
}

fn print_summary(engine: &ComplianceEngine) -> Result<()> {
    let verification = engine.verify_audit_log(None)?;

    println!("=== RUN SUMMARY ===");
    println!("  assessments:    {}", engine.store.assessment_count()?);
    println!("  pending alerts: {}", engine.store.pending_alert_count()?);
    println!("  incidents:      {}", engine.store.incident_count()?);
    println!("  cycles:         {}", engine.store.cycle_count()?);
    println!("  audit entries:  {}", engine.store.audit_count()?);
    println!(
        "  audit chain:    {}",
        if verification.valid {
            "intact".to_string()
        } else {
            format!("{} break(s)", verification.errors.len())
        }
    );
    Ok(())
}

fn txn(
    account: &str,
    amount: f64,
    merchant: &str,
    category: &str,
    occurred_at: chrono::DateTime<Utc>,
) -> MonitoredTransaction {
    MonitoredTransaction {
        txn_id: format!("txn-{}", uuid_suffix()),
        account_id: account.to_string(),
        amount,
        currency: "USD".into(),
        merchant: merchant.into(),
        category: category.into(),
        occurred_at,
    }
}

fn uuid_suffix() -> String {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    format!("{:04}", COUNTER.fetch_add(1, Ordering::Relaxed))
}
