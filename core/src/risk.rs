//! Risk scoring engine.
//!
//! `assess` is a pure function of the transaction, the account history the
//! caller supplies, and the rule configuration — it performs no I/O. The
//! caller persists the resulting assessment; assessments are never mutated,
//! a re-assessment inserts a new record.

use crate::config::RiskRuleConfig;
use crate::types::EntityId;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// Rule identifiers reported in assessments, in evaluation order.
pub const RULE_THRESHOLD: &str = "CTR_THRESHOLD";
pub const RULE_VELOCITY: &str = "VELOCITY_24H";
pub const RULE_STRUCTURING: &str = "STRUCTURING";
pub const RULE_CATEGORY: &str = "HIGH_RISK_CATEGORY";

pub const MAX_SCORE: f64 = 100.0;

/// A transaction as observed by the monitoring engine. Externally owned and
/// immutable once observed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoredTransaction {
    pub txn_id: EntityId,
    pub account_id: EntityId,
    pub amount: f64,
    pub currency: String,
    pub merchant: String,
    pub category: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub assessment_id: EntityId,
    pub txn_id: EntityId,
    pub account_id: EntityId,
    /// 0–100, sum of triggered rule weights capped at [`MAX_SCORE`].
    pub score: f64,
    pub triggered_rules: Vec<String>,
    pub requires_review: bool,
    pub assessed_at: DateTime<Utc>,
}

/// Evaluate every rule against `txn`. `history` is the account's prior
/// transactions, most recent first; the submitted transaction itself must
/// not be part of it.
pub fn assess(
    txn: &MonitoredTransaction,
    history: &[MonitoredTransaction],
    rules: &RiskRuleConfig,
    assessed_at: DateTime<Utc>,
) -> RiskAssessment {
    let mut score = 0.0;
    let mut triggered = Vec::new();

    if txn.amount >= rules.reporting_threshold {
        score += rules.threshold_weight;
        triggered.push(RULE_THRESHOLD.to_string());
    }

    if let Some(weight) = velocity_weight(txn, history, rules) {
        score += weight;
        triggered.push(RULE_VELOCITY.to_string());
    }

    if structuring_triggered(txn, history, rules) {
        score += rules.structuring_weight;
        triggered.push(RULE_STRUCTURING.to_string());
    }

    let denylisted = rules
        .merchant_denylist
        .iter()
        .any(|m| m.eq_ignore_ascii_case(&txn.merchant));
    if rules.high_risk_categories.contains(&txn.category) || denylisted {
        score += rules.category_weight;
        triggered.push(RULE_CATEGORY.to_string());
    }

    let score = score.min(MAX_SCORE);
    let requires_review = score >= rules.review_threshold;

    if requires_review {
        log::info!(
            "assessment for txn {} scored {score:.0} ({}), review required",
            txn.txn_id,
            triggered.join(",")
        );
    }

    RiskAssessment {
        assessment_id: Uuid::new_v4().to_string(),
        txn_id: txn.txn_id.clone(),
        account_id: txn.account_id.clone(),
        score,
        triggered_rules: triggered,
        requires_review,
        assessed_at,
    }
}

/// Rolling-window volume against the account's trailing average.
///
/// The window ends at the transaction's own timestamp and includes it.
/// The trailing average is taken over history older than the window; with no
/// such history there is no baseline and the rule cannot trigger.
fn velocity_weight(
    txn: &MonitoredTransaction,
    history: &[MonitoredTransaction],
    rules: &RiskRuleConfig,
) -> Option<f64> {
    let window_start = txn.occurred_at - hours(rules.velocity_window_hours);

    let mut window_sum = txn.amount.abs();
    let mut trailing_sum = 0.0;
    let mut trailing_count = 0usize;
    for prior in history {
        if prior.occurred_at > txn.occurred_at {
            continue;
        }
        if prior.occurred_at >= window_start {
            window_sum += prior.amount.abs();
        } else {
            trailing_sum += prior.amount.abs();
            trailing_count += 1;
        }
    }

    if trailing_count == 0 {
        return None;
    }
    let trailing_avg = trailing_sum / trailing_count as f64;
    if trailing_avg <= 0.0 {
        return None;
    }

    let limit = rules.velocity_multiplier * trailing_avg;
    if window_sum <= limit {
        return None;
    }

    // Weight grows with the overshoot ratio, capped.
    let ratio = window_sum / limit;
    Some((rules.velocity_weight * ratio).min(rules.velocity_weight_cap))
}

/// Several transactions just under the reporting threshold in a short
/// window — the classic pattern for dodging the threshold rule.
fn structuring_triggered(
    txn: &MonitoredTransaction,
    history: &[MonitoredTransaction],
    rules: &RiskRuleConfig,
) -> bool {
    let band_low = rules.structuring_band_fraction * rules.reporting_threshold;
    let in_band =
        |amount: f64| amount >= band_low && amount < rules.reporting_threshold;

    if !in_band(txn.amount) {
        return false;
    }

    let window_start = txn.occurred_at - hours(rules.structuring_window_hours);
    let mut count = 1; // the submitted transaction
    for prior in history {
        if prior.occurred_at > txn.occurred_at {
            continue;
        }
        if prior.occurred_at >= window_start && in_band(prior.amount) {
            count += 1;
        }
    }
    count >= rules.structuring_min_count
}

fn hours(h: f64) -> Duration {
    Duration::seconds((h * 3600.0) as i64)
}
