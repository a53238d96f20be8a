//! Typed configuration for the compliance core.
//!
//! Scoring weights and review thresholds are independently configurable so
//! policy can tighten without code changes. Tests use the `Default` impls;
//! deployments load JSON with `ComplianceConfig::load`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComplianceConfig {
    #[serde(default)]
    pub rules: RiskRuleConfig,
    #[serde(default)]
    pub alerts: AlertPolicyConfig,
    #[serde(default)]
    pub incidents: IncidentPolicyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskRuleConfig {
    /// Statutory cash-transaction reporting threshold.
    pub reporting_threshold: f64,
    pub threshold_weight: f64,

    pub velocity_window_hours: f64,
    /// Window sum must exceed this multiple of the trailing average.
    pub velocity_multiplier: f64,
    pub velocity_weight: f64,
    pub velocity_weight_cap: f64,

    pub structuring_window_hours: f64,
    /// Lower edge of the just-under-threshold band, as a fraction of the
    /// reporting threshold.
    pub structuring_band_fraction: f64,
    pub structuring_min_count: usize,
    pub structuring_weight: f64,

    pub high_risk_categories: Vec<String>,
    pub merchant_denylist: Vec<String>,
    pub category_weight: f64,

    /// Assessments scoring at or above this require human review.
    pub review_threshold: f64,
}

impl Default for RiskRuleConfig {
    fn default() -> Self {
        Self {
            reporting_threshold: 10_000.0,
            threshold_weight: 40.0,
            velocity_window_hours: 24.0,
            velocity_multiplier: 3.0,
            velocity_weight: 25.0,
            velocity_weight_cap: 50.0,
            structuring_window_hours: 48.0,
            structuring_band_fraction: 0.9,
            structuring_min_count: 3,
            structuring_weight: 45.0,
            high_risk_categories: vec![
                "gambling".into(),
                "crypto_exchange".into(),
                "precious_metals".into(),
            ],
            merchant_denylist: Vec::new(),
            category_weight: 20.0,
            review_threshold: 40.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPolicyConfig {
    /// Alerts still pending after this many hours are surfaced by the cycle.
    pub pending_sla_hours: f64,
    pub list_default_limit: usize,
}

impl Default for AlertPolicyConfig {
    fn default() -> Self {
        Self {
            pending_sla_hours: 48.0,
            list_default_limit: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncidentPolicyConfig {
    /// Severity -> hours until mandatory regulator notification.
    pub deadline_hours: Vec<(String, f64)>,
    /// Incidents inside this many hours of a deadline are flagged due-soon.
    pub due_soon_hours: f64,
    /// Independent clock for the data-breach notification obligation.
    pub breach_notification_hours: f64,
}

impl Default for IncidentPolicyConfig {
    fn default() -> Self {
        Self {
            deadline_hours: vec![
                ("critical".into(), 72.0),
                ("high".into(), 120.0),
                ("medium".into(), 240.0),
                ("low".into(), 720.0),
            ],
            due_soon_hours: 6.0,
            breach_notification_hours: 72.0,
        }
    }
}

impl IncidentPolicyConfig {
    pub fn deadline_for(&self, severity: &str) -> f64 {
        for (sev, hours) in &self.deadline_hours {
            if sev == severity {
                return *hours;
            }
        }
        // Unknown severities get the most conservative configured deadline.
        self.deadline_hours
            .iter()
            .map(|(_, h)| *h)
            .fold(f64::INFINITY, f64::min)
    }
}

impl ComplianceConfig {
    /// Load from a JSON file. Missing sections fall back to defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: ComplianceConfig = serde_json::from_str(&content)?;
        Ok(config)
    }
}
