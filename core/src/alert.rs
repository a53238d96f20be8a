//! Alert review workflow.
//!
//! pending -> under_review -> {cleared | reported | false_positive}
//!
//! Claiming is the one concurrency-critical operation: exactly one reviewer
//! may hold `under_review`, enforced by a conditional update in the store
//! (zero rows affected signals the claim was lost). No alert reaches
//! `reported` without an under_review decision.

use crate::types::{ActorId, EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    Pending,
    UnderReview,
    Cleared,
    Reported,
    FalsePositive,
}

impl AlertStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::UnderReview => "under_review",
            Self::Cleared => "cleared",
            Self::Reported => "reported",
            Self::FalsePositive => "false_positive",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "under_review" => Some(Self::UnderReview),
            "cleared" => Some(Self::Cleared),
            "reported" => Some(Self::Reported),
            "false_positive" => Some(Self::FalsePositive),
            _ => None,
        }
    }
}

/// Outcome a reviewer records for a claimed alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    Cleared,
    Reported,
    FalsePositive,
}

impl ReviewDecision {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::Cleared => "cleared",
            Self::Reported => "reported",
            Self::FalsePositive => "false_positive",
        }
    }

    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "cleared" => Some(Self::Cleared),
            "reported" => Some(Self::Reported),
            "false_positive" => Some(Self::FalsePositive),
            _ => None,
        }
    }

    pub fn final_status(&self) -> AlertStatus {
        match self {
            Self::Cleared => AlertStatus::Cleared,
            Self::Reported => AlertStatus::Reported,
            Self::FalsePositive => AlertStatus::FalsePositive,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: EntityId,
    pub assessment_id: EntityId,
    pub txn_id: EntityId,
    pub account_id: EntityId,
    pub status: AlertStatus,
    pub reviewer_id: Option<ActorId>,
    pub decision: Option<ReviewDecision>,
    pub notes: Option<String>,
    /// Regulator reference once a reported alert's filing succeeded.
    pub submission_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
