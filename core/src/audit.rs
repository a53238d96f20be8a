//! Hash-chained audit log — tamper evidence for compliance records.
//!
//! Every entry commits to its predecessor's digest. Appending is the only
//! mutation the API offers; if storage is edited out-of-band, `verify_chain`
//! is the detection mechanism. Verification is exhaustive: it collects every
//! break it finds instead of stopping at the first, so an operator sees the
//! full extent of corruption in one pass.

use crate::types::{ActorId, EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// prev_hash of the very first entry in the chain.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// Operations recorded in the audit trail. Stored as text; variants are
/// added over time, never removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    AlertCreated,
    AlertClaimed,
    AlertDecided,
    IncidentOpened,
    IncidentStateChanged,
    RegulatorNotified,
    BreachNotified,
}

impl AuditOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AlertCreated => "alert_created",
            Self::AlertClaimed => "alert_claimed",
            Self::AlertDecided => "alert_decided",
            Self::IncidentOpened => "incident_opened",
            Self::IncidentStateChanged => "incident_state_changed",
            Self::RegulatorNotified => "regulator_notified",
            Self::BreachNotified => "breach_notified",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Assigned by storage, strictly increasing.
    pub seq: i64,
    pub operation: String,
    pub actor_id: ActorId,
    pub resource_type: String,
    pub resource_id: EntityId,
    /// JSON detail payload (before/after state, references).
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
    pub prev_hash: String,
    pub digest: String,
}

/// Canonical digest over an entry's fields plus the previous digest.
///
/// The serialization is a serde_json map, which sorts keys, so the bytes are
/// reproducible across implementations regardless of field declaration
/// order or locale. `seq` is excluded — storage assigns it at insert time;
/// ordering integrity comes from the prev_hash linkage.
pub fn chain_digest(
    operation: &str,
    actor_id: &str,
    resource_type: &str,
    resource_id: &str,
    detail: &str,
    recorded_at: &str,
    prev_hash: &str,
) -> String {
    let canonical = serde_json::json!({
        "operation": operation,
        "actor_id": actor_id,
        "resource_type": resource_type,
        "resource_id": resource_id,
        "detail": detail,
        "recorded_at": recorded_at,
    });
    let mut hasher = Sha256::new();
    hasher.update(
        serde_json::to_vec(&canonical).expect("audit canonical payload serializes"),
    );
    hasher.update(prev_hash.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// The digest stored with the entry does not match its recomputed value.
    DigestMismatch,
    /// The stored prev_hash does not match the previous entry's stored digest.
    LinkMismatch,
    /// An earlier entry failed, so this entry's linkage proves nothing.
    Unverifiable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainBreak {
    pub seq: i64,
    pub kind: BreakKind,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainVerification {
    pub valid: bool,
    pub checked: usize,
    pub errors: Vec<ChainBreak>,
}

impl ChainVerification {
    /// For callers that treat any break as fatal.
    pub fn into_result(self) -> crate::error::ComplianceResult<()> {
        match self.errors.into_iter().next() {
            None => Ok(()),
            Some(first) => Err(crate::error::ComplianceError::IntegrityViolation {
                seq: first.seq,
                detail: first.detail,
            }),
        }
    }
}

/// Walk `entries` in sequence order, recomputing each digest and checking
/// each link against `anchor` (the stored digest of the entry preceding the
/// range, or [`GENESIS_HASH`] when the range starts the chain).
pub fn verify_chain(anchor: &str, entries: &[AuditLogEntry]) -> ChainVerification {
    let mut errors = Vec::new();
    let mut upstream_broken = false;
    let mut prev_stored = anchor.to_string();

    for entry in entries {
        if upstream_broken {
            errors.push(ChainBreak {
                seq: entry.seq,
                kind: BreakKind::Unverifiable,
                detail: "chain broken upstream of this entry".into(),
            });
        }

        if entry.prev_hash != prev_stored {
            errors.push(ChainBreak {
                seq: entry.seq,
                kind: BreakKind::LinkMismatch,
                detail: format!(
                    "prev_hash {} does not match predecessor digest {}",
                    entry.prev_hash, prev_stored
                ),
            });
            upstream_broken = true;
        }

        let recomputed = chain_digest(
            &entry.operation,
            &entry.actor_id,
            &entry.resource_type,
            &entry.resource_id,
            &entry.detail,
            &entry.recorded_at.to_rfc3339(),
            &entry.prev_hash,
        );
        if recomputed != entry.digest {
            errors.push(ChainBreak {
                seq: entry.seq,
                kind: BreakKind::DigestMismatch,
                detail: format!(
                    "stored digest {} but recomputed {recomputed}",
                    entry.digest
                ),
            });
            upstream_broken = true;
        }

        prev_stored = entry.digest.clone();
    }

    ChainVerification {
        valid: errors.is_empty(),
        checked: entries.len(),
        errors,
    }
}
