//! Shared primitive types used across the compliance core.

/// A stable, unique identifier for any entity (transaction, alert, incident).
pub type EntityId = String;

/// Identifies the human or system actor behind a mutation.
/// Opaque to the core — role checks and data scoping live in the caller.
pub type ActorId = String;

/// Raised when a stored status/severity string no longer maps to a known
/// enum variant. Only reachable if the database was edited out-of-band.
#[derive(Debug)]
pub struct BadEnumValue {
    pub column: &'static str,
    pub value: String,
}

impl std::fmt::Display for BadEnumValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown {} value '{}'", self.column, self.value)
    }
}

impl std::error::Error for BadEnumValue {}
