//! Domain errors for the stratagem refinement engine.

use thiserror::Error;
use uuid::Uuid;

/// Format a cycle path as a human-readable string: `A -> B -> C`.
fn format_cycle_path(path: &[Uuid]) -> String {
    path.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Domain-level errors that can occur in the strategy engine.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("DEPENDS_ON edge would create a cycle: {}", format_cycle_path(.0))]
    DependencyCycle(Vec<Uuid>),

    #[error("Strategy node not found: {0}")]
    NodeNotFound(Uuid),

    #[error("Strategy edge not found: {0}")]
    EdgeNotFound(Uuid),

    #[error("Refinement cycle not found: {0}")]
    CycleNotFound(Uuid),

    #[error("Adjustment not found: {0}")]
    AdjustmentNotFound(Uuid),

    #[error("Balance snapshot not found: {0}")]
    SnapshotNotFound(Uuid),

    #[error("Drift signal not found: {0}")]
    DriftSignalNotFound(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Concurrency conflict: {entity} {id} was modified")]
    ConcurrencyConflict { entity: String, id: String },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Whether retrying the same operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict { .. })
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}
