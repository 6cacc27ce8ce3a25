//! Typed error hierarchy for the workflow engine.
//!
//! One top-level enum covers the four failure classes callers must tell
//! apart:
//! - `NotFound` — a referenced entity does not exist
//! - `Sequence` — a phase-ordering precondition was violated
//! - `InvalidState` — an operation hit an entity in the wrong state
//! - `Dependency` — a collaborator call (reviewer, notifier) failed
//!
//! `NotFound`, `Sequence` and `InvalidState` indicate a caller bug and are
//! always surfaced. `Dependency` is retryable by the caller's own policy.

use thiserror::Error;

/// Errors from the phase & deliverable workflow engine.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Phase {phase_number} of project {project_id} cannot activate: {reason}")]
    Sequence {
        project_id: i64,
        phase_number: i32,
        reason: String,
    },

    #[error("{entity} {id} is in the wrong state: {reason}")]
    InvalidState {
        entity: &'static str,
        id: i64,
        reason: String,
    },

    #[error("Collaborator call failed: {0}")]
    Dependency(#[source] anyhow::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl WorkflowError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn invalid_state(entity: &'static str, id: i64, reason: impl Into<String>) -> Self {
        Self::InvalidState {
            entity,
            id,
            reason: reason.into(),
        }
    }

    pub fn sequence(project_id: i64, phase_number: i32, reason: impl Into<String>) -> Self {
        Self::Sequence {
            project_id,
            phase_number,
            reason: reason.into(),
        }
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;
