//! Placement service error types.

use cloudfit_core::ValidationError;
use cloudfit_placement::{OptimizeError, PlacementResult};
use cloudfit_state::StateError;
use thiserror::Error;

/// Errors that can occur during placement operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("optimization failed: {0}")]
    Optimize(OptimizeError),

    /// Optimization succeeded but the record could not be stored. The
    /// computed placement is returned so the caller can retry persistence
    /// without recomputing it.
    #[error("placement computed but not persisted: {source}")]
    Persist {
        placement: Box<PlacementResult>,
        #[source]
        source: StateError,
    },

    #[error("state store error: {0}")]
    State(#[from] StateError),
}

impl From<OptimizeError> for ServiceError {
    fn from(err: OptimizeError) -> Self {
        match err {
            OptimizeError::InvalidRequirement(v) => ServiceError::Validation(v),
            other => ServiceError::Optimize(other),
        }
    }
}

impl ServiceError {
    /// The placement attached to a persistence failure, if any.
    pub fn placement(&self) -> Option<&PlacementResult> {
        match self {
            ServiceError::Persist { placement, .. } => Some(&**placement),
            _ => None,
        }
    }

    /// Whether the caller lost an optimistic-concurrency race and should
    /// re-read before retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, ServiceError::State(StateError::Conflict { .. }))
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
