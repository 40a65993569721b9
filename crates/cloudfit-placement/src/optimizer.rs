//! Placement optimizer: picks the best candidate for a requirement.
//!
//! Given a requirement and a candidate set, the optimizer:
//! 1. Validates the requirement
//! 2. Drops candidates failing any hard constraint (using scorer)
//! 3. Ranks survivors and keeps the winner plus a bounded list of runners-up
//!
//! Optimization is pure: inputs are borrowed, nothing is cached between
//! runs, and identical inputs always produce the same ranking.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use cloudfit_core::config::MAX_ALTERNATIVES;
use cloudfit_core::{Candidate, ResourceRequirement, ValidationError};

use crate::scorer::{Constraint, ScoredCandidate, rank_candidates};

/// Errors returned by [`Optimizer::optimize`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptimizeError {
    #[error("invalid requirement: {0}")]
    InvalidRequirement(#[from] ValidationError),

    #[error("{}", describe_empty(.dominant, .considered))]
    EmptyCandidateSet {
        /// The constraint that eliminated the most candidates, if any were supplied.
        dominant: Option<Constraint>,
        /// Eliminations per constraint.
        eliminated: BTreeMap<Constraint, usize>,
        considered: usize,
    },
}

fn describe_empty(dominant: &Option<Constraint>, considered: &usize) -> String {
    match dominant {
        Some(c) => format!(
            "no candidate satisfies the requirement: {considered} considered, most eliminated by {c} constraint"
        ),
        None => "no candidates supplied".to_string(),
    }
}

pub type OptimizeResult<T> = Result<T, OptimizeError>;

/// A placement decision for a single requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlacementResult {
    /// Assigned when the placement is persisted.
    pub id: Option<String>,
    pub requirement: ResourceRequirement,
    pub selected: ScoredCandidate,
    /// Runners-up, best first.
    pub alternatives: Vec<ScoredCandidate>,
    /// Unix timestamp (seconds) when this placement was computed.
    pub created_at: u64,
    pub version: u64,
}

/// Stateless placement engine.
#[derive(Debug, Clone, Copy)]
pub struct Optimizer {
    max_alternatives: usize,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self {
            max_alternatives: MAX_ALTERNATIVES,
        }
    }
}

impl Optimizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retain at most `n` alternatives (never more than [`MAX_ALTERNATIVES`]).
    pub fn with_max_alternatives(n: usize) -> Self {
        Self {
            max_alternatives: n.min(MAX_ALTERNATIVES),
        }
    }

    pub fn max_alternatives(&self) -> usize {
        self.max_alternatives
    }

    /// Compute a placement for `req` over `candidates`.
    pub fn optimize(
        &self,
        req: &ResourceRequirement,
        candidates: &[Candidate],
    ) -> OptimizeResult<PlacementResult> {
        req.validate()?;

        let ranking = rank_candidates(req, candidates);
        let dominant = ranking.dominant_constraint();
        let mut ranked = ranking.ranked.into_iter();

        let Some(selected) = ranked.next() else {
            debug!(
                requirement = %req.name,
                considered = candidates.len(),
                dominant = ?dominant,
                "no surviving candidates"
            );
            return Err(OptimizeError::EmptyCandidateSet {
                dominant,
                eliminated: ranking.eliminated,
                considered: candidates.len(),
            });
        };
        let alternatives: Vec<ScoredCandidate> = ranked.take(self.max_alternatives).collect();

        info!(
            requirement = %req.name,
            resource_type = %req.resource_type(),
            selected = %selected.candidate.label(),
            score = selected.score.total_score,
            alternatives = alternatives.len(),
            "placement selected"
        );

        Ok(PlacementResult {
            id: None,
            requirement: req.clone(),
            selected,
            alternatives,
            created_at: epoch_secs(),
            version: 1,
        })
    }
}

/// Run the default optimizer.
pub fn optimize(
    req: &ResourceRequirement,
    candidates: &[Candidate],
) -> OptimizeResult<PlacementResult> {
    Optimizer::default().optimize(req, candidates)
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
