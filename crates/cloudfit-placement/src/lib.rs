//! cloudfit placement engine: multi-criteria provider/region selection.
//!
//! This crate decides where a resource should run. It does NOT persist
//! anything (that's `cloudfit-state`). It filters candidate offerings
//! against hard constraints, scores the survivors and produces a ranked
//! placement.
//!
//! # Components
//!
//! - **`catalog`**: Candidate sources (static JSON-backed catalog)
//! - **`scorer`**: Hard constraints and cost/performance/compliance scoring
//! - **`optimizer`**: Ranking, winner selection, bounded alternatives

pub mod catalog;
pub mod optimizer;
pub mod scorer;

pub use catalog::{CandidateCatalog, CatalogError, StaticCatalog};
pub use optimizer::{OptimizeError, OptimizeResult, Optimizer, PlacementResult, optimize};
pub use scorer::{
    CandidateScore, Constraint, PREFERRED_PROVIDER_BONUS, Ranking, ScoredCandidate, ScoringContext,
    ScoringWeights, WEIGHTS, check_hard_constraints, rank_candidates, score,
};
