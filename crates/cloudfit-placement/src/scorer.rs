//! Candidate scoring for placement decisions.
//!
//! Every candidate first passes a set of hard constraints; survivors are
//! scored with a fixed weighted combination of:
//! - **Cost**: cheaper relative to the most expensive survivor scores higher
//! - **Performance**: the upstream benchmark score, passed through
//! - **Compliance**: share of required frameworks held (always full for survivors)
//!
//! Weights are constants so that two runs over the same inputs always
//! produce the same ranking.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use cloudfit_core::{Candidate, ResourceRequirement};

/// Bonus added to the total for candidates from a preferred provider.
pub const PREFERRED_PROVIDER_BONUS: f64 = 0.05;

/// Weights for the scoring components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub cost: f64,
    pub performance: f64,
    pub compliance: f64,
}

/// The fixed weighting every placement is scored with.
pub const WEIGHTS: ScoringWeights = ScoringWeights {
    cost: 0.4,
    performance: 0.4,
    compliance: 0.2,
};

/// A hard constraint that can eliminate a candidate outright.
///
/// Checks run in declaration order; a rejected candidate is attributed to
/// the first constraint it fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Constraint {
    /// The candidate record itself is not normalized (bad cost, score, ...).
    MalformedCandidate,
    /// The SKU serves a different kind of resource.
    ResourceType,
    Region,
    ExcludedProvider,
    RequiredFeatures,
    Compliance,
    Availability,
    Budget,
    /// The SKU's declared capacity is below the requirement.
    Capacity,
}

impl Constraint {
    pub fn as_str(&self) -> &'static str {
        match self {
            Constraint::MalformedCandidate => "malformed_candidate",
            Constraint::ResourceType => "resource_type",
            Constraint::Region => "region",
            Constraint::ExcludedProvider => "excluded_provider",
            Constraint::RequiredFeatures => "required_features",
            Constraint::Compliance => "compliance",
            Constraint::Availability => "availability",
            Constraint::Budget => "budget",
            Constraint::Capacity => "capacity",
        }
    }
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Score components for one candidate. All values in 0.0..=1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    pub cost_score: f64,
    pub performance_score: f64,
    pub compliance_score: f64,
    /// Weighted sum plus any preferred-provider bonus, clamped to 0..=1.
    pub total_score: f64,
}

/// A candidate together with the scores that ranked it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCandidate {
    pub candidate: Candidate,
    pub score: CandidateScore,
}

/// Inputs to cost scoring that depend on the whole surviving set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringContext {
    /// Highest monthly cost among survivors.
    pub reference_cost: f64,
    pub survivors: usize,
}

impl ScoringContext {
    pub fn from_survivors(survivors: &[&Candidate]) -> Self {
        let reference_cost = survivors
            .iter()
            .map(|c| c.monthly_cost)
            .fold(0.0_f64, f64::max);
        Self {
            reference_cost,
            survivors: survivors.len(),
        }
    }
}

/// Check every hard constraint, returning the first one violated.
pub fn check_hard_constraints(
    req: &ResourceRequirement,
    candidate: &Candidate,
) -> Result<(), Constraint> {
    if candidate.validate().is_err() {
        return Err(Constraint::MalformedCandidate);
    }
    if candidate
        .resource_type
        .is_some_and(|t| t != req.resource_type())
    {
        return Err(Constraint::ResourceType);
    }
    if !req.regions.contains(&candidate.region) {
        return Err(Constraint::Region);
    }
    if req.excluded_providers.contains(&candidate.provider) {
        return Err(Constraint::ExcludedProvider);
    }
    if !req.required_features.is_subset(&candidate.feature_tags) {
        return Err(Constraint::RequiredFeatures);
    }
    if !req
        .compliance_frameworks
        .is_subset(&candidate.compliance_certifications)
    {
        return Err(Constraint::Compliance);
    }
    if candidate.availability_percent < req.min_availability_percent {
        return Err(Constraint::Availability);
    }
    if req
        .max_monthly_budget
        .is_some_and(|budget| candidate.monthly_cost > budget)
    {
        return Err(Constraint::Budget);
    }
    if candidate
        .capacity
        .as_ref()
        .is_some_and(|cap| !cap.satisfies(&req.spec))
    {
        return Err(Constraint::Capacity);
    }
    Ok(())
}

/// Score a single candidate against a requirement.
///
/// Returns the violated constraint if the candidate fails a hard filter.
pub fn score(
    req: &ResourceRequirement,
    candidate: &Candidate,
    ctx: &ScoringContext,
) -> Result<CandidateScore, Constraint> {
    check_hard_constraints(req, candidate)?;

    let cost_score = if ctx.survivors <= 1 || ctx.reference_cost <= 0.0 {
        1.0
    } else {
        1.0 - (candidate.monthly_cost / ctx.reference_cost).min(1.0)
    };

    let performance_score = candidate.performance_score;

    let required = req.compliance_frameworks.len();
    let compliance_score = if required == 0 {
        1.0
    } else {
        let present = req
            .compliance_frameworks
            .iter()
            .filter(|f| candidate.compliance_certifications.contains(*f))
            .count();
        present as f64 / required.max(1) as f64
    };

    let mut total_score = WEIGHTS.cost * cost_score
        + WEIGHTS.performance * performance_score
        + WEIGHTS.compliance * compliance_score;
    if req.preferred_providers.contains(&candidate.provider) {
        total_score += PREFERRED_PROVIDER_BONUS;
    }

    Ok(CandidateScore {
        cost_score,
        performance_score,
        compliance_score,
        total_score: total_score.clamp(0.0, 1.0),
    })
}

/// Ranking order: total descending, then cheaper, then provider, region
/// and SKU lexicographically.
pub fn compare_ranked(a: &ScoredCandidate, b: &ScoredCandidate) -> Ordering {
    b.score
        .total_score
        .total_cmp(&a.score.total_score)
        .then_with(|| a.candidate.monthly_cost.total_cmp(&b.candidate.monthly_cost))
        .then_with(|| a.candidate.provider.cmp(&b.candidate.provider))
        .then_with(|| a.candidate.region.cmp(&b.candidate.region))
        .then_with(|| a.candidate.sku_id.cmp(&b.candidate.sku_id))
}

/// Outcome of filtering and scoring a candidate set.
#[derive(Debug, Clone, Default)]
pub struct Ranking {
    /// Survivors, best first.
    pub ranked: Vec<ScoredCandidate>,
    /// How many candidates each constraint eliminated.
    pub eliminated: BTreeMap<Constraint, usize>,
}

impl Ranking {
    /// The constraint that eliminated the most candidates. Ties go to the
    /// constraint checked first.
    pub fn dominant_constraint(&self) -> Option<Constraint> {
        self.eliminated
            .iter()
            .fold(None, |best: Option<(Constraint, usize)>, (&c, &n)| match best {
                Some((_, top)) if top >= n => best,
                _ => Some((c, n)),
            })
            .map(|(c, _)| c)
    }
}

/// Filter, score and sort candidates (best first).
pub fn rank_candidates(req: &ResourceRequirement, candidates: &[Candidate]) -> Ranking {
    let mut eliminated: BTreeMap<Constraint, usize> = BTreeMap::new();
    let mut survivors: Vec<&Candidate> = Vec::with_capacity(candidates.len());

    for candidate in candidates {
        match check_hard_constraints(req, candidate) {
            Ok(()) => survivors.push(candidate),
            Err(constraint) => {
                debug!(
                    candidate = %candidate.label(),
                    %constraint,
                    "candidate eliminated"
                );
                *eliminated.entry(constraint).or_insert(0) += 1;
            }
        }
    }

    let ctx = ScoringContext::from_survivors(&survivors);
    let mut ranked: Vec<ScoredCandidate> = survivors
        .into_iter()
        .filter_map(|c| {
            score(req, c, &ctx).ok().map(|score| ScoredCandidate {
                candidate: c.clone(),
                score,
            })
        })
        .collect();

    ranked.sort_by(compare_ranked);
    Ranking { ranked, eliminated }
}
