//! Candidate catalog: the set of provider offerings to choose from.
//!
//! Pricing and benchmark data are gathered by external collaborators; by
//! the time records reach a catalog they are already normalized to one
//! currency and a 0..=1 performance scale. The catalog only stores and
//! pre-selects them.

use std::collections::BTreeSet;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, warn};

use cloudfit_core::{Candidate, ResourceRequirement, ValidationError};

/// Errors raised while loading a catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("candidate {sku} rejected: {source}")]
    Invalid {
        sku: String,
        #[source]
        source: ValidationError,
    },
}

/// Source of candidates for a placement run.
pub trait CandidateCatalog: Send + Sync {
    /// Candidates worth considering for `req`. May over-approximate; the
    /// optimizer applies the authoritative hard filters.
    fn candidates_for(&self, req: &ResourceRequirement) -> Vec<Candidate>;
}

/// In-memory catalog holding a validated list of candidates.
#[derive(Debug, Clone, Default)]
pub struct StaticCatalog {
    candidates: Vec<Candidate>,
}

impl StaticCatalog {
    /// Build a catalog, rejecting the first malformed record.
    pub fn new(candidates: Vec<Candidate>) -> Result<Self, CatalogError> {
        for c in &candidates {
            c.validate().map_err(|source| CatalogError::Invalid {
                sku: c.label(),
                source,
            })?;
        }
        Ok(Self { candidates })
    }

    /// Build a catalog, dropping malformed records with a warning.
    pub fn lenient(candidates: Vec<Candidate>) -> Self {
        let candidates = candidates
            .into_iter()
            .filter(|c| match c.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(candidate = %c.label(), error = %e, "dropping malformed candidate");
                    false
                }
            })
            .collect();
        Self { candidates }
    }

    /// Parse a JSON array of candidates.
    pub fn from_json(bytes: &[u8]) -> Result<Self, CatalogError> {
        let candidates: Vec<Candidate> = serde_json::from_slice(bytes)?;
        Self::new(candidates)
    }

    /// Load a JSON array of candidates from disk.
    pub fn from_file(path: &Path) -> Result<Self, CatalogError> {
        let bytes = std::fs::read(path)?;
        let catalog = Self::from_json(&bytes)?;
        debug!(?path, candidates = catalog.len(), "catalog loaded");
        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn all(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn by_provider(&self, provider: &str) -> Vec<&Candidate> {
        self.candidates
            .iter()
            .filter(|c| c.provider == provider)
            .collect()
    }

    /// Distinct regions offered by any candidate.
    pub fn regions(&self) -> BTreeSet<&str> {
        self.candidates.iter().map(|c| c.region.as_str()).collect()
    }
}

impl CandidateCatalog for StaticCatalog {
    fn candidates_for(&self, req: &ResourceRequirement) -> Vec<Candidate> {
        self.candidates
            .iter()
            .filter(|c| req.regions.contains(&c.region))
            .cloned()
            .collect()
    }
}
