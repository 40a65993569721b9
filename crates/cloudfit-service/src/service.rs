//! Placement service: sequences optimization and persistence.
//!
//! The optimizer runs without any store lock held; only the final
//! create/update touches shared state. A persistence failure after a
//! successful optimization is surfaced with the computed placement
//! attached and is never retried here.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use cloudfit_core::{Candidate, CloudfitConfig, ResourceRequirement, ValidationError};
use cloudfit_placement::{CandidateCatalog, Optimizer, PlacementResult};
use cloudfit_state::{DriftReport, ImportMode, ResourceId, ResourceState, StateStore};

use crate::error::{ServiceError, ServiceResult};

/// Façade over the optimizer and the state store.
#[derive(Clone)]
pub struct PlacementService {
    store: StateStore,
    optimizer: Optimizer,
}

impl PlacementService {
    pub fn new(store: StateStore) -> Self {
        Self::with_optimizer(store, Optimizer::default())
    }

    pub fn with_optimizer(store: StateStore, optimizer: Optimizer) -> Self {
        Self { store, optimizer }
    }

    /// Build a service from configuration, opening the configured store
    /// (in-memory when no path is set).
    pub fn from_config(config: &CloudfitConfig) -> ServiceResult<Self> {
        let store = match config.store_path() {
            Some(path) => StateStore::open(path)?,
            None => StateStore::open_in_memory()?,
        };
        let optimizer = Optimizer::with_max_alternatives(config.max_alternatives());
        Ok(Self::with_optimizer(store, optimizer))
    }

    pub fn store(&self) -> &StateStore {
        &self.store
    }

    /// Compute a placement without persisting it.
    pub fn plan(
        &self,
        req: &ResourceRequirement,
        candidates: &[Candidate],
    ) -> ServiceResult<PlacementResult> {
        req.validate()?;
        Ok(self.optimizer.optimize(req, candidates)?)
    }

    /// Optimize `req` over `candidates` and persist the winner.
    pub fn place(
        &self,
        req: &ResourceRequirement,
        candidates: &[Candidate],
        dependencies: BTreeSet<ResourceId>,
    ) -> ServiceResult<ResourceState> {
        let placement = self.plan(req, candidates)?;

        match self
            .store
            .create(req.resource_type(), placement.clone(), dependencies)
        {
            Ok(state) => {
                info!(
                    id = %state.id,
                    requirement = %req.name,
                    selected = %state.placement.selected.candidate.label(),
                    "resource placed"
                );
                Ok(state)
            }
            Err(source) => {
                warn!(requirement = %req.name, error = %source, "placement not persisted");
                Err(ServiceError::Persist {
                    placement: Box::new(placement),
                    source,
                })
            }
        }
    }

    /// Pull candidates from a catalog, then [`place`](Self::place).
    pub fn place_from_catalog(
        &self,
        req: &ResourceRequirement,
        catalog: &dyn CandidateCatalog,
        dependencies: BTreeSet<ResourceId>,
    ) -> ServiceResult<ResourceState> {
        let candidates = catalog.candidates_for(req);
        debug!(requirement = %req.name, candidates = candidates.len(), "catalog queried");
        self.place(req, &candidates, dependencies)
    }

    pub fn get(&self, id: &str) -> ServiceResult<ResourceState> {
        Ok(self.store.get(id)?)
    }

    pub fn list(&self) -> Vec<ResourceState> {
        self.store.list()
    }

    /// Re-run optimization for an existing resource and store the result as
    /// a new version of the same id.
    pub fn replace(
        &self,
        id: &str,
        req: &ResourceRequirement,
        candidates: &[Candidate],
        expected_version: u64,
    ) -> ServiceResult<ResourceState> {
        let current = self.store.get(id)?;
        if req.resource_type() != current.resource_type {
            return Err(ValidationError::new(
                "spec",
                format!(
                    "{id} is a {} resource, requirement is for {}",
                    current.resource_type,
                    req.resource_type()
                ),
            )
            .into());
        }

        let placement = self.plan(req, candidates)?;
        let state = self.store.update(id, placement, expected_version)?;
        info!(
            %id,
            version = state.version,
            selected = %state.placement.selected.candidate.label(),
            "resource replaced"
        );
        Ok(state)
    }

    pub fn remove(&self, id: &str, force: bool) -> ServiceResult<()> {
        Ok(self.store.delete(id, force)?)
    }

    /// [`remove`](Self::remove), failing with a conflict if the record has
    /// moved past `expected_version`.
    pub fn remove_at(&self, id: &str, expected_version: u64, force: bool) -> ServiceResult<()> {
        Ok(self.store.delete_at(id, expected_version, force)?)
    }

    pub fn export(&self, id: &str) -> ServiceResult<Vec<u8>> {
        Ok(self.store.export(id)?)
    }

    pub fn import(&self, bytes: &[u8], mode: ImportMode) -> ServiceResult<ResourceState> {
        Ok(self.store.import(bytes, mode)?)
    }

    /// Move a record between schema revisions. Every stored record is already
    /// at the current revision, so a transform starting there must first be
    /// registered with [`StateStore::register_migration`].
    pub fn migrate(&self, id: &str, from: u32, to: u32) -> ServiceResult<ResourceState> {
        Ok(self.store.migrate(id, from, to)?)
    }

    pub fn refresh(&self, id: &str) -> ServiceResult<ResourceState> {
        Ok(self.store.refresh(id)?)
    }

    pub fn refresh_all(&self) -> Vec<DriftReport> {
        self.store.refresh_all()
    }
}
