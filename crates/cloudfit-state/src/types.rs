//! Persisted record types for the cloudfit state store.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use cloudfit_core::{ResourceType, ValidationError};
use cloudfit_placement::PlacementResult;

/// Unique identifier for a stored resource (UUID v4 string).
pub type ResourceId = String;

/// Schema revision written by this build.
pub const CURRENT_SCHEMA_VERSION: u32 = 3;

/// A persisted placement decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    /// Schema revision of this record's serialized shape.
    pub schema_version: u32,
    pub id: ResourceId,
    pub resource_type: ResourceType,
    pub placement: PlacementResult,
    /// Other resources this one depends on.
    #[serde(default)]
    pub dependencies: BTreeSet<ResourceId>,
    /// Unix timestamp (seconds) of the last mutation.
    pub last_updated: u64,
    /// Bumped on every mutation, starting at 1.
    pub version: u64,
}

impl ResourceState {
    /// Check invariants that don't depend on other records.
    pub fn check_shape(&self) -> Result<(), ValidationError> {
        if self.id.trim().is_empty() {
            return Err(ValidationError::new("id", "must not be empty"));
        }
        if self.version == 0 {
            return Err(ValidationError::new("version", "must start at 1"));
        }
        if self.placement.id.as_deref() != Some(self.id.as_str()) {
            return Err(ValidationError::new(
                "placement.id",
                format!(
                    "placement id {:?} does not match resource id {}",
                    self.placement.id, self.id
                ),
            ));
        }
        let placed = self.placement.requirement.resource_type();
        if placed != self.resource_type {
            return Err(ValidationError::new(
                "resource_type",
                format!("record is {} but placement is for {placed}", self.resource_type),
            ));
        }
        if self.dependencies.contains(&self.id) {
            return Err(ValidationError::new("dependencies", "a resource cannot depend on itself"));
        }
        self.placement
            .requirement
            .validate()
            .map_err(|e| ValidationError::new(format!("placement.requirement.{}", e.field), e.reason))
    }
}

/// Result of re-validating one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    pub id: ResourceId,
    /// Dependencies that no longer exist in the store.
    pub dangling: Vec<ResourceId>,
    /// Shape violation, if the record itself is malformed.
    pub invalid: Option<String>,
}

impl DriftReport {
    pub fn has_drift(&self) -> bool {
        !self.dangling.is_empty() || self.invalid.is_some()
    }
}
