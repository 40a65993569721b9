//! Shared domain types used across cloudfit crates.
//!
//! A [`ResourceRequirement`] describes what a caller needs; a [`Candidate`]
//! is one provider offering that might satisfy it. Both are plain data:
//! the placement engine reads them, nothing in the core mutates them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Availability floor applied when a requirement doesn't specify one.
pub const DEFAULT_MIN_AVAILABILITY_PERCENT: f64 = 99.9;

fn default_min_availability() -> f64 {
    DEFAULT_MIN_AVAILABILITY_PERCENT
}

// ── Resource type ──────────────────────────────────────────────────

/// The broad class of cloud resource being placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    Compute,
    Storage,
    Network,
    Database,
}

impl ResourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Compute => "compute",
            ResourceType::Storage => "storage",
            ResourceType::Network => "network",
            ResourceType::Database => "database",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Requirement ────────────────────────────────────────────────────

/// Variant-specific sizing for a requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResourceSpec {
    Compute {
        vcpus: u32,
        memory_gb: f64,
    },
    Storage {
        capacity_gb: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        iops: Option<u32>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        throughput_mbps: Option<f64>,
    },
    Network {
        bandwidth_gbps: f64,
        #[serde(default)]
        cross_region: bool,
    },
    Database {
        engine: String,
        version: String,
    },
}

impl ResourceSpec {
    pub fn resource_type(&self) -> ResourceType {
        match self {
            ResourceSpec::Compute { .. } => ResourceType::Compute,
            ResourceSpec::Storage { .. } => ResourceType::Storage,
            ResourceSpec::Network { .. } => ResourceType::Network,
            ResourceSpec::Database { .. } => ResourceType::Database,
        }
    }
}

/// What a caller needs placed, and the constraints on where it may go.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceRequirement {
    /// Caller-chosen label.
    pub name: String,
    /// Acceptable region codes (e.g. "us-east-1").
    pub regions: BTreeSet<String>,
    /// Minimum provider-advertised availability (0–100).
    #[serde(default = "default_min_availability")]
    pub min_availability_percent: f64,
    /// Upper bound on monthly cost, same currency as the candidates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_monthly_budget: Option<f64>,
    #[serde(default)]
    pub preferred_providers: BTreeSet<String>,
    #[serde(default)]
    pub excluded_providers: BTreeSet<String>,
    /// Capability tags every candidate must carry.
    #[serde(default)]
    pub required_features: BTreeSet<String>,
    /// Certifications every candidate must hold (e.g. "soc2", "hipaa").
    #[serde(default)]
    pub compliance_frameworks: BTreeSet<String>,
    pub spec: ResourceSpec,
}

impl ResourceRequirement {
    /// Build a requirement with defaults for every optional constraint.
    pub fn new<I, S>(name: &str, regions: I, spec: ResourceSpec) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.to_string(),
            regions: regions.into_iter().map(Into::into).collect(),
            min_availability_percent: DEFAULT_MIN_AVAILABILITY_PERCENT,
            max_monthly_budget: None,
            preferred_providers: BTreeSet::new(),
            excluded_providers: BTreeSet::new(),
            required_features: BTreeSet::new(),
            compliance_frameworks: BTreeSet::new(),
            spec,
        }
    }

    pub fn resource_type(&self) -> ResourceType {
        self.spec.resource_type()
    }

    /// Check the requirement is well-formed before it reaches the optimizer.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::new("name", "must not be empty"));
        }
        if self.regions.is_empty() {
            return Err(ValidationError::new("regions", "at least one region is required"));
        }
        if let Some(region) = self.regions.iter().find(|r| r.trim().is_empty()) {
            return Err(ValidationError::new(
                "regions",
                format!("invalid region code {region:?}"),
            ));
        }
        let avail = self.min_availability_percent;
        if !avail.is_finite() || !(0.0..=100.0).contains(&avail) {
            return Err(ValidationError::new(
                "min_availability_percent",
                format!("must be within 0..=100, got {avail}"),
            ));
        }
        if let Some(budget) = self.max_monthly_budget {
            if !budget.is_finite() || budget <= 0.0 {
                return Err(ValidationError::new(
                    "max_monthly_budget",
                    format!("must be a positive amount, got {budget}"),
                ));
            }
        }
        let overlap: Vec<&String> = self
            .preferred_providers
            .intersection(&self.excluded_providers)
            .collect();
        if !overlap.is_empty() {
            return Err(ValidationError::new(
                "preferred_providers",
                format!("providers both preferred and excluded: {overlap:?}"),
            ));
        }
        self.validate_spec()
    }

    fn validate_spec(&self) -> Result<(), ValidationError> {
        match &self.spec {
            ResourceSpec::Compute { vcpus, memory_gb } => {
                if *vcpus < 1 {
                    return Err(ValidationError::new("spec.vcpus", "must be at least 1"));
                }
                if !memory_gb.is_finite() || *memory_gb <= 0.0 {
                    return Err(ValidationError::new("spec.memory_gb", "must be positive"));
                }
            }
            ResourceSpec::Storage {
                capacity_gb,
                iops,
                throughput_mbps,
            } => {
                if *capacity_gb < 1 {
                    return Err(ValidationError::new("spec.capacity_gb", "must be at least 1"));
                }
                if *iops == Some(0) {
                    return Err(ValidationError::new("spec.iops", "must be positive when set"));
                }
                if let Some(t) = throughput_mbps {
                    if !t.is_finite() || *t <= 0.0 {
                        return Err(ValidationError::new(
                            "spec.throughput_mbps",
                            "must be positive when set",
                        ));
                    }
                }
            }
            ResourceSpec::Network { bandwidth_gbps, .. } => {
                if !bandwidth_gbps.is_finite() || *bandwidth_gbps <= 0.0 {
                    return Err(ValidationError::new("spec.bandwidth_gbps", "must be positive"));
                }
            }
            ResourceSpec::Database { engine, version } => {
                if engine.trim().is_empty() {
                    return Err(ValidationError::new("spec.engine", "must not be empty"));
                }
                if version.trim().is_empty() {
                    return Err(ValidationError::new("spec.version", "must not be empty"));
                }
            }
        }
        Ok(())
    }
}

// ── Candidate ──────────────────────────────────────────────────────

/// Advertised capacity of a SKU. Every field is optional; only declared
/// dimensions are checked against a requirement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CandidateCapacity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_gb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity_gb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iops: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub throughput_mbps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bandwidth_gbps: Option<f64>,
    /// Supported database engines as `engine` or `engine:version`.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub engines: BTreeSet<String>,
}

impl CandidateCapacity {
    /// Whether this capacity covers the given spec. Undeclared dimensions pass.
    pub fn satisfies(&self, spec: &ResourceSpec) -> bool {
        fn at_least<T: PartialOrd>(have: Option<T>, need: T) -> bool {
            have.is_none_or(|h| h >= need)
        }

        match spec {
            ResourceSpec::Compute { vcpus, memory_gb } => {
                at_least(self.vcpus, *vcpus) && at_least(self.memory_gb, *memory_gb)
            }
            ResourceSpec::Storage {
                capacity_gb,
                iops,
                throughput_mbps,
            } => {
                at_least(self.capacity_gb, *capacity_gb)
                    && iops.is_none_or(|need| at_least(self.iops, need))
                    && throughput_mbps.is_none_or(|need| at_least(self.throughput_mbps, need))
            }
            ResourceSpec::Network { bandwidth_gbps, .. } => {
                at_least(self.bandwidth_gbps, *bandwidth_gbps)
            }
            ResourceSpec::Database { engine, version } => {
                self.engines.is_empty()
                    || self.engines.contains(engine)
                    || self.engines.contains(&format!("{engine}:{version}"))
            }
        }
    }
}

/// One provider offering considered during optimization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub provider: String,
    pub region: String,
    pub sku_id: String,
    /// Normalized monthly cost (single currency across the candidate set).
    pub monthly_cost: f64,
    /// Benchmark-derived score in 0.0..=1.0, computed upstream.
    pub performance_score: f64,
    #[serde(default)]
    pub compliance_certifications: BTreeSet<String>,
    pub availability_percent: f64,
    #[serde(default)]
    pub feature_tags: BTreeSet<String>,
    /// Which kind of requirement this SKU can serve. `None` matches any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<ResourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CandidateCapacity>,
}

impl Candidate {
    pub fn new(provider: &str, region: &str, sku_id: &str, monthly_cost: f64, performance_score: f64) -> Self {
        Self {
            provider: provider.to_string(),
            region: region.to_string(),
            sku_id: sku_id.to_string(),
            monthly_cost,
            performance_score,
            compliance_certifications: BTreeSet::new(),
            availability_percent: 100.0,
            feature_tags: BTreeSet::new(),
            resource_type: None,
            capacity: None,
        }
    }

    /// Check the record is normalized the way the scorer expects.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.provider.trim().is_empty() {
            return Err(ValidationError::new("provider", "must not be empty"));
        }
        if self.region.trim().is_empty() {
            return Err(ValidationError::new("region", "must not be empty"));
        }
        if self.sku_id.trim().is_empty() {
            return Err(ValidationError::new("sku_id", "must not be empty"));
        }
        if !self.monthly_cost.is_finite() || self.monthly_cost <= 0.0 {
            return Err(ValidationError::new(
                "monthly_cost",
                format!("must be a positive amount, got {}", self.monthly_cost),
            ));
        }
        if !self.performance_score.is_finite() || !(0.0..=1.0).contains(&self.performance_score) {
            return Err(ValidationError::new(
                "performance_score",
                format!("must be within 0..=1, got {}", self.performance_score),
            ));
        }
        let avail = self.availability_percent;
        if !avail.is_finite() || !(0.0..=100.0).contains(&avail) {
            return Err(ValidationError::new(
                "availability_percent",
                format!("must be within 0..=100, got {avail}"),
            ));
        }
        Ok(())
    }

    /// Human-readable `provider/region/sku` label for logs and errors.
    pub fn label(&self) -> String {
        format!("{}/{}/{}", self.provider, self.region, self.sku_id)
    }
}
