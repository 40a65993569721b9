//! Schema migrations for persisted resource records.
//!
//! A migration is a transform over the JSON form of a record, registered
//! for one `(from, to)` schema pair. A request for `from → to` uses the
//! direct pair when registered, otherwise walks adjacent revisions one at
//! a time. Any missing step fails the whole request with
//! [`StateError::UnsupportedMigration`]; nothing is partially applied.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{StateError, StateResult};

/// A transform from one schema revision to another.
pub type MigrationFn = Arc<dyn Fn(Value) -> StateResult<Value> + Send + Sync>;

/// Table of registered schema transforms.
#[derive(Clone)]
pub struct MigrationRegistry {
    steps: BTreeMap<(u32, u32), MigrationFn>,
}

impl Default for MigrationRegistry {
    /// Registry with the built-in upgrades from revisions 1 and 2.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(1, 2, v1_to_v2);
        registry.register(2, 3, v2_to_v3);
        registry
    }
}

impl std::fmt::Debug for MigrationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRegistry")
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl MigrationRegistry {
    pub fn empty() -> Self {
        Self {
            steps: BTreeMap::new(),
        }
    }

    /// Register (or replace) the transform for `from → to`.
    pub fn register<F>(&mut self, from: u32, to: u32, f: F)
    where
        F: Fn(Value) -> StateResult<Value> + Send + Sync + 'static,
    {
        self.steps.insert((from, to), Arc::new(f));
    }

    pub fn pairs(&self) -> Vec<(u32, u32)> {
        self.steps.keys().copied().collect()
    }

    /// The ordered list of registered steps that takes `from` to `to`.
    pub fn plan(&self, from: u32, to: u32) -> StateResult<Vec<(u32, u32)>> {
        let unsupported = StateError::UnsupportedMigration { from, to };
        if from == to {
            return Err(unsupported);
        }
        if self.steps.contains_key(&(from, to)) {
            return Ok(vec![(from, to)]);
        }

        let mut plan = Vec::new();
        let mut at = from;
        while at != to {
            let next = if to > at { at + 1 } else { at - 1 };
            if !self.steps.contains_key(&(at, next)) {
                return Err(unsupported);
            }
            plan.push((at, next));
            at = next;
        }
        Ok(plan)
    }

    /// Run every step of the `from → to` plan over `record`.
    pub fn apply(&self, mut record: Value, from: u32, to: u32) -> StateResult<Value> {
        for (step_from, step_to) in self.plan(from, to)? {
            let step = &self.steps[&(step_from, step_to)];
            record = step(record)?;
            object_mut(&mut record)?.insert("schema_version".to_string(), Value::from(step_to));
            debug!(from = step_from, to = step_to, "migration step applied");
        }
        Ok(record)
    }
}

fn object_mut(value: &mut Value) -> StateResult<&mut Map<String, Value>> {
    value
        .as_object_mut()
        .ok_or_else(|| StateError::Codec("record is not a JSON object".to_string()))
}

fn rename_field(obj: &mut Map<String, Value>, from: &str, to: &str) {
    if let Some(v) = obj.remove(from) {
        obj.insert(to.to_string(), v);
    }
}

/// Fold a legacy `certifications` list into `compliance_certifications`.
fn merge_certifications(candidate: &mut Value) {
    let Some(obj) = candidate.as_object_mut() else {
        return;
    };
    let Some(legacy) = obj.remove("certifications") else {
        return;
    };
    let mut merged: BTreeSet<String> = BTreeSet::new();
    for list in [obj.get("compliance_certifications"), Some(&legacy)]
        .into_iter()
        .flatten()
    {
        if let Some(items) = list.as_array() {
            merged.extend(items.iter().filter_map(|v| v.as_str().map(str::to_string)));
        }
    }
    obj.insert(
        "compliance_certifications".to_string(),
        Value::from(merged.into_iter().collect::<Vec<_>>()),
    );
}

/// Revision 1 called the resource type `kind` and kept certifications in
/// two lists per candidate.
fn v1_to_v2(mut record: Value) -> StateResult<Value> {
    let obj = object_mut(&mut record)?;
    rename_field(obj, "kind", "resource_type");

    if let Some(placement) = obj.get_mut("placement").and_then(Value::as_object_mut) {
        if let Some(candidate) = placement
            .get_mut("selected")
            .and_then(|s| s.get_mut("candidate"))
        {
            merge_certifications(candidate);
        }
        if let Some(alternatives) = placement.get_mut("alternatives").and_then(Value::as_array_mut) {
            for alt in alternatives {
                if let Some(candidate) = alt.get_mut("candidate") {
                    merge_certifications(candidate);
                }
            }
        }
    }
    Ok(record)
}

/// Revision 2 stored the mutation timestamp as `updated_at`.
fn v2_to_v3(mut record: Value) -> StateResult<Value> {
    rename_field(object_mut(&mut record)?, "updated_at", "last_updated");
    Ok(record)
}
