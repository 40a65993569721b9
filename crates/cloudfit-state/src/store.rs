//! StateStore: versioned resource records with redb durability.
//!
//! All records live in one process-wide map guarded by a reader-writer
//! lock; every mutation is written through to redb before the map is
//! changed. Structural operations (create, delete, import) take the write
//! lock for their whole check-and-apply span so dependency checks see a
//! consistent view. Updates are optimistic: the new record is built from a
//! snapshot, then committed only if the stored version still matches the
//! caller's expected version.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use redb::{Database, ReadableDatabase, ReadableTable};
use serde_json::Value;
use tracing::{debug, info, warn};

use cloudfit_core::{ResourceType, ValidationError};
use cloudfit_placement::PlacementResult;

use crate::codec;
use crate::error::{StateError, StateResult};
use crate::migrate::MigrationRegistry;
use crate::tables::RESOURCES;
use crate::types::*;

/// Convert any `Display` error into a `StateError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| StateError::$variant(e.to_string())
    };
}

/// How [`StateStore::import`] treats the exported id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImportMode {
    /// Keep the exported id; fails if it is already taken.
    #[default]
    Preserve,
    /// Assign a new id.
    FreshId,
}

/// Thread-safe resource state store.
#[derive(Clone)]
pub struct StateStore {
    db: Arc<Database>,
    records: Arc<RwLock<HashMap<ResourceId, ResourceState>>>,
    migrations: Arc<RwLock<MigrationRegistry>>,
}

impl StateStore {
    /// Open (or create) a persistent state store at the given path.
    pub fn open(path: &Path) -> StateResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self::from_database(db)?;
        info!(?path, records = store.len(), "state store opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory state store (for testing).
    pub fn open_in_memory() -> StateResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self::from_database(db)?;
        debug!("in-memory state store opened");
        Ok(store)
    }

    fn from_database(db: Database) -> StateResult<Self> {
        let store = Self {
            db: Arc::new(db),
            records: Arc::new(RwLock::new(HashMap::new())),
            migrations: Arc::new(RwLock::new(MigrationRegistry::default())),
        };
        store.ensure_tables()?;
        store.load()?;
        Ok(store)
    }

    /// Create all tables if they don't exist yet.
    fn ensure_tables(&self) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(RESOURCES).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    /// Populate the map from disk, upgrading records written by older builds.
    fn load(&self) -> StateResult<()> {
        let mut loaded = Vec::new();
        let mut upgraded = Vec::new();
        {
            let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
            let table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            for entry in table.iter().map_err(map_err!(Read))? {
                let (key, value) = entry.map_err(map_err!(Read))?;
                let raw: Value =
                    serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
                let schema = raw
                    .get("schema_version")
                    .and_then(Value::as_u64)
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(1);
                let raw = if schema < CURRENT_SCHEMA_VERSION {
                    let migrated =
                        self.read_migrations()
                            .apply(raw, schema, CURRENT_SCHEMA_VERSION)?;
                    upgraded.push(key.value().to_string());
                    migrated
                } else {
                    raw
                };
                let state: ResourceState =
                    serde_json::from_value(raw).map_err(map_err!(Deserialize))?;
                loaded.push(state);
            }
        }

        let mut records = self.write_records();
        for state in loaded {
            if upgraded.contains(&state.id) {
                self.persist(&state)?;
                info!(id = %state.id, "stored record upgraded to current schema");
            }
            records.insert(state.id.clone(), state);
        }
        Ok(())
    }

    fn read_records(&self) -> RwLockReadGuard<'_, HashMap<ResourceId, ResourceState>> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_records(&self) -> RwLockWriteGuard<'_, HashMap<ResourceId, ResourceState>> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_migrations(&self) -> RwLockReadGuard<'_, MigrationRegistry> {
        self.migrations.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, state: &ResourceState) -> StateResult<()> {
        let value = serde_json::to_vec(state).map_err(map_err!(Serialize))?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            table
                .insert(state.id.as_str(), value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    fn unpersist(&self, id: &str) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(RESOURCES).map_err(map_err!(Table))?;
            table.remove(id).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Migrations ─────────────────────────────────────────────────

    /// Register an extra schema transform for [`StateStore::migrate`] and
    /// [`StateStore::import`].
    pub fn register_migration<F>(&self, from: u32, to: u32, f: F)
    where
        F: Fn(Value) -> StateResult<Value> + Send + Sync + 'static,
    {
        self.migrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(from, to, f);
        debug!(from, to, "migration registered");
    }

    // ── CRUD ───────────────────────────────────────────────────────

    /// Persist a new placement under a fresh id at version 1.
    pub fn create(
        &self,
        resource_type: ResourceType,
        mut placement: PlacementResult,
        dependencies: BTreeSet<ResourceId>,
    ) -> StateResult<ResourceState> {
        let id = uuid::Uuid::new_v4().to_string();
        placement.id = Some(id.clone());
        placement.version = 1;
        let state = ResourceState {
            schema_version: CURRENT_SCHEMA_VERSION,
            id,
            resource_type,
            placement,
            dependencies,
            last_updated: epoch_secs(),
            version: 1,
        };
        state.check_shape()?;

        let mut records = self.write_records();
        check_dependencies(&records, &state)?;
        self.persist(&state)?;
        records.insert(state.id.clone(), state.clone());

        info!(
            id = %state.id,
            resource_type = %state.resource_type,
            provider = %state.placement.selected.candidate.provider,
            region = %state.placement.selected.candidate.region,
            "resource created"
        );
        Ok(state)
    }

    /// Get a resource by id.
    pub fn get(&self, id: &str) -> StateResult<ResourceState> {
        self.read_records()
            .get(id)
            .cloned()
            .ok_or_else(|| StateError::NotFound(id.to_string()))
    }

    /// List all resources, ordered by id.
    pub fn list(&self) -> Vec<ResourceState> {
        let mut all: Vec<ResourceState> = self.read_records().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn len(&self) -> usize {
        self.read_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Replace a resource's placement if `expected_version` is still current.
    pub fn update(
        &self,
        id: &str,
        mut placement: PlacementResult,
        expected_version: u64,
    ) -> StateResult<ResourceState> {
        let current = self.get(id)?;
        if current.version != expected_version {
            return Err(conflict(id, expected_version, current.version));
        }
        let placed = placement.requirement.resource_type();
        if placed != current.resource_type {
            return Err(ValidationError::new(
                "resource_type",
                format!("{id} is {} and cannot take a {placed} placement", current.resource_type),
            )
            .into());
        }

        let version = current.version + 1;
        placement.id = Some(id.to_string());
        placement.version = version;
        let next = ResourceState {
            placement,
            last_updated: epoch_secs(),
            version,
            ..current
        };
        next.check_shape()?;

        self.commit(next, expected_version)
    }

    /// Commit `next` if the stored version still equals `expected_version`.
    fn commit(&self, next: ResourceState, expected_version: u64) -> StateResult<ResourceState> {
        let mut records = self.write_records();
        // Deleted since the snapshot was taken: the caller lost the race.
        let current = records.get(&next.id).map_or(0, |stored| stored.version);
        if current != expected_version {
            return Err(conflict(&next.id, expected_version, current));
        }
        self.persist(&next)?;
        records.insert(next.id.clone(), next.clone());
        debug!(id = %next.id, version = next.version, "resource updated");
        Ok(next)
    }

    /// Delete a resource. Refuses while other resources depend on it unless
    /// `force` is set.
    pub fn delete(&self, id: &str, force: bool) -> StateResult<()> {
        self.delete_checked(id, None, force)
    }

    /// Delete a resource only if `expected_version` is still current, so a
    /// delete racing an update on the same id loses with `Conflict`.
    pub fn delete_at(&self, id: &str, expected_version: u64, force: bool) -> StateResult<()> {
        self.delete_checked(id, Some(expected_version), force)
    }

    fn delete_checked(&self, id: &str, expected_version: Option<u64>, force: bool) -> StateResult<()> {
        let mut records = self.write_records();
        let stored = records
            .get(id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;
        if let Some(expected) = expected_version {
            if stored.version != expected {
                return Err(conflict(id, expected, stored.version));
            }
        }

        let mut dependents: Vec<ResourceId> = records
            .values()
            .filter(|r| r.id != id && r.dependencies.contains(id))
            .map(|r| r.id.clone())
            .collect();
        dependents.sort();

        if !dependents.is_empty() {
            if !force {
                return Err(StateError::DependencyBlocked {
                    id: id.to_string(),
                    dependents,
                });
            }
            warn!(%id, ?dependents, "force-deleting resource with dependents");
        }

        self.unpersist(id)?;
        records.remove(id);
        info!(%id, "resource deleted");
        Ok(())
    }

    // ── Export / import ────────────────────────────────────────────

    /// Serialize the current record into an export envelope.
    pub fn export(&self, id: &str) -> StateResult<Vec<u8>> {
        let state = self.get(id)?;
        codec::encode(&state)
    }

    /// Install a record from an export envelope.
    pub fn import(&self, bytes: &[u8], mode: ImportMode) -> StateResult<ResourceState> {
        let mut state = codec::decode(bytes, &self.read_migrations())?;
        if mode == ImportMode::FreshId {
            let id = uuid::Uuid::new_v4().to_string();
            state.placement.id = Some(id.clone());
            state.id = id;
        }
        state.check_shape()?;

        let mut records = self.write_records();
        if records.contains_key(&state.id) {
            return Err(StateError::AlreadyExists(state.id));
        }
        check_dependencies(&records, &state)?;
        self.persist(&state)?;
        records.insert(state.id.clone(), state.clone());

        info!(id = %state.id, version = state.version, ?mode, "resource imported");
        Ok(state)
    }

    // ── Schema migration ───────────────────────────────────────────

    /// Move a record from schema `from` to schema `to` via the registered
    /// transforms. Produces a new version.
    pub fn migrate(&self, id: &str, from: u32, to: u32) -> StateResult<ResourceState> {
        let current = self.get(id)?;
        if current.schema_version != from {
            return Err(ValidationError::new(
                "schema_version",
                format!("{id} is at schema {}, not {from}", current.schema_version),
            )
            .into());
        }

        let raw = serde_json::to_value(&current).map_err(map_err!(Serialize))?;
        let migrated = self.read_migrations().apply(raw, from, to)?;
        let mut next: ResourceState =
            serde_json::from_value(migrated).map_err(map_err!(Deserialize))?;

        if next.id != current.id {
            return Err(ValidationError::new("id", "migrations must not change the resource id").into());
        }
        next.schema_version = to;
        next.version = current.version + 1;
        next.placement.version = next.version;
        next.last_updated = epoch_secs();
        next.check_shape()?;

        if next.dependencies != current.dependencies {
            check_dependencies(&self.read_records(), &next)?;
        }

        let state = self.commit(next, current.version)?;
        info!(%id, from, to, version = state.version, "resource migrated");
        Ok(state)
    }

    // ── Drift ──────────────────────────────────────────────────────

    /// Re-validate a record without changing it. Dangling dependencies or a
    /// malformed record are reported as a validation error.
    pub fn refresh(&self, id: &str) -> StateResult<ResourceState> {
        let records = self.read_records();
        let state = records
            .get(id)
            .ok_or_else(|| StateError::NotFound(id.to_string()))?;
        let report = drift_of(&records, state);
        if let Some(reason) = report.invalid {
            warn!(%id, %reason, "drift detected: record invalid");
            return Err(ValidationError::new("record", reason).into());
        }
        if !report.dangling.is_empty() {
            warn!(%id, dangling = ?report.dangling, "drift detected: dangling dependencies");
            return Err(ValidationError::new(
                "dependencies",
                format!("dangling references: {:?}", report.dangling),
            )
            .into());
        }
        debug!(%id, "resource refreshed");
        Ok(state.clone())
    }

    /// Re-validate every record, returning reports for those that drifted.
    pub fn refresh_all(&self) -> Vec<DriftReport> {
        let records = self.read_records();
        let mut reports: Vec<DriftReport> = records
            .values()
            .map(|state| drift_of(&records, state))
            .filter(DriftReport::has_drift)
            .collect();
        reports.sort_by(|a, b| a.id.cmp(&b.id));
        if !reports.is_empty() {
            warn!(drifted = reports.len(), "drift scan found inconsistent records");
        }
        reports
    }
}

fn conflict(id: &str, expected: u64, current: u64) -> StateError {
    StateError::Conflict {
        id: id.to_string(),
        expected,
        current,
    }
}

fn dangling(records: &HashMap<ResourceId, ResourceState>, state: &ResourceState) -> Vec<ResourceId> {
    state
        .dependencies
        .iter()
        .filter(|dep| !records.contains_key(*dep))
        .cloned()
        .collect()
}

fn check_dependencies(
    records: &HashMap<ResourceId, ResourceState>,
    state: &ResourceState,
) -> StateResult<()> {
    let missing = dangling(records, state);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::new(
            "dependencies",
            format!("unknown resources: {missing:?}"),
        )
        .into())
    }
}

fn drift_of(records: &HashMap<ResourceId, ResourceState>, state: &ResourceState) -> DriftReport {
    DriftReport {
        id: state.id.clone(),
        dangling: dangling(records, state),
        invalid: state.check_shape().err().map(|e| e.to_string()),
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use cloudfit_core::{Candidate, ResourceRequirement, ResourceSpec};
    use cloudfit_placement::optimize;

    fn compute_placement(provider: &str) -> PlacementResult {
        let req = ResourceRequirement::new(
            "web",
            ["us-east-1"],
            ResourceSpec::Compute {
                vcpus: 4,
                memory_gb: 16.0,
            },
        );
        let candidates = vec![
            Candidate::new(provider, "us-east-1", "large", 150.0, 0.8),
            Candidate::new("other", "us-east-1", "xlarge", 180.0, 0.9),
        ];
        optimize(&req, &candidates).unwrap()
    }

    fn storage_placement() -> PlacementResult {
        let req = ResourceRequirement::new(
            "blobs",
            ["us-east-1"],
            ResourceSpec::Storage {
                capacity_gb: 500,
                iops: None,
                throughput_mbps: None,
            },
        );
        optimize(&req, &[Candidate::new("aws", "us-east-1", "s3", 12.0, 0.6)]).unwrap()
    }

    pub(crate) fn sample_state(id: &str) -> ResourceState {
        let mut placement = compute_placement("aws");
        placement.id = Some(id.to_string());
        ResourceState {
            schema_version: CURRENT_SCHEMA_VERSION,
            id: id.to_string(),
            resource_type: ResourceType::Compute,
            placement,
            dependencies: BTreeSet::new(),
            last_updated: 1000,
            version: 1,
        }
    }

    fn deps(ids: &[&str]) -> BTreeSet<ResourceId> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    fn create(store: &StateStore, dependencies: &[&str]) -> ResourceState {
        store
            .create(ResourceType::Compute, compute_placement("aws"), deps(dependencies))
            .unwrap()
    }

    // ── Create / get ───────────────────────────────────────────────

    #[test]
    fn create_and_get() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);

        assert_eq!(created.version, 1);
        assert_eq!(created.placement.id.as_deref(), Some(created.id.as_str()));
        assert_eq!(created.schema_version, CURRENT_SCHEMA_VERSION);

        let retrieved = store.get(&created.id).unwrap();
        assert_eq!(retrieved, created);
    }

    #[test]
    fn create_assigns_unique_ids() {
        let store = StateStore::open_in_memory().unwrap();
        let a = create(&store, &[]);
        let b = create(&store, &[]);
        assert_ne!(a.id, b.id);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn create_rejects_dangling_dependency() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store
            .create(ResourceType::Compute, compute_placement("aws"), deps(&["ghost"]))
            .unwrap_err();
        match err {
            StateError::Validation(v) => {
                assert_eq!(v.field, "dependencies");
                assert!(v.reason.contains("ghost"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[test]
    fn create_rejects_type_mismatch() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store
            .create(ResourceType::Storage, compute_placement("aws"), BTreeSet::new())
            .unwrap_err();
        assert!(matches!(err, StateError::Validation(ref v) if v.field == "resource_type"));
    }

    #[test]
    fn get_nonexistent_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(matches!(store.get("nope"), Err(StateError::NotFound(_))));
    }

    // ── Update ─────────────────────────────────────────────────────

    #[test]
    fn update_bumps_version() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);

        let updated = store.update(&created.id, compute_placement("gcp"), 1).unwrap();

        assert_eq!(updated.id, created.id);
        assert_eq!(updated.version, 2);
        assert_eq!(updated.placement.version, 2);
        assert_eq!(updated.placement.id.as_deref(), Some(created.id.as_str()));
        assert_eq!(updated.placement.selected.candidate.provider, "gcp");
        assert_eq!(store.get(&created.id).unwrap(), updated);
    }

    #[test]
    fn update_with_stale_version_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);
        store.update(&created.id, compute_placement("gcp"), 1).unwrap();

        let err = store
            .update(&created.id, compute_placement("oci"), 1)
            .unwrap_err();
        match err {
            StateError::Conflict {
                expected, current, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(current, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            store.get(&created.id).unwrap().placement.selected.candidate.provider,
            "gcp"
        );
    }

    #[test]
    fn update_rejects_different_resource_type() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);
        let err = store.update(&created.id, storage_placement(), 1).unwrap_err();
        assert!(matches!(err, StateError::Validation(_)));
    }

    #[test]
    fn update_missing_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        let err = store.update("nope", compute_placement("aws"), 1).unwrap_err();
        assert!(matches!(err, StateError::NotFound(_)));
    }

    // ── Delete ─────────────────────────────────────────────────────

    #[test]
    fn delete_removes_record() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);

        store.delete(&created.id, false).unwrap();
        assert!(matches!(store.get(&created.id), Err(StateError::NotFound(_))));
        assert!(matches!(
            store.delete(&created.id, false),
            Err(StateError::NotFound(_))
        ));
    }

    #[test]
    fn delete_blocked_by_dependents_unless_forced() {
        let store = StateStore::open_in_memory().unwrap();
        let base = create(&store, &[]);
        let dependent = create(&store, &[&base.id]);

        match store.delete(&base.id, false).unwrap_err() {
            StateError::DependencyBlocked { id, dependents } => {
                assert_eq!(id, base.id);
                assert_eq!(dependents, vec![dependent.id.clone()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }

        store.delete(&base.id, true).unwrap();
        assert!(store.get(&base.id).is_err());
        // The dependent is left with a dangling reference, visible to refresh.
        assert!(store.get(&dependent.id).is_ok());
    }

    #[test]
    fn delete_at_stale_version_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);
        store.update(&created.id, compute_placement("gcp"), 1).unwrap();

        let err = store.delete_at(&created.id, 1, false).unwrap_err();
        assert!(matches!(err, StateError::Conflict { expected: 1, current: 2, .. }));
        assert!(store.get(&created.id).is_ok());

        store.delete_at(&created.id, 2, false).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn update_losing_to_delete_conflicts() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);

        // An update that read version 1, then saw the record deleted before committing.
        let mut next = created.clone();
        next.version = 2;
        next.placement.version = 2;
        store.delete(&created.id, false).unwrap();

        let err = store.commit(next, 1).unwrap_err();
        assert!(matches!(err, StateError::Conflict { expected: 1, current: 0, .. }));
        assert!(store.is_empty());
    }

    // ── Export / import ────────────────────────────────────────────

    #[test]
    fn export_import_into_another_store() {
        let source = StateStore::open_in_memory().unwrap();
        let created = create(&source, &[]);
        let updated = source.update(&created.id, compute_placement("gcp"), 1).unwrap();
        let bytes = source.export(&created.id).unwrap();

        let target = StateStore::open_in_memory().unwrap();
        let imported = target.import(&bytes, ImportMode::Preserve).unwrap();
        assert_eq!(imported, updated);
        assert_eq!(target.get(&created.id).unwrap(), updated);
    }

    #[test]
    fn import_preserve_rejects_existing_id() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);
        let bytes = store.export(&created.id).unwrap();

        let err = store.import(&bytes, ImportMode::Preserve).unwrap_err();
        assert!(matches!(err, StateError::AlreadyExists(ref id) if *id == created.id));
    }

    #[test]
    fn import_fresh_id_reassigns_only_id() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);
        let bytes = store.export(&created.id).unwrap();

        let copy = store.import(&bytes, ImportMode::FreshId).unwrap();
        assert_ne!(copy.id, created.id);
        assert_eq!(copy.placement.id.as_deref(), Some(copy.id.as_str()));

        let mut normalized = copy.clone();
        normalized.id = created.id.clone();
        normalized.placement.id = Some(created.id.clone());
        assert_eq!(normalized, created);
    }

    #[test]
    fn import_validates_dependencies() {
        let source = StateStore::open_in_memory().unwrap();
        let base = create(&source, &[]);
        let dependent = create(&source, &[&base.id]);
        let bytes = source.export(&dependent.id).unwrap();

        let target = StateStore::open_in_memory().unwrap();
        let err = target.import(&bytes, ImportMode::Preserve).unwrap_err();
        assert!(matches!(err, StateError::Validation(ref v) if v.field == "dependencies"));
        assert!(target.is_empty());
    }

    #[test]
    fn export_missing_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(matches!(store.export("nope"), Err(StateError::NotFound(_))));
    }

    // ── Migrate ────────────────────────────────────────────────────

    #[test]
    fn migrate_applies_registered_transform() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);
        store.register_migration(3, 4, |mut record| {
            record["placement"]["requirement"]["name"] = Value::from("web-v4");
            Ok(record)
        });

        let migrated = store.migrate(&created.id, 3, 4).unwrap();
        assert_eq!(migrated.schema_version, 4);
        assert_eq!(migrated.version, 2);
        assert_eq!(migrated.placement.requirement.name, "web-v4");
        assert_eq!(store.get(&created.id).unwrap(), migrated);
    }

    #[test]
    fn migrated_record_survives_export_and_import() {
        let source = StateStore::open_in_memory().unwrap();
        let created = create(&source, &[]);
        source.register_migration(3, 4, Ok);
        let migrated = source.migrate(&created.id, 3, 4).unwrap();
        let bytes = source.export(&created.id).unwrap();

        let target = StateStore::open_in_memory().unwrap();
        target.register_migration(3, 4, Ok);
        let imported = target.import(&bytes, ImportMode::Preserve).unwrap();
        assert_eq!(imported, migrated);
        assert_eq!(imported.schema_version, 4);

        // A store that cannot produce schema 4 refuses it rather than misreading it.
        let unaware = StateStore::open_in_memory().unwrap();
        let err = unaware.import(&bytes, ImportMode::Preserve).unwrap_err();
        assert!(matches!(err, StateError::UnsupportedMigration { from: 4, .. }));
    }

    #[test]
    fn migrate_unknown_pair_unsupported() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);
        let err = store.migrate(&created.id, 3, 7).unwrap_err();
        assert!(matches!(err, StateError::UnsupportedMigration { from: 3, to: 7 }));
        assert_eq!(store.get(&created.id).unwrap().version, 1);
    }

    #[test]
    fn migrate_rejects_wrong_source_schema() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);
        let err = store.migrate(&created.id, 1, 2).unwrap_err();
        assert!(matches!(err, StateError::Validation(ref v) if v.field == "schema_version"));
    }

    #[test]
    fn migrate_rejects_id_change() {
        let store = StateStore::open_in_memory().unwrap();
        let created = create(&store, &[]);
        store.register_migration(3, 4, |mut record| {
            record["id"] = Value::from("hijacked");
            Ok(record)
        });
        let err = store.migrate(&created.id, 3, 4).unwrap_err();
        assert!(matches!(err, StateError::Validation(ref v) if v.field == "id"));
    }

    #[test]
    fn migrate_missing_is_not_found() {
        let store = StateStore::open_in_memory().unwrap();
        assert!(matches!(
            store.migrate("nope", 3, 4),
            Err(StateError::NotFound(_))
        ));
    }

    // ── Refresh / drift ────────────────────────────────────────────

    #[test]
    fn refresh_returns_unchanged_record() {
        let store = StateStore::open_in_memory().unwrap();
        let base = create(&store, &[]);
        let dependent = create(&store, &[&base.id]);

        let refreshed = store.refresh(&dependent.id).unwrap();
        assert_eq!(refreshed, dependent);
        assert!(store.refresh_all().is_empty());
    }

    #[test]
    fn refresh_detects_dangling_dependency() {
        let store = StateStore::open_in_memory().unwrap();
        let base = create(&store, &[]);
        let dependent = create(&store, &[&base.id]);
        store.delete(&base.id, true).unwrap();

        let err = store.refresh(&dependent.id).unwrap_err();
        assert!(matches!(err, StateError::Validation(ref v) if v.field == "dependencies"));
        // Refresh never mutates.
        assert_eq!(store.get(&dependent.id).unwrap(), dependent);

        let reports = store.refresh_all();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].id, dependent.id);
        assert_eq!(reports[0].dangling, vec![base.id.clone()]);
    }

    #[test]
    fn list_is_sorted_by_id() {
        let store = StateStore::open_in_memory().unwrap();
        for _ in 0..5 {
            create(&store, &[]);
        }
        let ids: Vec<String> = store.list().into_iter().map(|s| s.id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }

    // ── Persistence (on-disk) ──────────────────────────────────────

    #[test]
    fn persistence_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.redb");

        let (kept, deleted) = {
            let store = StateStore::open(&db_path).unwrap();
            let kept = create(&store, &[]);
            let kept = store.update(&kept.id, compute_placement("gcp"), 1).unwrap();
            let deleted = create(&store, &[]);
            store.delete(&deleted.id, false).unwrap();
            (kept, deleted)
        };

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get(&kept.id).unwrap(), kept);
        assert!(store.get(&deleted.id).is_err());
    }

    #[test]
    fn reopen_upgrades_legacy_rows() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("state.redb");
        let state = sample_state("legacy-1");

        {
            // Write a revision-2 row directly.
            let mut raw = serde_json::to_value(&state).unwrap();
            let obj = raw.as_object_mut().unwrap();
            let ts = obj.remove("last_updated").unwrap();
            obj.insert("updated_at".to_string(), ts);
            obj.insert("schema_version".to_string(), Value::from(2));

            let db = Database::create(&db_path).unwrap();
            let txn = db.begin_write().unwrap();
            {
                let mut table = txn.open_table(RESOURCES).unwrap();
                let bytes = serde_json::to_vec(&raw).unwrap();
                table.insert("legacy-1", bytes.as_slice()).unwrap();
            }
            txn.commit().unwrap();
        }

        let store = StateStore::open(&db_path).unwrap();
        assert_eq!(store.get("legacy-1").unwrap(), state);
    }
}
