//! Export envelope for resource records.
//!
//! ```json
//! { "format": "cloudfit.resource-state",
//!   "schema_version": 3,
//!   "checksum": "<sha256 hex>",
//!   "record": { ... } }
//! ```
//!
//! The checksum covers the canonical (sorted-key) JSON of `record`.
//! Envelopes from older schema revisions are upgraded through the
//! migration registry while decoding.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::{StateError, StateResult};
use crate::migrate::MigrationRegistry;
use crate::types::{CURRENT_SCHEMA_VERSION, ResourceState};

/// Format marker written into every export.
pub const EXPORT_FORMAT: &str = "cloudfit.resource-state";

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    format: String,
    schema_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    checksum: Option<String>,
    record: Value,
}

fn checksum(record: &Value) -> StateResult<String> {
    let canonical = serde_json::to_vec(record).map_err(|e| StateError::Serialize(e.to_string()))?;
    Ok(hex::encode(Sha256::digest(&canonical)))
}

/// Serialize a record into an export envelope.
pub fn encode(state: &ResourceState) -> StateResult<Vec<u8>> {
    let record = serde_json::to_value(state).map_err(|e| StateError::Serialize(e.to_string()))?;
    let envelope = Envelope {
        format: EXPORT_FORMAT.to_string(),
        schema_version: state.schema_version,
        checksum: Some(checksum(&record)?),
        record,
    };
    serde_json::to_vec_pretty(&envelope).map_err(|e| StateError::Serialize(e.to_string()))
}

/// Parse an export envelope, verifying its checksum and upgrading older
/// schema revisions to [`CURRENT_SCHEMA_VERSION`]. Revisions newer than
/// current are accepted as-is when `migrations` has a path up to them.
pub fn decode(bytes: &[u8], migrations: &MigrationRegistry) -> StateResult<ResourceState> {
    let envelope: Envelope =
        serde_json::from_slice(bytes).map_err(|e| StateError::Codec(e.to_string()))?;

    if envelope.format != EXPORT_FORMAT {
        return Err(StateError::Codec(format!(
            "unknown format {:?}, expected {EXPORT_FORMAT:?}",
            envelope.format
        )));
    }

    if let Some(expected) = envelope.checksum.as_deref() {
        let actual = checksum(&envelope.record)?;
        if actual != expected {
            return Err(StateError::Checksum {
                expected: expected.to_string(),
                actual,
            });
        }
    }

    let schema = envelope.schema_version;
    let (record, expected_schema) = if schema < CURRENT_SCHEMA_VERSION {
        let upgraded = migrations.apply(envelope.record, schema, CURRENT_SCHEMA_VERSION)?;
        (upgraded, CURRENT_SCHEMA_VERSION)
    } else {
        // Newer revisions are only readable when this registry can produce them.
        if schema > CURRENT_SCHEMA_VERSION && migrations.plan(CURRENT_SCHEMA_VERSION, schema).is_err() {
            return Err(StateError::UnsupportedMigration {
                from: schema,
                to: CURRENT_SCHEMA_VERSION,
            });
        }
        (envelope.record, schema)
    };

    let state: ResourceState =
        serde_json::from_value(record).map_err(|e| StateError::Deserialize(e.to_string()))?;
    if state.schema_version != expected_schema {
        return Err(StateError::Codec(format!(
            "record claims schema {} inside a schema {schema} envelope",
            state.schema_version
        )));
    }
    Ok(state)
}
