//! Error types for the cloudfit state store.

use cloudfit_core::ValidationError;
use thiserror::Error;

/// Result type alias for state store operations.
pub type StateResult<T> = Result<T, StateError>;

/// Errors that can occur during state store operations.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to open database: {0}")]
    Open(String),

    #[error("transaction error: {0}")]
    Transaction(String),

    #[error("table error: {0}")]
    Table(String),

    #[error("read error: {0}")]
    Read(String),

    #[error("write error: {0}")]
    Write(String),

    #[error("serialization error: {0}")]
    Serialize(String),

    #[error("deserialization error: {0}")]
    Deserialize(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// `current` is 0 when the record was deleted after the caller read it.
    #[error("version conflict on {id}: expected {expected}, current {current}")]
    Conflict { id: String, expected: u64, current: u64 },

    #[error("{id} is still referenced by {dependents:?}")]
    DependencyBlocked { id: String, dependents: Vec<String> },

    #[error("resource already exists: {0}")]
    AlreadyExists(String),

    #[error("no migration registered from schema {from} to {to}")]
    UnsupportedMigration { from: u32, to: u32 },

    #[error("malformed export: {0}")]
    Codec(String),

    #[error("export checksum mismatch: expected {expected}, computed {actual}")]
    Checksum { expected: String, actual: String },
}
