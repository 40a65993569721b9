//! cloudfit-state: versioned, concurrently accessible placement records.
//!
//! Records live in an in-process map behind a reader-writer lock and are
//! written through to [redb](https://docs.rs/redb), so a store reopened
//! from the same file sees every committed mutation.
//!
//! # Architecture
//!
//! Each [`ResourceState`] is JSON-serialized into a `&[u8]` value column
//! keyed by resource id. Every mutation bumps the record's `version`;
//! updates commit only when the caller's expected version is still
//! current. Export envelopes carry a schema revision and a checksum, and
//! older revisions are upgraded through the [`MigrationRegistry`].
//!
//! The `StateStore` is `Clone` + `Send` + `Sync` and can be shared across
//! threads.

pub mod codec;
pub mod error;
pub mod migrate;
pub mod store;
pub mod tables;
pub mod types;

pub use error::{StateError, StateResult};
pub use migrate::{MigrationFn, MigrationRegistry};
pub use store::{ImportMode, StateStore};
pub use types::*;
